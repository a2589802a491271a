//! HTTP client configuration module
//!
//! Centralized construction of the reqwest clients used to talk to the
//! classroom API, the CalDAV server and the mail API. Requests are never
//! retried individually; a failed run is retried as a whole.

use anyhow::{anyhow, Result};
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const USER_AGENT: &str = concat!("duesync/", env!("CARGO_PKG_VERSION"));

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Total request timeout
    pub timeout: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(45),
            pool_max_idle_per_host: 2,
        }
    }
}

impl HttpConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classroom listing can page through many courses
    pub fn classroom_api() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
            timeout: Duration::from_secs(60),
            pool_max_idle_per_host: 4,
        }
    }

    /// CalDAV REPORT responses carry a whole calendar
    pub fn caldav() -> Self {
        Self {
            connect_timeout: Duration::from_secs(20),
            timeout: Duration::from_secs(120),
            pool_max_idle_per_host: 2,
        }
    }

    /// Mail API: fail fast, alerts are best-effort
    pub fn mail() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 1,
        }
    }

    /// Build a reqwest client with this configuration
    pub fn build_client(&self) -> Result<Client> {
        ClientBuilder::new()
            .user_agent(USER_AGENT)
            .connect_timeout(self.connect_timeout)
            .timeout(self.timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))
    }
}
