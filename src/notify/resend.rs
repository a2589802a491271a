// Resend e-mail API sender

use super::AlertSender;
use crate::http_config::HttpConfig;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

const RESEND_URL: &str = "https://api.resend.com/emails";

pub struct ResendSender {
    client: Client,
    api_key: String,
    from: String,
    to: String,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct EmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: &'a str,
}

impl ResendSender {
    pub fn new(api_key: String, from: String, to: String, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            client: http.build_client()?,
            api_key,
            from,
            to,
            endpoint: RESEND_URL.to_string(),
        })
    }

    fn request<'a>(&'a self, subject: &'a str, html: &'a str) -> EmailRequest<'a> {
        EmailRequest {
            from: &self.from,
            to: vec![self.to.as_str()],
            subject,
            html,
        }
    }
}

#[async_trait]
impl AlertSender for ResendSender {
    async fn send(&self, subject: &str, html: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request(subject, html))
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(anyhow!("Email API request failed: {} {}", status, body))
        }
    }
}
