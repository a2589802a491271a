//! Configuration module
//!
//! Everything the run needs is read from the process environment once, at
//! startup, into a [`Config`] that is then passed down by reference.

use crate::error::{AppError, AppResult};
use crate::sync::SyncSettings;
use chrono_tz::Tz;
use log::info;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CALDAV_URL: &str = "https://caldav.icloud.com/";
pub const DEFAULT_FROM_EMAIL: &str = "onboarding@resend.dev";
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";
pub const DEFAULT_ALARM_INTERVALS: [u32; 4] = [48, 24, 6, 2];

#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct CalDavConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub api_key: String,
    pub alert_email: String,
    pub from_email: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub google: GoogleConfig,
    pub caldav: CalDavConfig,
    pub mail: MailConfig,
    pub timezone: Tz,
    pub notification_start_hour: u32,
    /// Loaded and range-checked but not applied: late-night alarms keep their time.
    pub notification_end_hour: u32,
    pub alarm_intervals: Vec<u32>,
    pub alert_threshold: i64,
    pub retry_delay: Duration,
    /// Link to the CI run, when running under GitHub Actions.
    pub run_url: Option<String>,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        info!(
            "Configuration loaded (timezone {}, alarms {:?}h, window from {:02}:00)",
            config.timezone, config.alarm_intervals, config.notification_start_hour
        );
        Ok(config)
    }

    /// Builds the configuration from any key lookup. Every missing required
    /// variable is reported in one error.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let required = [
            "GOOGLE_CLIENT_ID",
            "GOOGLE_CLIENT_SECRET",
            "GOOGLE_REFRESH_TOKEN",
            "CALDAV_USERNAME",
            "CALDAV_PASSWORD",
            "RESEND_API_KEY",
            "ALERT_EMAIL",
        ];
        let missing: Vec<&str> = required.iter().copied().filter(|key| get(*key).is_none()).collect();
        if !missing.is_empty() {
            return Err(AppError::config(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }
        let require = |key: &str| get(key).unwrap_or_default();

        let timezone_name = get("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone = Tz::from_str(&timezone_name)
            .map_err(|e| AppError::config(format!("TIMEZONE '{}' is not a known zone: {}", timezone_name, e)))?;

        let notification_start_hour = parse_or(&get, "NOTIFICATION_START_HOUR", 7u32)?;
        let notification_end_hour = parse_or(&get, "NOTIFICATION_END_HOUR", 24u32)?;
        let alarm_intervals = match get("ALARM_INTERVALS") {
            Some(raw) => parse_intervals(&raw)?,
            None => DEFAULT_ALARM_INTERVALS.to_vec(),
        };
        let alert_threshold = parse_or(&get, "ALERT_THRESHOLD", 2i64)?;
        let retry_delay_secs = parse_or(&get, "RETRY_DELAY_SECS", 600u64)?;

        let run_url = run_url(&get);

        let config = Self {
            google: GoogleConfig {
                client_id: require("GOOGLE_CLIENT_ID"),
                client_secret: require("GOOGLE_CLIENT_SECRET"),
                refresh_token: require("GOOGLE_REFRESH_TOKEN"),
            },
            caldav: CalDavConfig {
                url: get("CALDAV_URL").unwrap_or_else(|| DEFAULT_CALDAV_URL.to_string()),
                username: require("CALDAV_USERNAME"),
                password: require("CALDAV_PASSWORD"),
            },
            mail: MailConfig {
                api_key: require("RESEND_API_KEY"),
                alert_email: require("ALERT_EMAIL"),
                from_email: get("ALERT_FROM_EMAIL").unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
            },
            timezone,
            notification_start_hour,
            notification_end_hour,
            alarm_intervals,
            alert_threshold,
            retry_delay: Duration::from_secs(retry_delay_secs),
            run_url,
        };
        config.validate()?;
        Ok(config)
    }

    /// Range checks that do not depend on how the values were loaded.
    pub fn validate(&self) -> AppResult<()> {
        if self.notification_start_hour > 23 {
            return Err(AppError::config("NOTIFICATION_START_HOUR must be between 0 and 23"));
        }
        if !(1..=24).contains(&self.notification_end_hour) {
            return Err(AppError::config("NOTIFICATION_END_HOUR must be between 1 and 24"));
        }
        if self.alarm_intervals.is_empty() || self.alarm_intervals.contains(&0) {
            return Err(AppError::config("ALARM_INTERVALS must list positive hour counts"));
        }
        if self.alert_threshold < 1 {
            return Err(AppError::config("ALERT_THRESHOLD must be at least 1"));
        }
        crate::calendar::caldav::validate_caldav_url_format(&self.caldav.url)
            .map_err(|e| AppError::config(e.to_string()))?;
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            timezone: self.timezone,
            alarm_intervals: self.alarm_intervals.clone(),
            window_start_hour: self.notification_start_hour,
        }
    }
}

/// Settings read ahead of, and independently from, the full [`Config`]:
/// enough to open the database and to record, retry and report a failed
/// run. Loading never fails; an invalid value falls back to its default.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub database_url: String,
    pub timezone: Tz,
    pub alert_threshold: i64,
    pub retry_delay: Duration,
    pub run_url: Option<String>,
    /// Present only when the Resend key and alert address are both set.
    pub mail: Option<MailConfig>,
}

impl RunSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let timezone = get("TIMEZONE")
            .and_then(|name| Tz::from_str(&name).ok())
            .unwrap_or(chrono_tz::Asia::Kolkata);
        let alert_threshold = or_default(parse_or(&get, "ALERT_THRESHOLD", 2i64), 2).max(1);
        let retry_delay_secs = or_default(parse_or(&get, "RETRY_DELAY_SECS", 600u64), 600);

        let mail = match (get("RESEND_API_KEY"), get("ALERT_EMAIL")) {
            (Some(api_key), Some(alert_email)) => Some(MailConfig {
                api_key,
                alert_email,
                from_email: get("ALERT_FROM_EMAIL").unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string()),
            }),
            _ => None,
        };

        Self {
            database_url: get("DUESYNC_DATABASE_URL").unwrap_or_else(default_database_url),
            timezone,
            alert_threshold,
            retry_delay: Duration::from_secs(retry_delay_secs),
            run_url: run_url(&get),
            mail,
        }
    }
}

fn or_default<T>(result: AppResult<T>, default: T) -> T {
    result.unwrap_or_else(|e| {
        log::warn!("{}; using the default", e);
        default
    })
}

/// Link to the GitHub Actions run, when all three variables are set.
fn run_url<G>(get: &G) -> Option<String>
where
    G: Fn(&str) -> Option<String>,
{
    match (
        get("GITHUB_SERVER_URL"),
        get("GITHUB_REPOSITORY"),
        get("GITHUB_RUN_ID"),
    ) {
        (Some(server), Some(repository), Some(run_id)) => Some(format!(
            "{}/{}/actions/runs/{}",
            server.trim_end_matches('/'),
            repository,
            run_id
        )),
        _ => None,
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| AppError::config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn parse_intervals(raw: &str) -> AppResult<Vec<u32>> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>()
                .map_err(|e| AppError::config(format!("ALARM_INTERVALS entry '{}' is invalid: {}", part, e)))
        })
        .collect()
}

/// `sqlite:<data dir>/duesync/duesync.db`, falling back to the working
/// directory when no data directory is available.
pub fn default_database_url() -> String {
    let path = dirs::data_dir()
        .map(|dir| dir.join("duesync"))
        .and_then(|dir| match std::fs::create_dir_all(&dir) {
            Ok(()) => Some(dir.join("duesync.db")),
            Err(e) => {
                log::warn!("Cannot create data directory {}: {}", dir.display(), e);
                None
            }
        })
        .unwrap_or_else(|| PathBuf::from("duesync.db"));

    format!("sqlite:{}?mode=rwc", path.display())
}
