//! Operator notifications
//!
//! Failure alerts and recovery notices go out through an [`AlertSender`].
//! Sending is fire-and-forget: a notification that cannot be delivered is
//! logged and never fails the run.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use log::{error, info};
use std::sync::Arc;

pub mod resend;

pub const FAILURE_SUBJECT: &str = "🚨 Classroom Sync Failed";
pub const RECOVERY_SUBJECT: &str = "✅ Classroom Sync Recovered";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send(&self, subject: &str, html: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct Notifier {
    sender: Arc<dyn AlertSender>,
    timezone: Tz,
}

impl Notifier {
    pub fn new(sender: Arc<dyn AlertSender>, timezone: Tz) -> Self {
        Self { sender, timezone }
    }

    /// Returns whether the alert was delivered.
    pub async fn send_failure_alert(&self, error_message: &str, run_url: Option<&str>, now: DateTime<Utc>) -> bool {
        let html = failure_html(&self.timestamp(now), error_message, run_url);
        match self.sender.send(FAILURE_SUBJECT, &html).await {
            Ok(()) => {
                info!("Failure alert sent");
                true
            }
            Err(e) => {
                error!("Failed to send alert email: {:#}", e);
                false
            }
        }
    }

    pub async fn send_recovery_notification(&self, now: DateTime<Utc>) -> bool {
        let html = recovery_html(&self.timestamp(now));
        match self.sender.send(RECOVERY_SUBJECT, &html).await {
            Ok(()) => {
                info!("Recovery notification sent");
                true
            }
            Err(e) => {
                error!("Failed to send recovery notification: {:#}", e);
                false
            }
        }
    }

    fn timestamp(&self, now: DateTime<Utc>) -> String {
        now.with_timezone(&self.timezone)
            .format("%Y-%m-%d %I:%M %p %Z")
            .to_string()
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn failure_html(timestamp: &str, error_message: &str, run_url: Option<&str>) -> String {
    let link = run_url
        .map(|url| {
            format!(
                r#"<p><a href="{}" style="color: #1976d2;">View run logs</a></p>"#,
                escape_html(url)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; padding: 20px;">
  <h2 style="color: #d32f2f;">Sync Run Failed</h2>
  <p><strong>Timestamp:</strong> {timestamp}</p>
  <h3>Error Details</h3>
  <pre style="background: #f5f5f5; padding: 15px; border-radius: 5px; overflow-x: auto;">{error}</pre>
  {link}
  <hr style="margin: 30px 0;">
  <h3>What This Means</h3>
  <ul>
    <li>The sync failed on consecutive attempts</li>
    <li>Calendar reminders may be out of date</li>
    <li>The next successful run will backfill any missed assignments</li>
  </ul>
  <h3>Next Steps</h3>
  <ol>
    <li>Check the run logs for details</li>
    <li>Verify the classroom and calendar credentials are still valid</li>
  </ol>
  <p style="color: #666; font-size: 12px; margin-top: 30px;">Automated alert from duesync.</p>
</body>
</html>"#,
        timestamp = escape_html(timestamp),
        error = escape_html(error_message),
        link = link,
    )
}

pub fn recovery_html(timestamp: &str) -> String {
    format!(
        r#"<html>
<body style="font-family: Arial, sans-serif; padding: 20px;">
  <h2 style="color: #388e3c;">Sync Run Recovered</h2>
  <p><strong>Timestamp:</strong> {}</p>
  <p>The sync is running successfully again.</p>
  <p style="color: #666; font-size: 12px; margin-top: 30px;">Automated notification from duesync.</p>
</body>
</html>"#,
        escape_html(timestamp)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use chrono_tz::Asia::Kolkata;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 4, 30, 0).unwrap()
    }

    #[test]
    fn test_failure_html_escapes_error_and_links_run() {
        let html = failure_html("2025-03-10 10:00 AM IST", "expected <tag> & more", Some("https://ci/runs/1"));
        assert!(html.contains("expected &lt;tag&gt; &amp; more"));
        assert!(html.contains(r#"href="https://ci/runs/1""#));
    }

    #[test]
    fn test_failure_html_without_run_url() {
        let html = failure_html("ts", "boom", None);
        assert!(!html.contains("href"));
    }

    #[tokio::test]
    async fn test_failure_alert_uses_local_timestamp() {
        let mut sender = MockAlertSender::new();
        sender
            .expect_send()
            .times(1)
            .returning(|subject, html| {
                assert_eq!(subject, FAILURE_SUBJECT);
                assert!(html.contains("2025-03-10 10:00 AM IST"));
                Ok(())
            });

        let notifier = Notifier::new(Arc::new(sender), Kolkata);
        assert!(notifier.send_failure_alert("boom", None, now()).await);
    }

    #[tokio::test]
    async fn test_send_errors_are_swallowed() {
        let mut sender = MockAlertSender::new();
        sender
            .expect_send()
            .times(1)
            .returning(|_, _| Err(anyhow!("HTTP 401")));

        let notifier = Notifier::new(Arc::new(sender), Kolkata);
        assert!(!notifier.send_recovery_notification(now()).await);
    }
}
