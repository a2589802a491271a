//! Run reliability monitor
//!
//! Tracks the consecutive-failure streak across process runs and decides
//! when the streak deserves an alert. At most one alert goes out per streak.

use crate::database::Database;
use crate::models::RunFailureState;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{debug, info};

pub const DEFAULT_ALERT_THRESHOLD: i64 = 2;

#[derive(Clone)]
pub struct RunMonitor {
    db: Database,
    threshold: i64,
}

impl RunMonitor {
    pub fn new(db: Database, threshold: i64) -> Self {
        Self {
            db,
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Ends any streak. Returns how many failures preceded this success, so a
    /// non-zero value means the run recovered.
    pub async fn record_success(&self, now: DateTime<Utc>) -> Result<i64> {
        let prior = self.db.record_run_success(now).await?;
        if prior > 0 {
            info!("Run succeeded after {} consecutive failure(s)", prior);
        }
        Ok(prior)
    }

    /// Extends the streak and returns its new length.
    pub async fn record_failure(&self, now: DateTime<Utc>) -> Result<i64> {
        let count = self.db.record_run_failure(now).await?;
        debug!("Consecutive failures: {}", count);
        Ok(count)
    }

    pub fn should_alert(&self, count: i64, already_sent: bool) -> bool {
        count >= self.threshold && !already_sent
    }

    pub async fn mark_alert_sent(&self) -> Result<()> {
        self.db.mark_alert_sent().await
    }

    pub async fn state(&self) -> Result<RunFailureState> {
        self.db.get_failure_state().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn monitor() -> RunMonitor {
        RunMonitor::new(Database::in_memory().await.unwrap(), DEFAULT_ALERT_THRESHOLD)
    }

    #[tokio::test]
    async fn test_should_alert_threshold() {
        let monitor = monitor().await;
        assert!(!monitor.should_alert(1, false));
        assert!(monitor.should_alert(2, false));
        assert!(monitor.should_alert(5, false));
        assert!(!monitor.should_alert(2, true));
    }

    #[tokio::test]
    async fn test_failure_streak_alerts_once() {
        let monitor = monitor().await;
        let now = Utc::now();
        let mut alerts = 0;

        for _ in 0..4 {
            let count = monitor.record_failure(now).await.unwrap();
            let sent = monitor.state().await.unwrap().alert_sent;
            if monitor.should_alert(count, sent) {
                monitor.mark_alert_sent().await.unwrap();
                alerts += 1;
            }
        }
        assert_eq!(alerts, 1);

        assert_eq!(monitor.record_success(now).await.unwrap(), 4);
        let state = monitor.state().await.unwrap();
        assert_eq!(state.consecutive_failures, 0);
        assert!(!state.alert_sent);
    }

    #[tokio::test]
    async fn test_threshold_is_at_least_one() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(RunMonitor::new(db, 0).threshold(), 1);
    }
}
