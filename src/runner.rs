//! Run wrapper
//!
//! Wraps one reconciliation pass with its audit record and the failure
//! monitor, and retries a failed pass once after a fixed delay.

use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::models::{RunStatus, SyncStats};
use crate::monitor::RunMonitor;
use crate::notify::Notifier;
use crate::sync::SyncEngine;
use crate::utils::logging::{error_chain, log_error_with_context};
use crate::utils::RetryPolicy;
use chrono::{DateTime, Utc};
use log::{error, info, warn};

/// How a run with retry ended.
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(SyncStats),
    /// The first attempt failed and the retry succeeded.
    Recovered(SyncStats),
    Failed(AppError),
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Succeeded(_) | RunOutcome::Recovered(_) => 0,
            RunOutcome::Failed(_) => 1,
        }
    }
}

/// What a pass runs against. A runner whose collaborators could not be
/// built still records, counts and retries its failed passes.
enum Pass {
    Ready(SyncEngine),
    Unavailable(String),
}

pub struct Runner {
    db: Database,
    pass: Pass,
    monitor: RunMonitor,
    notifier: Option<Notifier>,
    run_url: Option<String>,
    retry: RetryPolicy,
    clock: fn() -> DateTime<Utc>,
}

impl Runner {
    pub fn new(
        db: Database,
        engine: SyncEngine,
        monitor: RunMonitor,
        notifier: Notifier,
        run_url: Option<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            pass: Pass::Ready(engine),
            monitor,
            notifier: Some(notifier),
            run_url,
            retry,
            clock: Utc::now,
        }
    }

    /// A runner for a process that failed to start. Every pass fails with
    /// `startup_error`; alerts go out only when a notifier is available.
    pub fn unavailable(
        db: Database,
        startup_error: &AppError,
        monitor: RunMonitor,
        notifier: Option<Notifier>,
        run_url: Option<String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            pass: Pass::Unavailable(error_chain(startup_error)),
            monitor,
            notifier,
            run_url,
            retry,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    /// One audited pass. The failure streak is updated either way; an alert
    /// or recovery notice goes out when the streak calls for one.
    pub async fn run_once(&self) -> AppResult<SyncStats> {
        let now = (self.clock)();

        let (log_id, result) = match self.db.start_run_log(now).await {
            Ok(id) => {
                info!("Starting run #{}", id);
                (Some(id), self.run_pass(now).await)
            }
            Err(e) => (None, Err(AppError::from(e))),
        };

        // Bookkeeping after a good pass can still fail the run.
        let result = match result {
            Ok(stats) => self.on_success(log_id, &stats).await.map(|()| stats),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.on_failure(log_id, e).await;
        }
        result
    }

    async fn run_pass(&self, now: DateTime<Utc>) -> AppResult<SyncStats> {
        match &self.pass {
            Pass::Ready(engine) => engine.run(now).await,
            Pass::Unavailable(reason) => Err(AppError::Startup(reason.clone())),
        }
    }

    /// Runs once and, if that fails, once more after the policy's delay.
    pub async fn run_with_retry(&self) -> RunOutcome {
        let result = self
            .retry
            .run(|attempt| async move {
                if attempt > 1 {
                    info!("Retry attempt {}", attempt);
                }
                self.run_once().await
            })
            .await;

        match result {
            Ok(done) if done.recovered() => {
                if let Err(e) = self.db.insert_recovered_log((self.clock)(), &done.value).await {
                    warn!("Failed to record recovered run: {:#}", e);
                }
                RunOutcome::Recovered(done.value)
            }
            Ok(done) => RunOutcome::Succeeded(done.value),
            Err(e) => RunOutcome::Failed(e),
        }
    }

    async fn on_success(&self, log_id: Option<i64>, stats: &SyncStats) -> AppResult<()> {
        let now = (self.clock)();
        if let Some(id) = log_id {
            self.db
                .finish_run_log(id, RunStatus::Success, now, stats, None)
                .await?;
        }

        let prior = self.monitor.record_success(now).await?;
        if prior > 0 {
            if let Some(notifier) = &self.notifier {
                notifier.send_recovery_notification(now).await;
            }
        }

        info!("Run completed successfully");
        Ok(())
    }

    /// Bookkeeping failures here are logged only, so the run's own error is
    /// the one that propagates.
    async fn on_failure(&self, log_id: Option<i64>, err: &AppError) {
        let now = (self.clock)();
        let message = error_chain(err);
        log_error_with_context(err, "Run failed");

        if let Some(id) = log_id {
            if let Err(e) = self
                .db
                .finish_run_log(id, RunStatus::Failed, now, &SyncStats::default(), Some(&message))
                .await
            {
                error!("Failed to update run log #{}: {:#}", id, e);
            }
        }

        let count = match self.monitor.record_failure(now).await {
            Ok(count) => count,
            Err(e) => {
                error!("Failed to record run failure: {:#}", e);
                return;
            }
        };

        let already_sent = match self.monitor.state().await {
            Ok(state) => state.alert_sent,
            Err(e) => {
                error!("Failed to read failure state: {:#}", e);
                return;
            }
        };

        if self.monitor.should_alert(count, already_sent) {
            let Some(notifier) = &self.notifier else {
                warn!("{} consecutive failures but no alert sender is configured", count);
                return;
            };
            info!("{} consecutive failures, sending alert", count);
            // One attempt per streak, delivered or not.
            notifier
                .send_failure_alert(&message, self.run_url.as_deref(), now)
                .await;
            if let Err(e) = self.monitor.mark_alert_sent().await {
                error!("Failed to mark alert as sent: {:#}", e);
            }
        }
    }
}
