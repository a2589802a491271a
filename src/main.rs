// duesync - coursework deadlines as calendar reminders
// Main entry point for one scheduled run

use duesync::calendar::caldav::CalDavStore;
use duesync::classroom::google::{ClassroomClient, ClassroomCredentials};
use duesync::config::RunSettings;
use duesync::http_config::HttpConfig;
use duesync::monitor::RunMonitor;
use duesync::notify::resend::ResendSender;
use duesync::notify::Notifier;
use duesync::utils::logging::{init_logging, log_error_with_context};
use duesync::utils::RetryPolicy;
use duesync::{AppError, Config, Database, RunOutcome, Runner, SyncEngine};
use log::{error, info, warn};
use std::process::ExitCode;
use std::sync::Arc;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Starting duesync v{}", env!("CARGO_PKG_VERSION"));

    // Read ahead of the full configuration so a bad one is still recorded.
    let run_settings = RunSettings::from_env();
    let db = match Database::connect(&run_settings.database_url).await {
        Ok(db) => db,
        Err(e) => {
            log_error_with_context(&*e, "Cannot open database");
            return ExitCode::from(1);
        }
    };

    let runner = match build_runner(&db).await {
        Ok(runner) => runner,
        Err(e) => {
            log_error_with_context(&*e, "Startup failed");
            unavailable_runner(db, &run_settings, e)
        }
    };

    let outcome = runner.run_with_retry().await;
    match &outcome {
        RunOutcome::Succeeded(stats) => info!(
            "Sync completed: {} created, {} updated, {} cancelled",
            stats.created, stats.updated, stats.cancelled
        ),
        RunOutcome::Recovered(stats) => info!(
            "Sync recovered on retry: {} created, {} updated, {} cancelled",
            stats.created, stats.updated, stats.cancelled
        ),
        RunOutcome::Failed(e) => error!("Sync failed after retry: {}", e),
    }

    ExitCode::from(outcome.exit_code() as u8)
}

async fn build_runner(db: &Database) -> anyhow::Result<Runner> {
    let config = Config::from_env()?;

    let source = ClassroomClient::new(
        ClassroomCredentials {
            client_id: config.google.client_id.clone(),
            client_secret: config.google.client_secret.clone(),
            refresh_token: config.google.refresh_token.clone(),
        },
        config.timezone,
        &HttpConfig::classroom_api(),
    )?;

    let calendar = CalDavStore::new(
        &config.caldav.url,
        &config.caldav.username,
        &config.caldav.password,
        &HttpConfig::caldav(),
    )?;

    let sender = ResendSender::new(
        config.mail.api_key.clone(),
        config.mail.from_email.clone(),
        config.mail.alert_email.clone(),
        &HttpConfig::mail(),
    )?;

    let engine = SyncEngine::new(
        db.clone(),
        Arc::new(source),
        Arc::new(calendar),
        config.sync_settings(),
    );

    Ok(Runner::new(
        db.clone(),
        engine,
        RunMonitor::new(db.clone(), config.alert_threshold),
        Notifier::new(Arc::new(sender), config.timezone),
        config.run_url.clone(),
        RetryPolicy::once_after(config.retry_delay),
    ))
}

/// Runner that records and retries the startup failure, alerting when the
/// mail settings alone are usable.
fn unavailable_runner(db: Database, run_settings: &RunSettings, error: anyhow::Error) -> Runner {
    let notifier = run_settings.mail.as_ref().and_then(|mail| {
        match ResendSender::new(
            mail.api_key.clone(),
            mail.from_email.clone(),
            mail.alert_email.clone(),
            &HttpConfig::mail(),
        ) {
            Ok(sender) => Some(Notifier::new(Arc::new(sender), run_settings.timezone)),
            Err(e) => {
                warn!("Cannot build alert sender: {:#}", e);
                None
            }
        }
    });

    Runner::unavailable(
        db.clone(),
        &AppError::from(error),
        RunMonitor::new(db, run_settings.alert_threshold),
        notifier,
        run_settings.run_url.clone(),
        RetryPolicy::once_after(run_settings.retry_delay),
    )
}
