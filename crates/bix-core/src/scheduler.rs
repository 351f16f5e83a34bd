use std::str::FromStr;
use std::sync::Arc;

use bix_types::{DateWindow, PipelineError, Result, RunSummary};
use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::coordinator::RunCoordinator;
use crate::utils::ShutdownListener;

/// Parse a 5, 6 or 7 field cron expression.
///
/// The `cron` crate wants `sec min hour dom month dow year`, so shorter
/// forms are padded with a zero second and a wildcard year.
pub fn parse_schedule(expr: &str) -> Result<cron::Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = fields.join(" ");
    let cron_expr = match fields.len() {
        5 => format!("0 {normalized} *"),
        6 => format!("{normalized} *"),
        7 => normalized,
        _ => {
            return Err(PipelineError::Config(format!(
                "Invalid cron expression (expected 5-7 fields): {expr}"
            )));
        }
    };

    cron::Schedule::from_str(&cron_expr).map_err(|e| {
        PipelineError::Config(format!("Invalid cron expression '{cron_expr}': {e}"))
    })
}

/// Runs the export on a cron schedule, one run at a time.
pub struct ExportScheduler {
    coordinator: Arc<RunCoordinator>,
    schedule: cron::Schedule,
    lookback_days: u32,
}

impl ExportScheduler {
    pub fn new(coordinator: Arc<RunCoordinator>, expr: &str, lookback_days: u32) -> Result<Self> {
        Ok(Self {
            coordinator,
            schedule: parse_schedule(expr)?,
            lookback_days,
        })
    }

    /// Build from the schedule settings in the coordinator's config.
    pub fn from_config(coordinator: Arc<RunCoordinator>) -> Result<Self> {
        let expr = coordinator.config().export_schedule.clone();
        let lookback = coordinator.config().export_lookback_days;
        Self::new(coordinator, &expr, lookback)
    }

    pub fn next_run_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// The window a run fired at `at` exports.
    pub fn window_for(&self, at: DateTime<Utc>) -> Result<DateWindow> {
        DateWindow::ending_at(at, self.lookback_days)
    }

    /// One scheduled run.
    pub async fn run_scheduled(&self, at: DateTime<Utc>) -> Result<RunSummary> {
        let window = self.window_for(at)?;
        self.coordinator.run(window).await
    }

    /// Loop until `shutdown` fires. Failed runs are logged and not retried.
    pub async fn run_until_shutdown(&self, mut shutdown: ShutdownListener) {
        info!(lookback_days = self.lookback_days, "Export scheduler started");
        loop {
            let Some(next) = self.next_run_after(Utc::now()) else {
                info!("Schedule has no further occurrences");
                break;
            };
            info!(next_run = %next.to_rfc3339(), "Next export scheduled");

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::select! {
                biased;
                _ = shutdown.stopped() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            match self.run_scheduled(next).await {
                Ok(summary) => info!(%summary, "Scheduled export succeeded"),
                Err(e) => error!(kind = e.kind(), error = %e, "Scheduled export failed"),
            }
        }
        info!("Export scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{test_config, FakeRunner, RecordingTransport, StaticSource};
    use crate::utils::ShutdownSignal;
    use bix_types::ExtractRow;
    use chrono::TimeZone;
    use std::time::Duration;

    fn coordinator(
        staging: &std::path::Path,
        transport: Arc<RecordingTransport>,
    ) -> Arc<RunCoordinator> {
        let source = StaticSource::new(|_| {
            Ok(vec![ExtractRow {
                nhs_number: "1".to_string(),
                ..Default::default()
            }])
        });
        Arc::new(RunCoordinator::new(
            test_config(staging),
            Arc::new(source),
            Arc::new(FakeRunner::succeeding()),
            transport,
        ))
    }

    #[test]
    fn parse_five_field() {
        let schedule = parse_schedule("0 2 * * *").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let next = schedule.after(&after).next().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap());
    }

    #[test]
    fn parse_six_and_seven_field() {
        assert!(parse_schedule("0 0 2 * * *").is_ok());
        assert!(parse_schedule("0 0 2 * * * *").is_ok());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_schedule("not a cron").is_err());
        assert!(parse_schedule("* *").is_err());
    }

    #[test]
    fn window_ends_at_midnight_of_run_day() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new(false));
        let scheduler = ExportScheduler::from_config(coordinator(tmp.path(), transport)).unwrap();

        let at = Utc.with_ymd_and_hms(2024, 1, 8, 2, 0, 0).unwrap();
        let window = scheduler.window_for(at).unwrap();
        assert_eq!(window.from(), Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(window.to(), Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn shutdown_stops_idle_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new(false));
        let scheduler =
            ExportScheduler::new(coordinator(tmp.path(), transport.clone()), "0 2 1 1 *", 7)
                .unwrap();
        let shutdown = ShutdownSignal::new();
        let listener = shutdown.subscribe();

        let handle = tokio::spawn(async move { scheduler.run_until_shutdown(listener).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.request();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn earlier_request_prevents_any_run() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new(false));
        let scheduler =
            ExportScheduler::new(coordinator(tmp.path(), transport.clone()), "* * * * * *", 7)
                .unwrap();
        let shutdown = ShutdownSignal::new();
        shutdown.request();

        tokio::time::timeout(
            Duration::from_secs(5),
            scheduler.run_until_shutdown(shutdown.subscribe()),
        )
        .await
        .unwrap();
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn loop_runs_export_when_due() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::new(false));
        let scheduler =
            ExportScheduler::new(coordinator(tmp.path(), transport.clone()), "* * * * * *", 7)
                .unwrap();
        let shutdown = ShutdownSignal::new();
        let listener = shutdown.subscribe();

        let handle = tokio::spawn(async move { scheduler.run_until_shutdown(listener).await });

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while transport.sent_count() == 0 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        shutdown.request();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();

        assert!(transport.sent_count() >= 1);
    }
}
