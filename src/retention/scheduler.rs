//! Daily retention schedule: one sweep at every local midnight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use tokio::task::JoinHandle;

use super::RetentionManager;

/// Spawns a background task that sweeps the output directory every midnight.
pub fn spawn_daily_sweep(manager: Arc<RetentionManager>, retention_days: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!(
            "Retention scheduler started for {} ({} day(s) kept)",
            manager.output_dir().display(),
            retention_days
        );

        loop {
            let wait = duration_until_next_midnight(Local::now());
            log::debug!("Next retention sweep in {:?}", wait);
            tokio::time::sleep(wait).await;

            let manager = manager.clone();
            match tokio::task::spawn_blocking(move || manager.sweep(retention_days)).await {
                Ok(report) => log::info!(
                    "Scheduled cleanup completed ({} deleted, {} failed)",
                    report.deleted,
                    report.failed
                ),
                Err(e) => log::error!("Scheduled cleanup task failed: {}", e),
            }
        }
    })
}

pub fn duration_until_next_midnight<Tz: TimeZone>(now: DateTime<Tz>) -> Duration {
    let next_midnight = now
        .date_naive()
        .checked_add_days(Days::new(1))
        .map(|day| day.and_time(NaiveTime::MIN))
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest());

    match next_midnight {
        Some(midnight) => (midnight - now)
            .to_std()
            .unwrap_or(Duration::from_secs(1)),
        // Midnight skipped by a DST transition; retry in an hour.
        None => Duration::from_secs(60 * 60),
    }
}
