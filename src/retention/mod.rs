//! Artifact retention.
//!
//! Rendered reports are never tracked in memory; the output directory is the
//! only record of them. A sweep lists the regular files directly under it and
//! deletes those last modified before the cutoff.

pub mod scheduler;

pub use scheduler::{duration_until_next_midnight, spawn_daily_sweep};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Per-file sweep failure. Logged, never surfaced to a caller.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("failed to list output directory {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read metadata of {path}: {source}")]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct RetentionManager {
    output_dir: PathBuf,
}

impl RetentionManager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Deletes files older than `retention_days` days.
    pub fn sweep(&self, retention_days: u64) -> SweepReport {
        let max_age = Duration::from_secs(retention_days.saturating_mul(SECONDS_PER_DAY));
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        log::info!(
            "Sweeping {} for files older than {} day(s)",
            self.output_dir.display(),
            retention_days
        );
        self.sweep_older_than(cutoff)
    }

    /// Deletes files whose modification time is strictly before `cutoff`.
    pub fn sweep_older_than(&self, cutoff: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(source) => {
                let error = CleanupError::List {
                    path: self.output_dir.clone(),
                    source,
                };
                log::warn!("{}", error);
                return report;
            }
        };

        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(source) => {
                    log::error!(
                        "{}",
                        CleanupError::List {
                            path: self.output_dir.clone(),
                            source,
                        }
                    );
                    report.failed += 1;
                    continue;
                }
            };

            match remove_if_expired(&path, cutoff) {
                Ok(true) => {
                    log::info!("Deleted expired report: {}", path.display());
                    report.deleted += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    log::error!("{}", e);
                    report.failed += 1;
                }
            }
        }

        log::info!(
            "Retention sweep finished: {} deleted, {} failed",
            report.deleted,
            report.failed
        );
        report
    }
}

fn remove_if_expired(path: &Path, cutoff: SystemTime) -> Result<bool, CleanupError> {
    let stat_error = |source| CleanupError::Stat {
        path: path.to_path_buf(),
        source,
    };

    // symlink_metadata: links are not followed out of the output directory.
    let metadata = fs::symlink_metadata(path).map_err(stat_error)?;
    if !metadata.is_file() {
        return Ok(false);
    }
    let modified = metadata.modified().map_err(stat_error)?;
    if modified >= cutoff {
        return Ok(false);
    }

    fs::remove_file(path).map_err(|source| CleanupError::Delete {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}
