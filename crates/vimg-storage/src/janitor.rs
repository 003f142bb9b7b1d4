// SPDX-FileCopyrightText: 2026 Vimg Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic reclamation of expired artifacts.
//!
//! The janitor runs as its own task, independent of the request path. A
//! failed deletion (for example a file still open for transfer on platforms
//! that forbid it) is logged and retried on the next sweep; it never aborts
//! the sweep for other entries.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long an artifact is kept after it was written.
pub const RETENTION: Duration = Duration::from_secs(15 * 60);

/// Counters from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Regular files examined.
    pub scanned: usize,
    pub removed: usize,
    pub kept: usize,
    /// Files that were expired but could not be deleted.
    pub failed: usize,
}

/// Deletes files older than [`RETENTION`] from the artifact directory.
#[derive(Debug, Clone)]
pub struct RetentionJanitor {
    root: PathBuf,
    interval: Duration,
}

impl RetentionJanitor {
    pub fn new(root: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            root: root.into(),
            interval,
        }
    }

    /// Sweeps once against the current wall clock.
    pub async fn sweep(&self) -> SweepReport {
        self.sweep_at(SystemTime::now()).await
    }

    /// Sweeps once, computing ages relative to `now`.
    ///
    /// Abandoned partial writes are reclaimed by the same age rule; a write in
    /// progress keeps refreshing its modification time.
    pub async fn sweep_at(&self, now: SystemTime) -> SweepReport {
        let mut report = SweepReport::default();

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(root = %self.root.display(), "artifact directory does not exist yet");
                return report;
            }
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "failed to scan artifact directory");
                return report;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to read artifact directory entry");
                    break;
                }
            };

            let path = entry.path();
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                // Already removed by someone else between listing and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to stat artifact");
                    report.failed += 1;
                    continue;
                }
            };
            report.scanned += 1;

            let age = metadata
                .modified()
                .ok()
                .and_then(|mtime| now.duration_since(mtime).ok())
                .unwrap_or(Duration::ZERO);

            if age <= RETENTION {
                report.kept += 1;
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), age_secs = age.as_secs(), "removed expired artifact");
                    report.removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to remove expired artifact, will retry next sweep");
                    report.failed += 1;
                }
            }
        }

        if report.removed > 0 || report.failed > 0 {
            info!(
                removed = report.removed,
                kept = report.kept,
                failed = report.failed,
                "retention sweep finished"
            );
        }
        report
    }

    /// Sweeps on every interval tick until `cancel` fires. The first sweep runs immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            root = %self.root.display(),
            interval_secs = self.interval.as_secs(),
            "retention janitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                _ = cancel.cancelled() => {
                    info!("retention janitor received shutdown signal");
                    break;
                }
            }
        }
    }

    /// Spawns [`run`](Self::run) onto the current runtime.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
