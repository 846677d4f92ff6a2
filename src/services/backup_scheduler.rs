//! Single-flight backup scheduling.
//!
//! At most one backup job runs at a time. Triggers arriving while a job
//! is in flight are answered with that job's filename instead of
//! starting new work. Beneath the Idle/Running check, a bounded
//! single-worker queue serializes the actual builds.

use crate::models::archive::ArchiveFile;
use crate::services::backup_name;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// The unit of work the scheduler serializes. Production runs the
/// retention prune followed by an archive build; tests substitute stubs.
pub trait JobRunner: Send + 'static {
    fn run(
        &mut self,
        identifier: &str,
    ) -> impl Future<Output = anyhow::Result<ArchiveFile>> + Send;
}

#[derive(Debug, Clone)]
pub struct TriggerOutcome {
    pub filename: String,
    /// False when the trigger was absorbed into an already-running job.
    pub started: bool,
}

struct CurrentJob {
    filename: String,
}

pub struct BackupScheduler {
    backups_dir: PathBuf,
    current: Mutex<Option<CurrentJob>>,
    queue: mpsc::Sender<String>,
}

impl BackupScheduler {
    /// Spawns the single worker task and returns the scheduler handle.
    pub fn start<R: JobRunner>(backups_dir: PathBuf, mut runner: R) -> Arc<Self> {
        let (queue, mut jobs) = mpsc::channel::<String>(1);
        let scheduler = Arc::new(Self {
            backups_dir,
            current: Mutex::new(None),
            queue,
        });

        let worker = Arc::clone(&scheduler);
        tokio::spawn(async move {
            while let Some(identifier) = jobs.recv().await {
                let result = runner.run(&identifier).await;
                worker.settle(&identifier, result).await;
            }
        });

        scheduler
    }

    /// Starts a backup job, or returns the in-flight one.
    pub async fn trigger(&self) -> TriggerOutcome {
        let mut current = self.current.lock().await;
        if let Some(job) = current.as_ref() {
            return TriggerOutcome {
                filename: job.filename.clone(),
                started: false,
            };
        }

        let identifier = backup_name::current_identifier();
        let filename = backup_name::archive_filename(&identifier);
        if let Err(e) = self.queue.try_send(identifier) {
            // The queue only fills while a job is running, and the idle
            // check above already answers that case.
            tracing::warn!(error = %e, "backup queue rejected job");
            return TriggerOutcome {
                filename,
                started: false,
            };
        }
        *current = Some(CurrentJob {
            filename: filename.clone(),
        });
        tracing::info!(filename = %filename, "backup job started");
        TriggerOutcome {
            filename,
            started: true,
        }
    }

    /// One-shot startup trigger after `initial_delay` (avoids a stampede
    /// right at deploy time), then a recurring trigger every `period`.
    pub fn spawn_triggers(self: &Arc<Self>, initial_delay: Duration, period: Duration) {
        let startup = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            let outcome = startup.trigger().await;
            tracing::info!(filename = %outcome.filename, started = outcome.started, "startup backup trigger");
        });

        let recurring = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                let outcome = recurring.trigger().await;
                tracing::info!(filename = %outcome.filename, started = outcome.started, "scheduled backup trigger");
            }
        });
    }

    async fn settle(&self, identifier: &str, result: anyhow::Result<ArchiveFile>) {
        match result {
            Ok(archive) => {
                let latest = self.backups_dir.join("latest.txt");
                if let Err(e) = tokio::fs::write(&latest, archive.filename()).await {
                    tracing::warn!(error = %e, "failed to update latest.txt");
                }
                tracing::info!(identifier, size_bytes = archive.size_bytes, "backup completed");
            }
            Err(e) => {
                // The previous successful archive stays "latest"; the
                // next scheduled trigger is the retry mechanism.
                tracing::error!(identifier, error = %format!("{e:#}"), "backup failed");
            }
        }
        *self.current.lock().await = None;
    }
}
