//! Production backup pipeline: prune expired archives, then build the
//! new one. A fresh dump session is opened for every run.

use crate::models::archive::ArchiveFile;
use crate::services::archive::{self, ArchiveOptions};
use crate::services::backup_scheduler::JobRunner;
use crate::services::dump::DumpSource;
use crate::services::retention;
use std::future::Future;

pub struct BackupJobRunner<F> {
    archive: ArchiveOptions,
    max_age: chrono::Duration,
    min_keep: usize,
    make_source: F,
}

impl<F, S> BackupJobRunner<F>
where
    F: FnMut() -> S + Send + 'static,
    S: DumpSource,
{
    pub fn new(
        archive: ArchiveOptions,
        max_age: chrono::Duration,
        min_keep: usize,
        make_source: F,
    ) -> Self {
        Self {
            archive,
            max_age,
            min_keep,
            make_source,
        }
    }
}

impl<F, S> JobRunner for BackupJobRunner<F>
where
    F: FnMut() -> S + Send + 'static,
    S: DumpSource,
{
    fn run(
        &mut self,
        identifier: &str,
    ) -> impl Future<Output = anyhow::Result<ArchiveFile>> + Send {
        async move {
            retention::remove_old_backups(&self.archive.backups_dir, self.max_age, self.min_keep)
                .await?;
            archive::build(&self.archive, identifier, (self.make_source)()).await
        }
    }
}
