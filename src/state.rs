use crate::config::AppConfig;
use crate::services::backup_scheduler::BackupScheduler;
use std::sync::Arc;

pub struct AppState {
    pub config: AppConfig,
    pub scheduler: Arc<BackupScheduler>,
}

impl AppState {
    pub fn new(config: AppConfig, scheduler: Arc<BackupScheduler>) -> Self {
        Self { config, scheduler }
    }
}
