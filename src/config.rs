use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub db_url: String,
    pub db_name: String,
    pub backups_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub version_file: PathBuf,
    pub username: Option<String>,
    pub password: Option<String>,
    pub max_age: chrono::Duration,
    pub min_keep: usize,
    pub initial_delay: Duration,
    pub backup_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: std::env::var("BACKUP_SERVICE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8007),
            db_url: std::env::var("DB_URL")
                .unwrap_or_else(|_| "ws://localhost:9417/api/ws".into()),
            db_name: std::env::var("DB_NAME").unwrap_or_default(),
            backups_dir: PathBuf::from(
                std::env::var("BACKUPS_DIR").unwrap_or_else(|_| "../../backups".into()),
            ),
            storage_dir: PathBuf::from(
                std::env::var("STORAGE_DIR").unwrap_or_else(|_| "../../storage".into()),
            ),
            version_file: PathBuf::from(
                std::env::var("VERSION_FILE").unwrap_or_else(|_| "../../version".into()),
            ),
            username: std::env::var("BACKUP_SERVER_USERNAME").ok(),
            password: std::env::var("BACKUP_SERVER_PASSWORD").ok(),
            max_age: chrono::Duration::days(
                std::env::var("RETENTION_MAX_AGE_DAYS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            ),
            min_keep: std::env::var("RETENTION_MIN_KEEP")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            initial_delay: Duration::from_secs(
                std::env::var("INITIAL_BACKUP_DELAY_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            ),
            backup_interval: Duration::from_secs(
                std::env::var("BACKUP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(24 * 3600),
            ),
        }
    }
}
