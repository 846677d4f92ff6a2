mod config;
mod error;
mod models;
mod routes;
mod services;
mod state;

use crate::config::AppConfig;
use crate::services::archive::ArchiveOptions;
use crate::services::backup_job::BackupJobRunner;
use crate::services::backup_scheduler::BackupScheduler;
use crate::services::dump::WsDumpSource;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Starting backup server on port {}", config.port);

    std::fs::create_dir_all(&config.backups_dir)?;

    // Backup pipeline: prune, dump, archive. One worker, one job at a time.
    let db_url = config.db_url.clone();
    let db_name = config.db_name.clone();
    let runner = BackupJobRunner::new(
        ArchiveOptions {
            backups_dir: config.backups_dir.clone(),
            storage_dir: config.storage_dir.clone(),
            version_file: config.version_file.clone(),
        },
        config.max_age,
        config.min_keep,
        move || WsDumpSource::new(db_url.clone(), db_name.clone()),
    );
    let scheduler = BackupScheduler::start(config.backups_dir.clone(), runner);
    scheduler.spawn_triggers(config.initial_delay, config.backup_interval);

    let state = Arc::new(AppState::new(config.clone(), scheduler));
    let app = routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to listen for ctrl+c");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to listen for SIGTERM")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}
