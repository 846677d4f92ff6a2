use crate::error::AppError;
use crate::services::backup_name;
use crate::services::progress::ProgressStream;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path as AxumPath, Request, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/backup", get(list_backups))
        .route("/backup/doBackup", get(trigger_backup))
        .route("/backup/latest", get(latest_backup))
        .route("/backup/download/{file_name}", get(download_backup))
        .route("/backup/upload/{file_name}", post(upload_backup))
}

async fn trigger_backup(State(state): State<Arc<AppState>>) -> String {
    let outcome = state.scheduler.trigger().await;
    if outcome.started {
        format!("Creating backup: {}", outcome.filename)
    } else {
        format!("Backup in progress: {}", outcome.filename)
    }
}

async fn list_backups(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let host = request_host(&headers)?.to_string();

    let mut entries = tokio::fs::read_dir(&state.config.backups_dir)
        .await
        .map_err(|e| AppError::Internal(e.into()))?;
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::Internal(e.into()))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(backup_name::ARCHIVE_SUFFIX) {
            names.push(name);
        }
    }
    // Identifier order is chronological order, so a name sort gives
    // newest-first after reversing.
    names.sort();
    names.reverse();

    let body = names
        .iter()
        .map(|name| format!("https://{host}/backup/download/{name}"))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(([(header::CONTENT_TYPE, "text/plain")], body).into_response())
}

async fn latest_backup(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<String, AppError> {
    let host = request_host(&headers)?.to_string();
    let latest = tokio::fs::read_to_string(state.config.backups_dir.join("latest.txt"))
        .await
        .map_err(|_| AppError::NotFound("no completed backup yet".into()))?;
    Ok(format!(
        "https://{host}/backup/download/{}",
        latest.trim()
    ))
}

async fn download_backup(
    State(state): State<Arc<AppState>>,
    AxumPath(file_name): AxumPath<String>,
) -> Result<Response, AppError> {
    validated_file_name(&file_name)?;
    let path = state.config.backups_dir.join(&file_name);

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!("backup {file_name} not found")))
        }
        Err(e) => return Err(AppError::Internal(e.into())),
    };
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::Internal(e.into()))?
        .len();

    let headers = [
        (header::CONTENT_TYPE, "application/gzip".to_string()),
        (header::CONTENT_LENGTH, len.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{file_name}\""),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

async fn upload_backup(
    State(state): State<Arc<AppState>>,
    AxumPath(file_name): AxumPath<String>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response, AppError> {
    validated_file_name(&file_name)?;
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let final_path = state.config.backups_dir.join(&file_name);
    let tmp_path = state.config.backups_dir.join(format!("{file_name}.upload"));

    let body_stream = request
        .into_body()
        .into_data_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));
    let mut stream = ProgressStream::new(body_stream, declared);

    match write_upload(&tmp_path, &final_path, &mut stream).await {
        Ok(()) => {
            tracing::info!(file = %file_name, bytes = stream.transferred(), "backup upload complete");
            Ok(stream.transferred().to_string().into_response())
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            tracing::warn!(file = %file_name, error = %e, "backup upload failed");
            Err(AppError::ServiceUnavailable(format!("Error {e}")))
        }
    }
}

/// Streams the body into a temp file, then renames it into place, so a
/// failed transfer never leaves a file under the final name.
async fn write_upload<S>(
    tmp_path: &Path,
    final_path: &Path,
    stream: &mut S,
) -> std::io::Result<()>
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Unpin,
{
    let mut file = tokio::fs::File::create(tmp_path).await?;
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    drop(file);
    tokio::fs::rename(tmp_path, final_path).await
}

fn request_host(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing Host header".into()))
}

fn validated_file_name(file_name: &str) -> Result<(), AppError> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) || file_name.contains("..") {
        return Err(AppError::BadRequest("invalid backup filename".into()));
    }
    Ok(())
}
