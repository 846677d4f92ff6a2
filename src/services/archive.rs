//! Builds one compressed backup archive: the database dump, a metadata
//! document, and a recursive copy of the storage directory.
//!
//! The dump and metadata are staged on a scratch directory next to the
//! final archive, then a single in-process tar+gzip pass writes a temp
//! file that is renamed into place. Readers of the backups directory
//! never observe a half-written archive.

use crate::models::archive::ArchiveFile;
use crate::services::backup_name;
use crate::services::dump::{stream_dump, DumpSource};
use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub backups_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub version_file: PathBuf,
}

#[derive(Serialize)]
struct ArchiveInfo {
    version: String,
    hostname: String,
    directory: String,
}

pub async fn build<S: DumpSource>(
    opts: &ArchiveOptions,
    identifier: &str,
    source: S,
) -> anyhow::Result<ArchiveFile> {
    let created_at = backup_name::parse_identifier(identifier)
        .with_context(|| format!("invalid backup identifier: {identifier}"))?;

    // Removed on drop, so the staging area is cleaned up on every exit
    // path, including dump and finalize failures.
    let scratch = tempfile::tempdir_in(&opts.backups_dir)
        .context("failed to create scratch directory")?;

    let dump_path = scratch.path().join("db.json");
    let dump_file = tokio::fs::File::create(&dump_path)
        .await
        .context("failed to create dump staging file")?;
    stream_dump(source, tokio::io::BufWriter::new(dump_file)).await?;

    let info = ArchiveInfo {
        version: read_version(&opts.version_file).await,
        hostname: hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".into()),
        directory: opts.storage_dir.display().to_string(),
    };
    tokio::fs::write(
        scratch.path().join("info.json"),
        serde_json::to_vec_pretty(&info)?,
    )
    .await
    .context("failed to write info.json")?;

    let tmp_path = opts.backups_dir.join(format!("{identifier}.tmp"));
    let final_path = opts.backups_dir.join(backup_name::archive_filename(identifier));

    let result = {
        let tmp = tmp_path.clone();
        let staged = scratch.path().to_path_buf();
        let storage = opts.storage_dir.clone();
        tokio::task::spawn_blocking(move || write_archive(&tmp, &staged, &storage))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|r| r)
    };
    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.context("archive finalization failed"));
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, &final_path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(anyhow::Error::from(e).context("failed to publish archive"));
    }

    let size_bytes = tokio::fs::metadata(&final_path).await?.len();
    tracing::info!(identifier, size_bytes, "backup archive created");

    Ok(ArchiveFile {
        identifier: identifier.to_string(),
        size_bytes,
        created_at,
    })
}

/// Version-file reads are best-effort: a missing or unreadable file
/// records the sentinel instead of failing the job.
async fn read_version(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(version) => version.trim().to_string(),
        Err(_) => "unknown".to_string(),
    }
}

fn write_archive(tmp_path: &Path, staged: &Path, storage_dir: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(tmp_path)?;
    let encoder = GzEncoder::new(std::io::BufWriter::new(file), Compression::best());
    let mut builder = tar::Builder::new(encoder);

    builder.append_path_with_name(staged.join("db.json"), "db.json")?;
    builder.append_path_with_name(staged.join("info.json"), "info.json")?;
    append_storage(&mut builder, storage_dir)?;

    let encoder = builder.into_inner()?;
    let mut output = encoder.finish()?;
    output.flush()?;
    Ok(())
}

fn append_storage<W: Write>(
    builder: &mut tar::Builder<W>,
    storage_dir: &Path,
) -> anyhow::Result<()> {
    builder
        .append_dir("storage", storage_dir)
        .context("storage directory is not readable")?;

    for entry in WalkDir::new(storage_dir).min_depth(1) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(storage_dir)?;
        let name = Path::new("storage").join(relative);
        if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())?;
        } else if entry.file_type().is_file() {
            builder.append_path_with_name(entry.path(), &name)?;
        }
        // symlinks and special files are not part of the storage contract
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::dump::testing::{FailingDumpSource, ScriptedDumpSource};
    use crate::services::dump::DumpRecord;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn setup(root: &Path) -> ArchiveOptions {
        let opts = ArchiveOptions {
            backups_dir: root.join("backups"),
            storage_dir: root.join("storage"),
            version_file: root.join("version"),
        };
        std::fs::create_dir_all(&opts.backups_dir).unwrap();
        std::fs::create_dir_all(opts.storage_dir.join("sub")).unwrap();
        std::fs::write(opts.storage_dir.join("a.txt"), b"alpha").unwrap();
        std::fs::write(opts.storage_dir.join("sub/b.txt"), b"beta").unwrap();
        opts
    }

    fn scripted() -> ScriptedDumpSource {
        ScriptedDumpSource {
            records: vec![
                DumpRecord::Request {
                    method: "createTable".into(),
                    parameters: vec![serde_json::json!("users")],
                },
                DumpRecord::Sync,
                DumpRecord::Request {
                    method: "put".into(),
                    parameters: vec![serde_json::json!("users"), serde_json::json!({"id": 1})],
                },
            ],
        }
    }

    fn backup_dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn builds_archive_with_three_entries() {
        let root = tempfile::tempdir().unwrap();
        let opts = setup(root.path());
        std::fs::write(&opts.version_file, "1.2.3\n").unwrap();

        let identifier = "2024_05_06_07_08_09_123";
        let archive = build(&opts, identifier, scripted()).await.unwrap();
        assert_eq!(archive.identifier, identifier);
        assert!(archive.size_bytes > 0);
        assert_eq!(
            archive.created_at,
            backup_name::parse_identifier(identifier).unwrap()
        );

        // No temp artifacts or scratch directories survive.
        assert_eq!(
            backup_dir_entries(&opts.backups_dir),
            vec![format!("{identifier}.tar.gz")]
        );

        let file = std::fs::File::open(opts.backups_dir.join(archive.filename())).unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        let mut names = Vec::new();
        let mut db = String::new();
        let mut info = String::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            if path == "db.json" {
                entry.read_to_string(&mut db).unwrap();
            } else if path == "info.json" {
                entry.read_to_string(&mut info).unwrap();
            }
            names.push(path);
        }

        let top_level: Vec<&String> = names
            .iter()
            .filter(|n| !n.starts_with("storage"))
            .collect();
        assert_eq!(top_level, ["db.json", "info.json"]);
        assert!(names.iter().any(|n| n == "storage/a.txt"));
        assert!(names.iter().any(|n| n == "storage/sub/b.txt"));

        let lines: Vec<&str> = db.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in &lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["type"], "request");

        let info: serde_json::Value = serde_json::from_str(&info).unwrap();
        assert_eq!(info["version"], "1.2.3");
        assert!(!info["hostname"].as_str().unwrap().is_empty());
        assert!(info["directory"].as_str().unwrap().contains("storage"));
    }

    #[tokio::test]
    async fn missing_version_file_records_unknown() {
        let root = tempfile::tempdir().unwrap();
        let opts = setup(root.path());

        let identifier = "2024_05_06_07_08_09_124";
        build(&opts, identifier, scripted()).await.unwrap();

        let file = std::fs::File::open(
            opts.backups_dir.join(backup_name::archive_filename(identifier)),
        )
        .unwrap();
        let mut tar = tar::Archive::new(GzDecoder::new(file));
        let mut info = String::new();
        for entry in tar.entries().unwrap() {
            let mut entry = entry.unwrap();
            if entry.path().unwrap().to_string_lossy() == "info.json" {
                entry.read_to_string(&mut info).unwrap();
            }
        }
        let info: serde_json::Value = serde_json::from_str(&info).unwrap();
        assert_eq!(info["version"], "unknown");
    }

    #[tokio::test]
    async fn failed_dump_leaves_no_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let opts = setup(root.path());

        let err = build(&opts, "2024_05_06_07_08_09_125", FailingDumpSource)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("dump session"));
        assert!(backup_dir_entries(&opts.backups_dir).is_empty());
    }

    #[tokio::test]
    async fn rejects_malformed_identifier() {
        let root = tempfile::tempdir().unwrap();
        let opts = setup(root.path());
        let err = build(&opts, "not-a-timestamp", scripted()).await.unwrap_err();
        assert!(format!("{err:#}").contains("invalid backup identifier"));
    }
}
