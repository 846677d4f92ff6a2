//! Age/count retention over the backups directory.
//!
//! The floor count wins over the age rule: the `min_keep` newest
//! archives are never eligible for deletion, no matter how old.

use crate::models::archive::ArchiveFile;
use crate::services::backup_name;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// Selects identifiers eligible for deletion. `archives` must be sorted
/// ascending by identifier, which is chronological order.
pub fn select_for_deletion(
    archives: &[ArchiveFile],
    max_age: Duration,
    min_keep: usize,
    now: DateTime<Utc>,
) -> Vec<String> {
    if archives.len() <= min_keep {
        return Vec::new();
    }
    let cutoff = archives.len() - min_keep;
    archives[..cutoff]
        .iter()
        .filter(|archive| now - archive.created_at > max_age)
        .map(|archive| archive.identifier.clone())
        .collect()
}

/// Lists archive files in `backups_dir`. Files whose name does not parse
/// into a valid identifier are logged and left alone; deleting an
/// unrecognized file is never an option.
pub async fn list_archives(backups_dir: &Path) -> anyhow::Result<Vec<ArchiveFile>> {
    let mut entries = tokio::fs::read_dir(backups_dir).await?;
    let mut archives = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let Some(identifier) = file_name.strip_suffix(backup_name::ARCHIVE_SUFFIX) else {
            continue;
        };
        let Some(created_at) = backup_name::parse_identifier(identifier) else {
            tracing::warn!(file = %file_name, "unrecognized archive name, leaving in place");
            continue;
        };
        let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
        archives.push(ArchiveFile {
            identifier: identifier.to_string(),
            size_bytes,
            created_at,
        });
    }
    Ok(archives)
}

/// Prunes expired archives. Deletions are independent: one failure is
/// logged and the rest of the batch proceeds.
pub async fn remove_old_backups(
    backups_dir: &Path,
    max_age: Duration,
    min_keep: usize,
) -> anyhow::Result<()> {
    let mut archives = list_archives(backups_dir).await?;
    archives.sort_by(|a, b| a.identifier.cmp(&b.identifier));

    let doomed = select_for_deletion(&archives, max_age, min_keep, Utc::now());
    for identifier in doomed {
        let path = backups_dir.join(backup_name::archive_filename(&identifier));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::info!(identifier = %identifier, "removed expired backup"),
            Err(e) => {
                tracing::warn!(identifier = %identifier, error = %e, "failed to remove expired backup")
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive_aged(now: DateTime<Utc>, age_days: i64) -> ArchiveFile {
        let created_at = now - Duration::days(age_days);
        ArchiveFile {
            identifier: backup_name::identifier_for(created_at),
            size_bytes: 1,
            created_at,
        }
    }

    fn ascending(mut archives: Vec<ArchiveFile>) -> Vec<ArchiveFile> {
        archives.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        archives
    }

    #[test]
    fn keeps_floor_count_regardless_of_age() {
        let now = Utc::now();
        // All archives far older than max_age.
        let archives = ascending((0..5).map(|i| archive_aged(now, 100 + i)).collect());
        let doomed = select_for_deletion(&archives, Duration::days(10), 5, now);
        assert!(doomed.is_empty());
    }

    #[test]
    fn empty_selection_when_count_at_or_below_floor() {
        let now = Utc::now();
        let archives = ascending((0..3).map(|i| archive_aged(now, 100 + i)).collect());
        assert!(select_for_deletion(&archives, Duration::days(1), 10, now).is_empty());
        assert!(select_for_deletion(&[], Duration::days(1), 0, now).is_empty());
    }

    #[test]
    fn selects_only_old_archives_beyond_floor() {
        let now = Utc::now();
        // 12 archives spanning 30 days, min_keep 10, max_age 10 days.
        let archives = ascending(
            (0..12)
                .map(|i| archive_aged(now, 30 - (i as i64 * 30 / 11)))
                .collect(),
        );
        let doomed = select_for_deletion(&archives, Duration::days(10), 10, now);
        // Only the two oldest are candidates; both exceed ten days.
        assert_eq!(doomed.len(), 2);
        assert_eq!(doomed[0], archives[0].identifier);
        assert_eq!(doomed[1], archives[1].identifier);
    }

    #[test]
    fn young_candidates_survive_even_beyond_floor() {
        let now = Utc::now();
        // 12 recent archives: candidates beyond the floor exist, but
        // none exceed the age limit.
        let archives = ascending((0..12).map(|i| archive_aged(now, i as i64 % 5)).collect());
        let doomed = select_for_deletion(&archives, Duration::days(10), 10, now);
        assert!(doomed.is_empty());
    }

    #[tokio::test]
    async fn prunes_expired_files_and_skips_unrecognized_names() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();

        let old = archive_aged(now, 20);
        let older = archive_aged(now, 25);
        let fresh = archive_aged(now, 1);
        for archive in [&older, &old, &fresh] {
            tokio::fs::write(dir.path().join(archive.filename()), b"x")
                .await
                .unwrap();
        }
        tokio::fs::write(dir.path().join("garbage.tar.gz"), b"x")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("latest.txt"), fresh.filename())
            .await
            .unwrap();

        remove_old_backups(dir.path(), Duration::days(10), 1)
            .await
            .unwrap();

        assert!(!dir.path().join(older.filename()).exists());
        assert!(!dir.path().join(old.filename()).exists());
        assert!(dir.path().join(fresh.filename()).exists());
        assert!(dir.path().join("garbage.tar.gz").exists());
        assert!(dir.path().join("latest.txt").exists());
    }
}
