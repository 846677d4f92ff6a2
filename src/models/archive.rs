use crate::services::backup_name;
use chrono::{DateTime, Utc};

/// A completed backup archive on durable storage.
///
/// `created_at` is recovered from the identifier embedded in the
/// filename; filesystem mtimes are not trusted.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveFile {
    pub identifier: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl ArchiveFile {
    pub fn filename(&self) -> String {
        backup_name::archive_filename(&self.identifier)
    }
}
