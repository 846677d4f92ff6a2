use chrono::{DateTime, NaiveDateTime, Utc};

pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Underscore-delimited, fixed-width, millisecond precision. String order
/// of two identifiers matches the order of the timestamps they encode.
const IDENTIFIER_FORMAT: &str = "%Y_%m_%d_%H_%M_%S_%3f";

pub fn identifier_for(timestamp: DateTime<Utc>) -> String {
    timestamp.format(IDENTIFIER_FORMAT).to_string()
}

pub fn current_identifier() -> String {
    identifier_for(Utc::now())
}

/// Strict inverse of `identifier_for`. Anything that does not round-trip
/// back to the exact input string is rejected, so padded widths are
/// enforced and trailing garbage never parses.
pub fn parse_identifier(identifier: &str) -> Option<DateTime<Utc>> {
    let parsed = NaiveDateTime::parse_from_str(identifier, IDENTIFIER_FORMAT)
        .ok()?
        .and_utc();
    if identifier_for(parsed) == identifier {
        Some(parsed)
    } else {
        None
    }
}

pub fn archive_filename(identifier: &str) -> String {
    format!("{identifier}{ARCHIVE_SUFFIX}")
}
