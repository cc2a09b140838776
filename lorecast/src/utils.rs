//! Small shared helpers: identifiers, timestamps, filename safety.

use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

/// Generates a random v4 UUID as a string.
#[must_use]
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

/// Returns the current time as an ISO 8601 / RFC 3339 timestamp.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Reduces a video title to a string safe for use as a backup filename.
///
/// Keeps alphanumerics, spaces, dashes and underscores, then replaces
/// spaces with underscores.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    kept.trim().replace(' ', "_")
}
