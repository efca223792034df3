//! Display helpers for dates, sizes and clone URLs.

use chrono::{DateTime, FixedOffset, Utc};

/// Describes how long ago `date` was, relative to `now`.
///
/// Within a month this is relative ("just now", "3 hours ago", "yesterday",
/// "2 weeks ago"); anything older, or in the future, is a calendar date.
pub fn pretty_date(date: DateTime<FixedOffset>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(date);
    let days = elapsed.num_days();
    let seconds = elapsed.num_seconds();

    if seconds < 0 || days >= 31 {
        return date.format("%B %-d, %Y").to_string();
    }

    match days {
        0 => match seconds {
            0..=59 => "just now".to_string(),
            60..=119 => "1 minute ago".to_string(),
            120..=3599 => format!("{} minutes ago", seconds / 60),
            3600..=7199 => "1 hour ago".to_string(),
            _ => format!("{} hours ago", seconds / 3600),
        },
        1 => "yesterday".to_string(),
        2..=6 => format!("{} days ago", days),
        _ => format!("{} weeks ago", (days + 6) / 7),
    }
}

/// Builds `scheme://[identity@]host/name`.
///
/// A domain-qualified identity (`DOMAIN\user`) contributes only the user part.
pub fn clone_url(scheme: &str, host: &str, identity: Option<&str>, name: &str) -> String {
    match identity.and_then(|id| id.rsplit('\\').next()).filter(|u| !u.is_empty()) {
        Some(user) => format!("{}://{}@{}/{}", scheme, user, host, name),
        None => format!("{}://{}/{}", scheme, host, name),
    }
}

/// Format file size.
pub fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Returns true if the data looks binary (a NUL in the first 8000 bytes).
pub fn is_binary_content(data: &[u8]) -> bool {
    let check_len = data.len().min(8000);
    data[..check_len].contains(&0)
}
