//! Size and date formatting for file listings

use chrono::{DateTime, Local, Utc};

/// Shown when neither the cache nor the remote side can describe a file
pub const UNKNOWN: &str = "Unknown";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Human-readable size: `512 B`, `1.5 KB`, `3.2 MB`, `1.0 GB`
pub fn format_file_size(size_bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size_bytes < KB {
        format!("{} B", size_bytes)
    } else if size_bytes < MB {
        format!("{:.1} KB", size_bytes as f64 / KB as f64)
    } else if size_bytes < GB {
        format!("{:.1} MB", size_bytes as f64 / MB as f64)
    } else {
        format!("{:.1} GB", size_bytes as f64 / GB as f64)
    }
}

/// Local-time `YYYY-MM-DD HH:MM`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(DATE_FORMAT).to_string()
}

/// Like [`format_timestamp`] for Unix seconds; out-of-range values are unknown
pub fn format_unix_timestamp(secs: i64) -> String {
    DateTime::from_timestamp(secs, 0)
        .map(format_timestamp)
        .unwrap_or_else(|| UNKNOWN.to_string())
}
