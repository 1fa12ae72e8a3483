//! Utility functions for human-readable formatting and output paths

use std::path::{Path, PathBuf};

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Format a byte count with binary (1024) steps
///
/// Zero and negative values render as `"0B"`.
///
/// # Examples
///
/// ```
/// use media_dl::utils::human_size;
///
/// assert_eq!(human_size(0.0), "0B");
/// assert_eq!(human_size(512.0), "512.0 B");
/// assert_eq!(human_size(1536.0), "1.5 KB");
/// assert_eq!(human_size(2.0 * 1024.0 * 1024.0), "2.0 MB");
/// ```
pub fn human_size(bytes: f64) -> String {
    if !bytes.is_finite() || bytes <= 0.0 {
        return "0B".to_string();
    }

    let mut value = bytes;
    for unit in SIZE_UNITS {
        if value < 1024.0 {
            return format!("{value:3.1} {unit}");
        }
        value /= 1024.0;
    }
    format!("{value:.1} PB")
}

/// Format seconds as `h:mm:ss`, or `m:ss` below one hour
///
/// # Examples
///
/// ```
/// use media_dl::utils::format_seconds;
///
/// assert_eq!(format_seconds(5), "0:05");
/// assert_eq!(format_seconds(754), "12:34");
/// assert_eq!(format_seconds(3725), "1:02:05");
/// ```
pub fn format_seconds(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

/// Resolve the directory a download writes into
///
/// An empty `requested` path falls back to `default_dir`. Relative paths are
/// made absolute against the current working directory so a resumed download
/// lands in the same place even if the working directory changes later.
pub fn resolve_output_dir(requested: &Path, default_dir: &Path) -> PathBuf {
    let dir = if requested.as_os_str().is_empty() {
        default_dir
    } else {
        requested
    };
    std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf())
}
