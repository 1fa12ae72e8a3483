//! Parser for yt-dlp output
//!
//! The download is run with a custom `--progress-template` and a tagged
//! `--print after_move:` line so stdout can be parsed line by line without
//! depending on yt-dlp's human-readable progress bar.

use super::traits::{FetchProgress, FetchResult, ProbeResult, RawFormat};
use crate::error::FetchError;
use crate::retry::has_connectivity_signature;
use crate::types::{ProgressSample, VideoMetadata};
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

/// Prefix of progress lines produced by [`PROGRESS_TEMPLATE`]
pub(crate) const PROGRESS_PREFIX: &str = "[media-dl:progress]";

/// Prefix of the final file path line produced by [`FILEPATH_TEMPLATE`]
pub(crate) const FILEPATH_PREFIX: &str = "[media-dl:path]";

/// Value of `--progress-template`: status, downloaded, total, estimate, speed, eta
pub(crate) const PROGRESS_TEMPLATE: &str = "download:[media-dl:progress] %(progress.status)s \
%(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s \
%(progress.speed)s %(progress.eta)s";

/// Value of `--print`, emitted once the file reached its final location
pub(crate) const FILEPATH_TEMPLATE: &str = "after_move:[media-dl:path] %(filepath)s";

/// A classified line of download stdout
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OutputLine {
    /// Progress tick
    Progress(FetchProgress),
    /// Final path of the written file
    FinalPath(PathBuf),
    /// Anything else
    Other,
}

/// Classify one stdout line of a download run
pub(crate) fn parse_output_line(line: &str) -> OutputLine {
    let line = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = line.strip_prefix(FILEPATH_PREFIX) {
        let path = rest.trim();
        if path.is_empty() || path == "NA" {
            return OutputLine::Other;
        }
        return OutputLine::FinalPath(PathBuf::from(path));
    }

    match line.strip_prefix(PROGRESS_PREFIX) {
        Some(rest) => parse_progress_fields(rest)
            .map(OutputLine::Progress)
            .unwrap_or(OutputLine::Other),
        None => OutputLine::Other,
    }
}

fn parse_progress_fields(rest: &str) -> Option<FetchProgress> {
    let fields: Vec<&str> = rest.split_whitespace().collect();
    let (status, numbers) = fields.split_first()?;

    match *status {
        "finished" => Some(FetchProgress::Finished),
        "error" => Some(FetchProgress::ChunkError),
        "downloading" => {
            let field = |index: usize| numbers.get(index).and_then(|v| parse_number(v));

            let downloaded_bytes = field(0).map(|v| v as u64).unwrap_or(0);
            // Exact total first, then the estimate; zero means unknown
            let total_bytes = field(1)
                .or(field(2))
                .filter(|total| *total > 0.0)
                .map(|total| total as u64);
            let speed_bytes_per_sec = field(3).filter(|speed| *speed > 0.0);
            let eta_seconds = field(4).filter(|eta| *eta >= 0.0).map(|eta| eta as u64);

            Some(FetchProgress::Downloading(ProgressSample {
                downloaded_bytes,
                total_bytes,
                speed_bytes_per_sec,
                eta_seconds,
            }))
        }
        _ => None,
    }
}

// yt-dlp prints "NA" (or "None") for missing fields
fn parse_number(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
}

#[derive(Deserialize)]
struct InfoJson {
    title: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<RawFormat>,
}

/// Parse the single-video JSON printed by `yt-dlp -J`
pub(crate) fn parse_probe_json(stdout: &[u8]) -> FetchResult<ProbeResult> {
    let info: InfoJson = serde_json::from_slice(stdout)?;

    let metadata = VideoMetadata {
        title: non_empty_or_unknown(info.title),
        duration_seconds: info
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round() as u64),
        uploader: non_empty_or_unknown(info.uploader),
        thumbnail: info.thumbnail.and_then(|t| Url::parse(&t).ok()),
    };

    Ok(ProbeResult {
        metadata,
        formats: info.formats,
    })
}

fn non_empty_or_unknown(value: Option<String>) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Turn a failed run's exit code and stderr into a [`FetchError`]
///
/// The most relevant line is the last `ERROR:` line; without one the last
/// non-empty line is used.
pub(crate) fn classify_failure(tool: &str, code: Option<i32>, stderr: &str) -> FetchError {
    let detail = stderr
        .lines()
        .rev()
        .find(|line| line.trim_start().starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string());

    match detail {
        Some(detail) if has_connectivity_signature(&detail) => FetchError::Network(detail),
        Some(detail) if detail.starts_with("ERROR:") => FetchError::Extraction(detail),
        _ => FetchError::ToolFailed {
            tool: tool.to_string(),
            code,
            stderr: stderr.trim().to_string(),
        },
    }
}
