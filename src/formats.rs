//! Format options offered to the user and the stream selection policy
//!
//! [`build_options`] reduces the extractor's raw descriptors to one option per
//! video height (auto first, then tallest to shortest). [`select_format`] maps
//! a download request back to a [`FormatSelector`].

use crate::config::YtDlpConfig;
use crate::fetcher::{FormatSelector, PostProcessing, RawFormat};
use crate::types::{DownloadRequest, FormatMode, FormatOption, ResolutionChoice};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Label of the option that places no height ceiling on the download
pub const AUTO_LABEL: &str = "Auto (recommended)";

/// Number of labels included in the "formats fetched" log line
const SUMMARY_LABELS: usize = 6;

// Pattern is a literal, so compilation cannot fail at runtime
#[allow(clippy::expect_used)]
fn height_label_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+)\s*p").expect("valid height label pattern"))
}

/// Build the option list from raw format descriptors
///
/// For each height the variant with the highest `tbr + width / 1000` score
/// wins. The size estimate is that variant's size plus the best audio-only
/// track's size (highest `abr`), or `None` when neither size is known.
pub fn build_options(formats: &[RawFormat]) -> Vec<FormatOption> {
    let mut best_audio: Option<&RawFormat> = None;
    let mut by_height: BTreeMap<u32, (f64, &RawFormat)> = BTreeMap::new();

    for format in formats {
        if !format.has_video() && format.has_audio() {
            let abr = format.abr.unwrap_or(0.0);
            if best_audio.is_none_or(|best| abr > best.abr.unwrap_or(0.0)) {
                best_audio = Some(format);
            }
        }

        if format.has_video()
            && let Some(height) = format.height.filter(|h| *h > 0)
        {
            let score =
                format.tbr.unwrap_or(0.0) + f64::from(format.width.unwrap_or(0)) / 1000.0;
            let replace = by_height
                .get(&height)
                .is_none_or(|(current, _)| score > *current);
            if replace {
                by_height.insert(height, (score, format));
            }
        }
    }

    let audio_bytes = best_audio.and_then(RawFormat::size_bytes);

    let mut options = Vec::with_capacity(by_height.len() + 1);
    options.push(FormatOption {
        label: AUTO_LABEL.to_string(),
        height_px: None,
        estimated_bytes: None,
    });

    for (height, (_, format)) in by_height.into_iter().rev() {
        let estimated_bytes = match (format.size_bytes(), audio_bytes) {
            (None, None) => None,
            (video, audio) => Some(video.unwrap_or(0) + audio.unwrap_or(0)),
        };
        options.push(FormatOption {
            label: format!("{height}p"),
            height_px: Some(height),
            estimated_bytes,
        });
    }

    options
}

/// Parse the height out of a label such as `"720p"` or `"1080p60"`
pub fn parse_height_label(label: &str) -> Option<u32> {
    height_label_regex()
        .captures(label)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .filter(|height| *height > 0)
}

/// Pick the stream selector for a download
///
/// `formats_ready` is false while a fetch is in flight or when none has
/// completed; a listed resolution cannot be trusted then and the selection
/// falls back to best video plus audio.
pub fn select_format(request: &DownloadRequest, formats_ready: bool) -> FormatSelector {
    match request.mode {
        FormatMode::Audio => FormatSelector::BestAudio,
        FormatMode::Video => match &request.resolution {
            ResolutionChoice::Label(label) if formats_ready => parse_height_label(label)
                .map(FormatSelector::MaxHeight)
                .unwrap_or(FormatSelector::BestVideoAudio),
            _ => FormatSelector::BestVideoAudio,
        },
    }
}

/// Post-processing step for a mode: audio gets a transcode, video nothing
pub fn post_processing_for(mode: FormatMode, config: &YtDlpConfig) -> Option<PostProcessing> {
    match mode {
        FormatMode::Audio => Some(PostProcessing::ExtractAudio {
            codec: config.audio_codec.clone(),
            quality: config.audio_quality.clone(),
        }),
        FormatMode::Video => None,
    }
}

/// Container for merged video output; audio downloads are not merged
pub fn merge_format_for(mode: FormatMode, config: &YtDlpConfig) -> Option<String> {
    match mode {
        FormatMode::Video => Some(config.merge_output_format.clone()),
        FormatMode::Audio => None,
    }
}

/// Log line announcing the first few labels of a fetched list
pub fn summary_line(options: &[FormatOption]) -> String {
    let labels: Vec<&str> = options
        .iter()
        .take(SUMMARY_LABELS)
        .map(|o| o.label.as_str())
        .collect();
    format!("Formats fetched: {}", labels.join(", "))
}
