//! Traits and types at the media fetcher boundary

use crate::error::FetchError;
use crate::types::{ProgressSample, VideoMetadata};
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::path::PathBuf;

/// Result type alias for fetcher operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Which streams the fetcher should pick from the source
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatSelector {
    /// Best video muxed with best audio, no height ceiling
    BestVideoAudio,
    /// Best video not taller than the given height, muxed with best audio
    MaxHeight(u32),
    /// Best audio-only stream
    BestAudio,
}

impl std::fmt::Display for FormatSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatSelector::BestVideoAudio => f.write_str("bestvideo+bestaudio/best"),
            FormatSelector::MaxHeight(height) => {
                write!(f, "bestvideo[height<={height}]+bestaudio/best")
            }
            FormatSelector::BestAudio => f.write_str("bestaudio/best"),
        }
    }
}

/// Step run by the fetcher after the transfer completes
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PostProcessing {
    /// Transcode the downloaded stream to an audio-only file
    ExtractAudio {
        /// Target codec, e.g. "mp3"
        codec: String,
        /// Target quality in kbps, e.g. "192"
        quality: String,
    },
}

/// Everything a fetcher needs to download one source
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// Source URL
    pub url: String,
    /// Stream selection
    pub selector: FormatSelector,
    /// Directory the output file is written to
    pub output_dir: PathBuf,
    /// File name template, resolved by the fetcher (e.g. `%(title)s.%(ext)s`)
    pub output_template: String,
    /// Container used when video and audio are merged (None for audio-only)
    pub merge_format: Option<String>,
    /// Optional step after the transfer
    pub post_processing: Option<PostProcessing>,
}

/// One progress callback invocation
#[derive(Clone, Debug, PartialEq)]
pub enum FetchProgress {
    /// Bytes are flowing
    Downloading(ProgressSample),
    /// The transfer finished and post-processing (merge/transcode) started
    Finished,
    /// A chunk failed and the extractor is retrying it
    ChunkError,
}

/// Raw format descriptor as reported by the extractor
///
/// Field names follow the extractor's JSON so descriptors deserialize directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawFormat {
    /// Extractor-specific format identifier
    pub format_id: String,
    /// File extension
    pub ext: Option<String>,
    /// Video height in pixels
    pub height: Option<u32>,
    /// Video width in pixels
    pub width: Option<u32>,
    /// Video codec, "none" for audio-only streams
    pub vcodec: Option<String>,
    /// Audio codec, "none" for video-only streams
    pub acodec: Option<String>,
    /// Average audio bitrate in kbps
    pub abr: Option<f64>,
    /// Average total bitrate in kbps
    pub tbr: Option<f64>,
    /// Exact size in bytes
    #[serde(deserialize_with = "lenient_bytes")]
    pub filesize: Option<u64>,
    /// Estimated size in bytes
    #[serde(deserialize_with = "lenient_bytes")]
    pub filesize_approx: Option<u64>,
}

// Some extractors report sizes as floats
fn lenient_bytes<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64))
}

impl RawFormat {
    /// Whether the descriptor carries a video stream
    pub fn has_video(&self) -> bool {
        codec_present(self.vcodec.as_deref())
    }

    /// Whether the descriptor carries an audio stream
    pub fn has_audio(&self) -> bool {
        codec_present(self.acodec.as_deref())
    }

    /// Exact size if known, otherwise the estimate
    pub fn size_bytes(&self) -> Option<u64> {
        self.filesize
            .filter(|size| *size > 0)
            .or(self.filesize_approx.filter(|size| *size > 0))
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if !c.is_empty() && c != "none")
}

/// Output of a format probe
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResult {
    /// Descriptive metadata of the source
    pub metadata: VideoMetadata,
    /// Every format the extractor reported
    pub formats: Vec<RawFormat>,
}

/// Trait for the blocking media extraction capability
///
/// Both operations block the calling thread for the duration of network I/O;
/// callers run them on a blocking worker. The progress callback is invoked
/// synchronously from inside `fetch`; returning [`ControlFlow::Break`] asks the
/// fetcher to abort, after which it returns [`FetchError::Aborted`].
///
/// # Examples
///
/// ```no_run
/// use media_dl::fetcher::{FetchRequest, FormatSelector, MediaFetcher, YtDlpFetcher};
/// use std::ops::ControlFlow;
///
/// let fetcher = YtDlpFetcher::from_path().expect("yt-dlp not found in PATH");
/// let probe = fetcher.probe_formats("https://example.com/watch?v=1")?;
/// println!("{} formats for {}", probe.formats.len(), probe.metadata.title);
///
/// let request = FetchRequest {
///     url: "https://example.com/watch?v=1".to_string(),
///     selector: FormatSelector::MaxHeight(720),
///     output_dir: "./downloads".into(),
///     output_template: "%(title)s.%(ext)s".to_string(),
///     merge_format: Some("mp4".to_string()),
///     post_processing: None,
/// };
/// let path = fetcher.fetch(&request, &mut |_| ControlFlow::Continue(()))?;
/// println!("saved {}", path.display());
/// # Ok::<(), media_dl::FetchError>(())
/// ```
pub trait MediaFetcher: Send + Sync {
    /// Extract metadata and the raw format list without downloading
    fn probe_formats(&self, url: &str) -> FetchResult<ProbeResult>;

    /// Download the selected streams and return the final file path
    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(FetchProgress) -> ControlFlow<()>,
    ) -> FetchResult<PathBuf>;

    /// Get the name of this fetcher implementation
    fn name(&self) -> &'static str;
}
