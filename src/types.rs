//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Unique identifier for a job within a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two kinds of background work a session runs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// Metadata and format extraction
    Fetch,
    /// Full media download
    Download,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Fetch => f.write_str("fetch"),
            JobKind::Download => f.write_str("download"),
        }
    }
}

/// One logical unit of background work
///
/// The cancellation token is owned by the job, so cancelling one job can never
/// leak into the next one of the same kind.
#[derive(Clone, Debug)]
pub struct Job {
    /// Session-unique identifier
    pub id: JobId,
    /// Fetch or download
    pub kind: JobKind,
    /// Cooperative cancellation flag, observed by the worker at each checkpoint
    pub cancel: CancellationToken,
    /// When the job was started
    pub started_at: DateTime<Utc>,
}

impl Job {
    /// Create a job that starts now with a fresh cancellation token
    pub fn new(id: JobId, kind: JobKind) -> Self {
        Self {
            id,
            kind,
            cancel: CancellationToken::new(),
            started_at: Utc::now(),
        }
    }

    /// Whether cancellation has been requested (monotonic)
    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What the user wants to keep from the source
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatMode {
    /// Video muxed with audio (default)
    #[default]
    Video,
    /// Audio only, transcoded after extraction
    Audio,
}

/// Resolution picked by the user from the fetched format list
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    /// Best available, no height ceiling
    #[default]
    Auto,
    /// A label taken from a [`FormatOption`], e.g. `"720p"`
    Label(String),
}

impl ResolutionChoice {
    /// Build a choice from a label, mapping the auto option back to [`ResolutionChoice::Auto`]
    pub fn from_label(label: impl Into<String>) -> Self {
        let label = label.into();
        if label.trim().is_empty() || label == crate::formats::AUTO_LABEL {
            ResolutionChoice::Auto
        } else {
            ResolutionChoice::Label(label)
        }
    }
}

/// Arguments of a download intent, kept verbatim so a resumed download is identical
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL
    pub url: String,
    /// Video or audio-only
    pub mode: FormatMode,
    /// Selected resolution (ignored in audio mode)
    pub resolution: ResolutionChoice,
    /// Directory the fetcher writes into
    pub output_dir: PathBuf,
}

/// A quality option offered to the user
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOption {
    /// Display label, e.g. `"1080p"` or `"Auto (recommended)"`
    pub label: String,
    /// Video height in pixels (None for the auto option)
    pub height_px: Option<u32>,
    /// Estimated size of video plus best audio, when the source reports sizes
    pub estimated_bytes: Option<u64>,
}

/// Descriptive metadata of the source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMetadata {
    /// Title (or "Unknown")
    pub title: String,
    /// Duration in seconds, when known
    pub duration_seconds: Option<u64>,
    /// Uploader name (or "Unknown")
    pub uploader: String,
    /// Thumbnail location, when the source provides a valid URL
    pub thumbnail: Option<Url>,
}

/// One progress observation for a running download
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressSample {
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// Total size, None for live-size chunked transfers
    pub total_bytes: Option<u64>,
    /// Current transfer speed
    pub speed_bytes_per_sec: Option<f64>,
    /// Estimated seconds remaining
    pub eta_seconds: Option<u64>,
}

/// Why a job ended without success
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// User-initiated abort; takes priority over any underlying error
    Cancelled,
    /// Fetch failed for a non-connectivity reason (bad URL, unsupported site)
    InvalidSource,
    /// Download failed for a non-connectivity, non-cancel reason
    DownloadFailed,
    /// Connectivity never came back within the configured retry cap
    NoConnectivity,
}

/// Message describing job progress or outcome
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Fetch produced the format list; last event of a successful fetch
    FormatsReady {
        /// Options, auto first, then descending height
        formats: Vec<FormatOption>,
    },

    /// Fetch produced the source metadata
    MetadataReady {
        /// Metadata of the source
        metadata: VideoMetadata,
    },

    /// Download progress tick
    Progress {
        /// Latest sample
        sample: ProgressSample,
    },

    /// Informational line for the activity log
    LogLine {
        /// Log text
        message: String,
    },

    /// Download finished and the file is in place
    Completed {
        /// Final path of the written file
        path: PathBuf,
    },

    /// Job ended without success
    Failed {
        /// Failure classification
        kind: FailureKind,
        /// Underlying detail text
        detail: String,
    },

    /// The job stopped because the network is unreachable; a retry is scheduled
    ConnectivityLost,

    /// The network is back; first event of the resumed job
    ConnectivityRestored,
}

impl Event {
    /// Whether this event ends the stream of a job of the given kind
    pub fn is_terminal_for(&self, kind: JobKind) -> bool {
        match self {
            Event::Completed { .. } | Event::Failed { .. } | Event::ConnectivityLost => true,
            Event::FormatsReady { .. } => kind == JobKind::Fetch,
            _ => false,
        }
    }
}

/// An [`Event`] attributed to the job that produced it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    /// Producing job
    pub job_id: JobId,
    /// Kind of the producing job
    pub kind: JobKind,
    /// Payload
    pub event: Event,
}

/// Observable phase of a [`DownloadSession`](crate::session::DownloadSession)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing running, nothing pending
    Idle,
    /// A fetch job is running
    Fetching,
    /// A download job is running
    Downloading,
    /// A download job is running and cancellation has been requested
    Cancelling,
    /// An action is suspended until connectivity returns
    AwaitingConnectivity,
}
