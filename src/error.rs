//! Error types for media-dl
//!
//! Two layers of errors live here:
//! - [`Error`] is returned by the consumer-facing API (intents, config, stores)
//! - [`FetchError`] is raised by a [`MediaFetcher`](crate::fetcher::MediaFetcher)
//!   and never crosses into the consumer thread; job runners convert it into a
//!   terminal [`Event`](crate::types::Event) instead.

use crate::types::JobKind;
use thiserror::Error;

/// Result type alias for media-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for media-dl
#[derive(Debug, Error)]
pub enum Error {
    /// A consumer intent was rejected because its input is unusable
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A job of this kind is already running; the new request was not started
    #[error("a {kind} job is already active")]
    AlreadyActive {
        /// Kind of the job that is already running
        kind: JobKind,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "poll_interval")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error (probe construction)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The media fetcher failed outside of a job (e.g. while probing tools)
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
}

/// Errors raised by a media fetcher while probing or downloading
#[derive(Debug, Error)]
pub enum FetchError {
    /// The transfer was aborted because the progress callback asked to stop
    #[error("transfer aborted by caller")]
    Aborted,

    /// The external extraction tool could not be located
    #[error("external tool is missing: {tool}")]
    ToolMissing {
        /// Name of the binary that was searched for
        tool: String,
    },

    /// The external tool ran but exited unsuccessfully
    #[error("external tool failed: {tool} (code={code:?}) {stderr}")]
    ToolFailed {
        /// Name of the binary
        tool: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Tail of the tool's stderr output
        stderr: String,
    },

    /// The source could not be extracted (unsupported site, private video, bad URL)
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Transport-level failure reported by the fetcher
    #[error("network error: {0}")]
    Network(String),

    /// I/O error while spawning the tool or writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tool's JSON output could not be parsed
    #[error("invalid tool output: {0}")]
    Json(#[from] serde_json::Error),
}
