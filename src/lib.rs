//! # media-dl
//!
//! Background job orchestration for fetching media formats and downloading
//! streams.
//!
//! ## Design Philosophy
//!
//! media-dl is designed to be:
//! - **Consumer-driven** - The owner of a [`DownloadSession`] drains events on its own schedule and never blocks
//! - **Resilient** - Jobs that lose connectivity are parked and restarted with identical arguments
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Pluggable** - The fetcher, connectivity probe and folder store are traits
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, DownloadSession, DownloadRequest, FormatMode, ResolutionChoice};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = DownloadSession::new(Config::default())?;
//!
//!     session.request_fetch("https://www.youtube.com/watch?v=dQw4w9WgXcQ")?;
//!     session.run_until_idle(|event| println!("Event: {:?}", event.event)).await;
//!
//!     let label = session.formats().get(1).map(|o| o.label.clone()).unwrap_or_default();
//!     session.request_download(DownloadRequest {
//!         url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
//!         mode: FormatMode::Video,
//!         resolution: ResolutionChoice::from_label(label),
//!         output_dir: session.default_output_dir(),
//!     })?;
//!     session.run_until_idle(|_| {}).await;
//!
//!     for notification in session.take_notifications() {
//!         println!("{notification:?}");
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Ordered producer/consumer event queue
pub mod channel;
/// Configuration types
pub mod config;
/// Last-folder persistence
pub mod config_store;
/// Error types
pub mod error;
/// Media fetcher trait and the yt-dlp implementation
pub mod fetcher;
/// Format option list and stream selection
pub mod formats;
/// Network reachability checks
pub mod probe;
/// Progress rendering state
pub mod progress;
/// Connectivity classification and the fixed-interval retry loop
pub mod retry;
/// Single-job execution on the blocking pool
pub mod runner;
/// Top-level job state machine
pub mod session;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, ConnectivityConfig, SessionConfig, YtDlpConfig};
pub use config_store::{ConfigStore, JsonConfigStore, NoOpConfigStore};
pub use error::{Error, FetchError, Result};
pub use fetcher::{MediaFetcher, YtDlpFetcher};
pub use probe::{ConnectivityProbe, HttpProbe};
pub use session::{DownloadSession, Notification};
pub use types::{
    DownloadRequest, Event, FailureKind, FormatMode, FormatOption, JobEvent, JobId, JobKind,
    ProgressSample, ResolutionChoice, SessionPhase, VideoMetadata,
};

/// Helper function to drive a session with graceful signal handling.
///
/// Drains until the session is idle. If a termination signal arrives first,
/// the session's `shutdown()` method is called instead.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, DownloadSession, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut session = DownloadSession::new(Config::default())?;
///     session.request_fetch("https://www.youtube.com/watch?v=dQw4w9WgXcQ")?;
///
///     run_with_shutdown(&mut session, |event| println!("{:?}", event.event)).await;
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown<F>(session: &mut DownloadSession, mut handler: F)
where
    F: FnMut(&JobEvent),
{
    tokio::select! {
        _ = session.run_until_idle(&mut handler) => {}
        _ = wait_for_signal() => {
            session.shutdown();
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests)
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (sigterm, sigint) => {
            if let Err(e) = &sigterm {
                tracing::warn!(error = %e, "Could not register SIGTERM handler");
            }
            if let Err(e) = &sigint {
                tracing::warn!(error = %e, "Could not register SIGINT handler");
            }
            match (sigterm, sigint) {
                (Ok(mut only), Err(_)) | (Err(_), Ok(mut only)) => {
                    only.recv().await;
                    tracing::info!("Received termination signal");
                }
                _ => {
                    tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
