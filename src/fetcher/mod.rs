//! Media extraction backends
//!
//! The session never talks to a downloader directly. It goes through the
//! [`MediaFetcher`] trait, a blocking capability with two operations:
//!
//! - [`probe_formats`](MediaFetcher::probe_formats): metadata plus raw format
//!   descriptors, no download
//! - [`fetch`](MediaFetcher::fetch): download with a synchronous progress
//!   callback that can ask for an abort
//!
//! [`YtDlpFetcher`] implements it on top of the external `yt-dlp` binary.
//! Tests and embedders can provide their own implementation.
//!
//! ## Usage
//!
//! ```no_run
//! use media_dl::fetcher::{MediaFetcher, YtDlpFetcher};
//!
//! let fetcher = YtDlpFetcher::from_path().expect("yt-dlp binary not found");
//! let probe = fetcher.probe_formats("https://example.com/watch?v=1")?;
//! for format in &probe.formats {
//!     println!("{} {:?}p", format.format_id, format.height);
//! }
//! # Ok::<(), media_dl::FetchError>(())
//! ```

mod parser;
mod traits;
mod ytdlp;

pub use traits::{
    FetchProgress, FetchRequest, FetchResult, FormatSelector, MediaFetcher, PostProcessing,
    ProbeResult, RawFormat,
};
pub use ytdlp::YtDlpFetcher;
