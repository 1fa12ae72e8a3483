//! Configuration types for media-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Consumer-side behavior of a session
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Period of the non-blocking event drain (default: 150ms)
    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub poll_interval: Duration,

    /// Marquee advance per progress tick when the total size is unknown (default: 0.03)
    #[serde(default = "default_marquee_step")]
    pub marquee_step: f64,

    /// Output directory used when nothing was saved before (default: "./downloads")
    #[serde(default = "default_output_dir")]
    pub default_output_dir: PathBuf,

    /// Location of the JSON file remembering the last used folder (default: "config.json")
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            marquee_step: default_marquee_step(),
            default_output_dir: default_output_dir(),
            store_path: default_store_path(),
        }
    }
}

/// Connectivity probing and the suspend/resume loop
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    /// Well-known endpoint used to decide whether the network is reachable
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    /// Upper bound for a single probe (default: 3 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_serde")]
    pub probe_timeout: Duration,

    /// Fixed delay between offline re-checks (default: 5 seconds, no backoff)
    #[serde(default = "default_retry_interval", with = "duration_serde")]
    pub retry_interval: Duration,

    /// Maximum number of offline re-checks before giving up (None = retry forever)
    #[serde(default)]
    pub max_retry_attempts: Option<u32>,

    /// Probe inside the worker before calling the fetcher (default: true)
    #[serde(default = "default_true")]
    pub preflight_check: bool,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_url: default_probe_url(),
            probe_timeout: default_probe_timeout(),
            retry_interval: default_retry_interval(),
            max_retry_attempts: None,
            preflight_check: true,
        }
    }
}

/// Settings for the `yt-dlp` backed fetcher
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct YtDlpConfig {
    /// Path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Path to the ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for binaries if explicit paths are not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Output file name template relative to the output directory
    #[serde(default = "default_output_template")]
    pub output_template: String,

    /// Container used when merging separate video and audio streams (default: "mp4")
    #[serde(default = "default_merge_format")]
    pub merge_output_format: String,

    /// Codec of the audio-only transcode (default: "mp3")
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Quality passed to the audio transcode, in kbps (default: "192")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// Fetcher-internal HTTP retries (default: 5)
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Fetcher-internal fragment retries (default: 10)
    #[serde(default = "default_fragment_retries")]
    pub fragment_retries: u32,

    /// Minimum sleep between requests in seconds (default: 1)
    #[serde(default = "default_sleep_interval")]
    pub sleep_interval: u32,

    /// Maximum sleep between requests in seconds (default: 5)
    #[serde(default = "default_max_sleep_interval")]
    pub max_sleep_interval: u32,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            ffmpeg_path: None,
            search_path: true,
            output_template: default_output_template(),
            merge_output_format: default_merge_format(),
            audio_codec: default_audio_codec(),
            audio_quality: default_audio_quality(),
            retries: default_retries(),
            fragment_retries: default_fragment_retries(),
            sleep_interval: default_sleep_interval(),
            max_sleep_interval: default_max_sleep_interval(),
        }
    }
}

/// Main configuration for a [`DownloadSession`](crate::session::DownloadSession)
///
/// Fields are organized into logical sub-configs:
/// - [`session`](SessionConfig): drain cadence, progress rendering, folders
/// - [`connectivity`](ConnectivityConfig): probe endpoint, retry loop
/// - [`ytdlp`](YtDlpConfig): external tool settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Consumer-side settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Connectivity probe and retry settings
    #[serde(default)]
    pub connectivity: ConnectivityConfig,

    /// yt-dlp settings
    #[serde(default)]
    pub ytdlp: YtDlpConfig,
}

impl Config {
    /// Check that the configuration can drive a session
    pub fn validate(&self) -> Result<()> {
        if self.session.poll_interval.is_zero() {
            return Err(config_error(
                "poll interval must be greater than zero",
                "session.poll_interval",
            ));
        }
        if !(self.session.marquee_step > 0.0 && self.session.marquee_step < 1.0) {
            return Err(config_error(
                "marquee step must be between 0 and 1 (exclusive)",
                "session.marquee_step",
            ));
        }
        if self.connectivity.probe_timeout.is_zero() {
            return Err(config_error(
                "probe timeout must be greater than zero",
                "connectivity.probe_timeout",
            ));
        }
        if self.connectivity.retry_interval.is_zero() {
            return Err(config_error(
                "retry interval must be greater than zero",
                "connectivity.retry_interval",
            ));
        }
        if let Err(e) = url::Url::parse(&self.connectivity.probe_url) {
            return Err(config_error(
                &format!("probe url is not a valid URL: {e}"),
                "connectivity.probe_url",
            ));
        }
        if self.ytdlp.output_template.trim().is_empty() {
            return Err(config_error(
                "output template must not be empty",
                "ytdlp.output_template",
            ));
        }
        if self.ytdlp.sleep_interval > self.ytdlp.max_sleep_interval {
            return Err(config_error(
                "sleep interval must not exceed max sleep interval",
                "ytdlp.sleep_interval",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str, key: &str) -> Error {
    Error::Config {
        message: message.to_string(),
        key: Some(key.to_string()),
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(150)
}

fn default_marquee_step() -> f64 {
    0.03
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_store_path() -> PathBuf {
    PathBuf::from("config.json")
}

fn default_probe_url() -> String {
    "http://www.google.com".to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_retry_interval() -> Duration {
    Duration::from_millis(5000)
}

fn default_true() -> bool {
    true
}

fn default_output_template() -> String {
    "%(title)s.%(ext)s".to_string()
}

fn default_merge_format() -> String {
    "mp4".to_string()
}

fn default_audio_codec() -> String {
    "mp3".to_string()
}

fn default_audio_quality() -> String {
    "192".to_string()
}

fn default_retries() -> u32 {
    5
}

fn default_fragment_retries() -> u32 {
    10
}

fn default_sleep_interval() -> u32 {
    1
}

fn default_max_sleep_interval() -> u32 {
    5
}

// Duration serialization helper (milliseconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
