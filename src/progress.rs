//! Consumer-side progress rendering state
//!
//! A [`ProgressTracker`] turns the stream of [`ProgressSample`]s of the current
//! download into a bar value and a status line. Samples with a known total give
//! a fraction; samples without one advance a wrapping marquee.

use crate::types::ProgressSample;
use crate::utils::{format_seconds, human_size};
use serde::Serialize;

/// How the progress bar should be drawn
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ProgressDisplay {
    /// Nothing received yet for the current download
    Idle,
    /// Known total: completed fraction in [0, 1]
    Determinate {
        /// downloaded / total, clamped
        fraction: f64,
    },
    /// Unknown total: marquee position in [0, 1)
    Indeterminate {
        /// Current marquee position
        position: f64,
    },
}

impl ProgressDisplay {
    /// Value to draw on a bar, whatever the mode
    pub fn bar_value(&self) -> f64 {
        match self {
            ProgressDisplay::Idle => 0.0,
            ProgressDisplay::Determinate { fraction } => *fraction,
            ProgressDisplay::Indeterminate { position } => *position,
        }
    }
}

/// Rendering state for one download at a time
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    marquee_step: f64,
    marquee_position: f64,
    display: ProgressDisplay,
    status: String,
    last_sample: Option<ProgressSample>,
}

impl ProgressTracker {
    /// Create a tracker whose marquee advances by `marquee_step` per unknown-size tick
    pub fn new(marquee_step: f64) -> Self {
        Self {
            marquee_step,
            marquee_position: 0.0,
            display: ProgressDisplay::Idle,
            status: String::new(),
            last_sample: None,
        }
    }

    /// Forget everything about the previous download
    pub fn reset(&mut self) {
        self.marquee_position = 0.0;
        self.display = ProgressDisplay::Idle;
        self.status = "Starting download...".to_string();
        self.last_sample = None;
    }

    /// Apply one sample and return the new display
    pub fn record(&mut self, sample: &ProgressSample) -> ProgressDisplay {
        self.display = match sample.total_bytes.filter(|total| *total > 0) {
            Some(total) => ProgressDisplay::Determinate {
                fraction: (sample.downloaded_bytes as f64 / total as f64).clamp(0.0, 1.0),
            },
            None => {
                self.marquee_position = (self.marquee_position + self.marquee_step) % 1.0;
                ProgressDisplay::Indeterminate {
                    position: self.marquee_position,
                }
            }
        };
        self.status = status_text(&self.display, sample);
        self.last_sample = Some(sample.clone());
        self.display
    }

    /// Mark the download as finished
    pub fn complete(&mut self) {
        self.display = ProgressDisplay::Determinate { fraction: 1.0 };
        self.status = "Download completed".to_string();
    }

    /// Replace the status line, keeping the bar as it is
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
    }

    /// Current display
    pub fn display(&self) -> ProgressDisplay {
        self.display
    }

    /// Current status line
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Most recent sample, if any
    pub fn last_sample(&self) -> Option<&ProgressSample> {
        self.last_sample.as_ref()
    }
}

/// Build the status line for a sample; speed and ETA are left out when absent
pub fn status_text(display: &ProgressDisplay, sample: &ProgressSample) -> String {
    let speed = sample
        .speed_bytes_per_sec
        .filter(|speed| *speed > 0.0)
        .map(|speed| format!("{}/s", human_size(speed)));

    match display {
        ProgressDisplay::Determinate { fraction } => {
            let mut status = format!("Downloading... {:5.1}%", fraction * 100.0);
            if let Some(speed) = speed {
                status.push_str(&format!(" | Speed: {speed}"));
            }
            if let Some(eta) = sample.eta_seconds {
                status.push_str(&format!(" | Time: {}", format_seconds(eta)));
            }
            status
        }
        _ => {
            let mut status = format!(
                "Downloading {}",
                human_size(sample.downloaded_bytes as f64)
            );
            if let Some(speed) = speed {
                status.push_str(&format!(" | {speed}"));
            }
            status
        }
    }
}
