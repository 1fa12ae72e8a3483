//! Connectivity-loss classification and the suspend/resume retry loop
//!
//! Two concerns live here:
//! - deciding whether a fetcher failure looks like a network outage
//!   ([`ConnectivityFailure`]) rather than a permanent failure
//! - re-probing the network on a fixed interval until it comes back
//!   ([`RetryScheduler`]), then resuming the suspended action exactly once
//!
//! There is deliberately no exponential backoff: the interval is fixed
//! (5 seconds by default) and, unless a cap is configured, the loop runs until
//! the network returns or the retry is cancelled.
//!
//! # Example
//!
//! ```no_run
//! use media_dl::retry::{RetryPolicy, RetryScheduler};
//! use media_dl::probe::{ConnectivityProbe, HttpProbe};
//! use media_dl::types::JobKind;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let probe: Arc<dyn ConnectivityProbe> =
//!     Arc::new(HttpProbe::new("http://www.google.com", Duration::from_secs(3))?);
//! let mut scheduler = RetryScheduler::new(
//!     RetryPolicy::default(),
//!     tokio::runtime::Handle::current(),
//! );
//! scheduler.schedule_retry(
//!     JobKind::Download,
//!     probe,
//!     || println!("back online"),
//!     |attempts| println!("gave up after {attempts} checks"),
//! );
//! # Ok(())
//! # }
//! ```

use crate::config::ConnectivityConfig;
use crate::error::FetchError;
use crate::probe::ConnectivityProbe;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lower-cased fragments that mark an error text as a transport failure
const CONNECTIVITY_SIGNATURES: &[&str] = &[
    "timed out",
    "timeout",
    "connection",
    "network",
    "ssl",
    "handshake",
    "decryption",
    "http error",
    "transport",
    "name resolution",
    "getaddrinfo",
    "unreachable",
];

/// Returns true if `text` contains a known connectivity signature
///
/// Matching is case-insensitive. A bare "http" is not a signature, since
/// most error texts for bad sources quote the offending `https://` URL.
pub fn has_connectivity_signature(text: &str) -> bool {
    let lower = text.to_lowercase();
    CONNECTIVITY_SIGNATURES
        .iter()
        .any(|signature| lower.contains(signature))
}

/// Trait for errors that can indicate lost connectivity
///
/// Transport failures (timeouts, resets, DNS, TLS) should return `true`.
/// Content failures (unsupported site, private video, disk errors) return `false`.
pub trait ConnectivityFailure {
    /// Returns true if the error looks like the network went away
    fn is_connectivity_failure(&self) -> bool;
}

impl ConnectivityFailure for FetchError {
    fn is_connectivity_failure(&self) -> bool {
        match self {
            // The fetcher already classified it as transport-level
            FetchError::Network(_) => true,
            // Socket-level I/O errors are transient
            FetchError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
            ),
            // Tool output needs to be classified based on content
            FetchError::ToolFailed { stderr, .. } => has_connectivity_signature(stderr),
            FetchError::Extraction(msg) => has_connectivity_signature(msg),
            // Aborts come from the caller, never from the network
            FetchError::Aborted => false,
            // A missing binary needs user action
            FetchError::ToolMissing { .. } => false,
            // Garbled output is a tool problem
            FetchError::Json(_) => false,
        }
    }
}

/// How the retry loop paces and bounds itself
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed delay between offline re-checks
    pub interval: Duration,
    /// Offline re-checks tolerated after the first probe (None = unlimited)
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5000),
            max_attempts: None,
        }
    }
}

impl From<&ConnectivityConfig> for RetryPolicy {
    fn from(config: &ConnectivityConfig) -> Self {
        Self {
            interval: config.retry_interval,
            max_attempts: config.max_retry_attempts,
        }
    }
}

/// How a retry loop ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The probe reported online after `offline_checks` failed checks
    Restored {
        /// Number of probes that reported offline before the network returned
        offline_checks: u32,
    },
    /// The cap was reached without the network returning
    Exhausted {
        /// Number of probes that reported offline
        offline_checks: u32,
    },
    /// The retry was cancelled or replaced
    Cancelled,
}

/// Probe until the network is back, the cap is hit, or `cancel` fires
///
/// The first probe runs immediately; every offline result is followed by a
/// sleep of `policy.interval`.
pub async fn wait_for_connectivity(
    probe: &dyn ConnectivityProbe,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
) -> RetryOutcome {
    let mut offline_checks: u32 = 0;

    loop {
        let online = tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            online = probe.is_online() => online,
        };

        if online {
            if offline_checks > 0 {
                tracing::info!(offline_checks, "Connectivity restored");
            }
            return RetryOutcome::Restored { offline_checks };
        }

        offline_checks += 1;

        if let Some(max) = policy.max_attempts
            && offline_checks > max
        {
            tracing::error!(
                offline_checks,
                max_attempts = max,
                "Connectivity did not return before the retry cap"
            );
            return RetryOutcome::Exhausted { offline_checks };
        }

        tracing::warn!(
            offline_checks,
            probe = probe.name(),
            delay_ms = policy.interval.as_millis(),
            "Still offline, re-checking later"
        );

        tokio::select! {
            _ = cancel.cancelled() => return RetryOutcome::Cancelled,
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }
}

struct PendingRetry {
    cancel: CancellationToken,
    task: JoinHandle<RetryOutcome>,
}

/// Runs at most one retry loop per key
///
/// Scheduling a retry for a key that already has one pending replaces it: the
/// old loop is cancelled and will never invoke its callback.
pub struct RetryScheduler<K = crate::types::JobKind>
where
    K: Eq + Hash + Copy + std::fmt::Debug,
{
    policy: RetryPolicy,
    runtime: Handle,
    pending: HashMap<K, PendingRetry>,
}

impl<K> RetryScheduler<K>
where
    K: Eq + Hash + Copy + std::fmt::Debug,
{
    /// Create a scheduler that spawns its loops on `runtime`
    pub fn new(policy: RetryPolicy, runtime: Handle) -> Self {
        Self {
            policy,
            runtime,
            pending: HashMap::new(),
        }
    }

    /// Policy used for new retries
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Start re-probing for `key`, replacing any retry already pending for it
    ///
    /// `on_restored` runs exactly once when the probe first reports online,
    /// unless the retry was cancelled first. `on_exhausted` runs instead when
    /// the policy's cap is reached.
    pub fn schedule_retry<R, X>(
        &mut self,
        key: K,
        probe: Arc<dyn ConnectivityProbe>,
        on_restored: R,
        on_exhausted: X,
    ) where
        R: FnOnce() + Send + 'static,
        X: FnOnce(u32) + Send + 'static,
    {
        if self.cancel(key) {
            tracing::debug!(?key, "Replacing pending retry");
        }

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let policy = self.policy.clone();

        let task = self.runtime.spawn(async move {
            let outcome = wait_for_connectivity(probe.as_ref(), &policy, &task_cancel).await;
            match outcome {
                // Re-check right before firing: a cancel may have raced the probe
                RetryOutcome::Restored { .. } if !task_cancel.is_cancelled() => on_restored(),
                RetryOutcome::Exhausted { offline_checks } if !task_cancel.is_cancelled() => {
                    on_exhausted(offline_checks)
                }
                _ => {}
            }
            outcome
        });

        self.pending.insert(key, PendingRetry { cancel, task });
    }

    /// Stop the retry pending for `key`; returns true if one was running
    pub fn cancel(&mut self, key: K) -> bool {
        match self.pending.remove(&key) {
            Some(retry) => {
                let was_running = !retry.task.is_finished();
                retry.cancel.cancel();
                was_running
            }
            None => false,
        }
    }

    /// Forget a retry whose loop has already finished
    pub fn clear(&mut self, key: K) {
        self.pending.remove(&key);
    }

    /// Whether a retry loop for `key` is still probing
    pub fn is_pending(&self, key: K) -> bool {
        self.pending
            .get(&key)
            .is_some_and(|retry| !retry.cancel.is_cancelled() && !retry.task.is_finished())
    }

    /// Stop every pending retry
    pub fn cancel_all(&mut self) {
        for (_, retry) in self.pending.drain() {
            retry.cancel.cancel();
        }
    }
}

impl<K> Drop for RetryScheduler<K>
where
    K: Eq + Hash + Copy + std::fmt::Debug,
{
    fn drop(&mut self) {
        self.cancel_all();
    }
}
