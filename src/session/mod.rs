//! Top-level job state machine split into focused submodules.
//!
//! The `DownloadSession` struct and its methods are organized by concern:
//! - [`intents`] - Consumer intents (fetch, download, cancel)
//! - [`events`] - Draining the event channel and applying events to session state
//!
//! A session owns at most one active fetch job and one active download job.
//! Workers never touch session state: they publish into the [`EventChannel`]
//! and the consumer applies those events when it drains, so every state
//! change happens on the consumer side.

mod events;
mod intents;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use events::Notification;

use crate::channel::EventChannel;
use crate::config::Config;
use crate::config_store::{ConfigStore, JsonConfigStore};
use crate::error::{Error, Result};
use crate::fetcher::{FetchRequest, MediaFetcher, YtDlpFetcher};
use crate::probe::{ConnectivityProbe, HttpProbe};
use crate::progress::ProgressTracker;
use crate::retry::{RetryPolicy, RetryScheduler};
use crate::runner::JobRunner;
use crate::types::{FormatOption, Job, JobId, JobKind, SessionPhase, VideoMetadata};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

/// What a job was started to do, kept so it can be re-run unchanged
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum JobAction {
    /// Extract formats for a URL
    Fetch {
        /// Source URL
        url: String,
    },
    /// Download with a fully resolved request
    Download {
        /// Arguments handed to the fetcher
        request: FetchRequest,
    },
}

impl JobAction {
    pub(crate) fn url(&self) -> &str {
        match self {
            JobAction::Fetch { url } => url,
            JobAction::Download { request } => &request.url,
        }
    }
}

/// A running job and the action it performs
#[derive(Debug)]
pub(crate) struct ActiveJob {
    pub(crate) job: Job,
    pub(crate) action: JobAction,
}

/// An action suspended until connectivity returns
///
/// The job id is allocated when the retry is scheduled; the retry loop
/// publishes `ConnectivityRestored` under it and the resumed job reuses it.
#[derive(Debug)]
pub(crate) struct PendingResume {
    pub(crate) job_id: JobId,
    pub(crate) action: JobAction,
}

/// Main session instance
///
/// Owned by a single consumer. Intents start jobs on the tokio runtime the
/// session was created on; [`drain_events`](Self::drain_events) applies
/// whatever the jobs published since the last drain.
pub struct DownloadSession {
    pub(crate) config: Config,
    pub(crate) channel: EventChannel,
    pub(crate) runner: JobRunner,
    pub(crate) probe: Arc<dyn ConnectivityProbe>,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) retries: RetryScheduler<JobKind>,
    pub(crate) runtime: Handle,
    pub(crate) active: HashMap<JobKind, ActiveJob>,
    pub(crate) pending: HashMap<JobKind, PendingResume>,
    pub(crate) formats: Vec<FormatOption>,
    pub(crate) metadata: Option<VideoMetadata>,
    pub(crate) progress: ProgressTracker,
    pub(crate) notifications: Vec<Notification>,
    /// URLs whose invalid-source notice was already shown since the last intent
    pub(crate) reported_invalid: HashSet<String>,
    pub(crate) next_job_id: u64,
}

impl DownloadSession {
    /// Create a session backed by `yt-dlp`, an HTTP probe and a JSON folder store
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = YtDlpFetcher::from_config(&config.ytdlp)?;
        let probe = HttpProbe::from_config(&config.connectivity)?;
        let store = JsonConfigStore::new(config.session.store_path.clone());
        Self::with_components(config, Arc::new(fetcher), Arc::new(probe), Arc::new(store))
    }

    /// Create a session from explicit components
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_components(
        config: Config,
        fetcher: Arc<dyn MediaFetcher>,
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn ConfigStore>,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::Config {
            message: format!("a session needs a tokio runtime: {e}"),
            key: None,
        })?;
        Self::with_runtime(config, fetcher, probe, store, runtime)
    }

    /// Create a session that spawns its jobs on `runtime`
    pub fn with_runtime(
        config: Config,
        fetcher: Arc<dyn MediaFetcher>,
        probe: Arc<dyn ConnectivityProbe>,
        store: Arc<dyn ConfigStore>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;

        tracing::info!(
            fetcher = fetcher.name(),
            probe = probe.name(),
            retry_interval_ms = config.connectivity.retry_interval.as_millis(),
            max_retry_attempts = ?config.connectivity.max_retry_attempts,
            "Creating download session"
        );

        let runner = JobRunner::from_config(fetcher, Arc::clone(&probe), &config);
        let retries = RetryScheduler::new(RetryPolicy::from(&config.connectivity), runtime.clone());
        let progress = ProgressTracker::new(config.session.marquee_step);

        Ok(Self {
            config,
            channel: EventChannel::new(),
            runner,
            probe,
            store,
            retries,
            runtime,
            active: HashMap::new(),
            pending: HashMap::new(),
            formats: Vec::new(),
            metadata: None,
            progress,
            notifications: Vec::new(),
            reported_invalid: HashSet::new(),
            next_job_id: 1,
        })
    }

    /// Current phase, derived from active jobs and pending retries
    ///
    /// A running download outranks a suspended action, which outranks a
    /// running fetch.
    pub fn phase(&self) -> SessionPhase {
        if let Some(active) = self.active.get(&JobKind::Download) {
            return if active.job.cancel_requested() {
                SessionPhase::Cancelling
            } else {
                SessionPhase::Downloading
            };
        }
        if !self.pending.is_empty() {
            return SessionPhase::AwaitingConnectivity;
        }
        if self.active.contains_key(&JobKind::Fetch) {
            return SessionPhase::Fetching;
        }
        SessionPhase::Idle
    }

    /// Whether a job of `kind` is running
    pub fn is_active(&self, kind: JobKind) -> bool {
        self.active.contains_key(&kind)
    }

    /// Id of the running job of `kind`
    pub fn active_job(&self, kind: JobKind) -> Option<JobId> {
        self.active.get(&kind).map(|active| active.job.id)
    }

    /// Whether an action of `kind` is suspended waiting for connectivity
    pub fn is_awaiting_connectivity(&self, kind: JobKind) -> bool {
        self.pending.contains_key(&kind)
    }

    /// Options from the last successful fetch
    pub fn formats(&self) -> &[FormatOption] {
        &self.formats
    }

    /// Metadata from the last successful fetch
    pub fn metadata(&self) -> Option<&VideoMetadata> {
        self.metadata.as_ref()
    }

    /// Progress state of the current (or last) download
    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Folder to offer for the next download: the saved one, else the configured default
    pub fn default_output_dir(&self) -> PathBuf {
        self.store
            .load_last_folder()
            .unwrap_or_else(|| self.config.session.default_output_dir.clone())
    }

    /// Cancel every running job and abandon every action waiting for connectivity
    ///
    /// Running downloads still publish their `Failed(Cancelled)` terminal
    /// event, so draining afterwards reports them as usual.
    pub fn shutdown(&mut self) {
        tracing::info!(
            active = self.active.len(),
            awaiting_connectivity = self.pending.len(),
            "Shutting down session"
        );
        for active in self.active.values() {
            active.job.cancel.cancel();
        }
        self.retries.cancel_all();
        self.pending.clear();
    }

    /// Whether a resolution from the format list can be trusted
    pub(crate) fn formats_ready(&self) -> bool {
        !self.formats.is_empty() && !self.active.contains_key(&JobKind::Fetch)
    }

    pub(crate) fn allocate_job_id(&mut self) -> JobId {
        let id = JobId(self.next_job_id);
        self.next_job_id += 1;
        id
    }

    /// Start a job running `action` under `job_id`
    pub(crate) fn start_job(&mut self, job_id: JobId, action: JobAction) -> JobId {
        let kind = match action {
            JobAction::Fetch { .. } => JobKind::Fetch,
            JobAction::Download { .. } => JobKind::Download,
        };
        let job = Job::new(job_id, kind);
        let publisher = self.channel.publisher().for_job(job_id, kind);
        let runner = self.runner.clone();
        let worker_job = job.clone();

        match &action {
            JobAction::Fetch { url } => {
                let url = url.clone();
                self.runtime
                    .spawn(async move { runner.run_fetch(worker_job, url, publisher).await });
            }
            JobAction::Download { request } => {
                self.progress.reset();
                let request = request.clone();
                self.runtime.spawn(async move {
                    runner
                        .run_download(worker_job, request, publisher)
                        .await
                });
            }
        }

        tracing::info!(job_id = %job_id, kind = %kind, url = action.url(), "Job started");
        self.active.insert(kind, ActiveJob { job, action });
        job_id
    }
}

impl Drop for DownloadSession {
    fn drop(&mut self) {
        for active in self.active.values() {
            active.job.cancel.cancel();
        }
        self.retries.cancel_all();
    }
}
