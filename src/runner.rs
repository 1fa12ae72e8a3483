//! Execution of one fetch or download job on a worker
//!
//! The runner owns no session state. It calls the blocking [`MediaFetcher`] on
//! tokio's blocking pool, turns its progress callbacks into [`Event`]s on the
//! job's stream and publishes exactly one terminal event per run:
//!
//! | Job      | Success        | Cancelled           | Offline              | Other failure                 |
//! |----------|----------------|---------------------|----------------------|-------------------------------|
//! | fetch    | `FormatsReady` | n/a                 | `ConnectivityLost`   | `Failed(InvalidSource)`       |
//! | download | `Completed`    | `Failed(Cancelled)` | `ConnectivityLost`   | `Failed(DownloadFailed)`      |

use crate::channel::JobPublisher;
use crate::config::Config;
use crate::error::FetchError;
use crate::fetcher::{FetchProgress, FetchRequest, MediaFetcher};
use crate::formats::{build_options, summary_line};
use crate::probe::ConnectivityProbe;
use crate::retry::ConnectivityFailure;
use crate::types::{Event, FailureKind, Job, JobKind};
use std::ops::ControlFlow;
use std::sync::Arc;

/// Runs jobs against a fetcher, consulting a probe to classify failures
#[derive(Clone)]
pub struct JobRunner {
    fetcher: Arc<dyn MediaFetcher>,
    probe: Arc<dyn ConnectivityProbe>,
    preflight_check: bool,
}

impl JobRunner {
    /// Create a runner
    ///
    /// With `preflight_check` set, every job probes connectivity before the
    /// fetcher is called and reports `ConnectivityLost` straight away when offline.
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        probe: Arc<dyn ConnectivityProbe>,
        preflight_check: bool,
    ) -> Self {
        Self {
            fetcher,
            probe,
            preflight_check,
        }
    }

    /// Create a runner using the connectivity section of `config`
    pub fn from_config(
        fetcher: Arc<dyn MediaFetcher>,
        probe: Arc<dyn ConnectivityProbe>,
        config: &Config,
    ) -> Self {
        Self::new(fetcher, probe, config.connectivity.preflight_check)
    }

    /// Extract metadata and formats for `url`
    ///
    /// Publishes `MetadataReady`, a summary `LogLine`, then `FormatsReady`, which
    /// ends the job. On failure publishes exactly one `ConnectivityLost` or
    /// `Failed(InvalidSource)`.
    pub async fn run_fetch(&self, job: Job, url: String, publisher: JobPublisher) {
        tracing::info!(job_id = %job.id, url = %url, "Fetching formats");

        if !self.preflight(&job, &publisher).await {
            return;
        }

        let fetcher = Arc::clone(&self.fetcher);
        let probe_url = url.clone();
        let result = tokio::task::spawn_blocking(move || fetcher.probe_formats(&probe_url))
            .await
            .unwrap_or_else(|e| Err(worker_stopped(e)));

        match result {
            Ok(probe) => {
                let options = build_options(&probe.formats);
                tracing::info!(
                    job_id = %job.id,
                    title = %probe.metadata.title,
                    options = options.len(),
                    "Formats fetched"
                );
                publisher.publish(Event::MetadataReady {
                    metadata: probe.metadata,
                });
                publisher.log(summary_line(&options));
                publisher.publish(Event::FormatsReady { formats: options });
            }
            Err(e) => {
                let terminal = self.classify_failure(&job, &e).await;
                publisher.publish(terminal);
            }
        }
    }

    /// Download with the given request
    ///
    /// Publishes `Progress` per tick and a `LogLine` when post-processing
    /// starts, then exactly one of `Completed`, `Failed` or `ConnectivityLost`.
    /// A chunk error re-probes connectivity: online it is logged and the
    /// transfer goes on, offline it aborts the transfer. The job's cancel token
    /// is checked at every progress callback and once more after the fetcher
    /// returns.
    pub async fn run_download(&self, job: Job, request: FetchRequest, publisher: JobPublisher) {
        tracing::info!(
            job_id = %job.id,
            url = %request.url,
            format = %request.selector,
            output_dir = %request.output_dir.display(),
            "Starting download"
        );

        if !self.preflight(&job, &publisher).await {
            return;
        }

        if let Err(e) = tokio::fs::create_dir_all(&request.output_dir).await {
            tracing::error!(
                job_id = %job.id,
                output_dir = %request.output_dir.display(),
                error = %e,
                "Failed to create output directory"
            );
            let terminal = if job.cancel_requested() {
                cancelled_event("cancelled before the transfer started")
            } else {
                Event::Failed {
                    kind: FailureKind::DownloadFailed,
                    detail: format!(
                        "cannot create output directory {}: {e}",
                        request.output_dir.display()
                    ),
                }
            };
            publisher.publish(terminal);
            return;
        }

        publisher.log(format!("Starting download: fmt={}", request.selector));

        let fetcher = Arc::clone(&self.fetcher);
        let probe = Arc::clone(&self.probe);
        let runtime = tokio::runtime::Handle::current();
        let cancel = job.cancel.clone();
        let progress_publisher = publisher.clone();
        let (result, went_offline) = tokio::task::spawn_blocking(move || {
            let mut went_offline = false;
            let result = fetcher.fetch(&request, &mut |progress| {
                if cancel.is_cancelled() {
                    return ControlFlow::Break(());
                }
                match progress {
                    FetchProgress::Downloading(sample) => {
                        progress_publisher.publish(Event::Progress { sample })
                    }
                    FetchProgress::Finished => {
                        progress_publisher.log("Finished downloading, post-processing...")
                    }
                    FetchProgress::ChunkError => {
                        if !runtime.block_on(probe.is_online()) {
                            went_offline = true;
                            return ControlFlow::Break(());
                        }
                        progress_publisher.log("Network retrying chunk...");
                    }
                }
                ControlFlow::Continue(())
            });
            (result, went_offline)
        })
        .await
        .unwrap_or_else(|e| (Err(worker_stopped(e)), false));

        let terminal = match result {
            // The return from the fetcher is a checkpoint too
            Ok(_) if job.cancel_requested() => {
                tracing::info!(job_id = %job.id, "Download finished after cancel, discarding");
                cancelled_event("cancelled after the transfer finished")
            }
            Ok(path) => {
                tracing::info!(job_id = %job.id, path = %path.display(), "Download completed");
                Event::Completed { path }
            }
            Err(_) if went_offline && !job.cancel_requested() => {
                tracing::warn!(job_id = %job.id, "Offline after a chunk error, aborting transfer");
                Event::ConnectivityLost
            }
            Err(e) => self.classify_failure(&job, &e).await,
        };
        publisher.publish(terminal);
    }

    /// Returns false after publishing the job's terminal event when it must not start
    ///
    /// A cancel seen by the time the probe answers wins over an offline result.
    async fn preflight(&self, job: &Job, publisher: &JobPublisher) -> bool {
        if !self.preflight_check {
            return true;
        }
        let online = self.probe.is_online().await;
        if job.cancel_requested() {
            tracing::info!(job_id = %job.id, online, "Cancelled before start");
            publisher.publish(cancelled_event("cancelled before the transfer started"));
            return false;
        }
        if online {
            return true;
        }
        tracing::warn!(
            job_id = %job.id,
            kind = %job.kind,
            probe = self.probe.name(),
            "Offline before start"
        );
        publisher.publish(Event::ConnectivityLost);
        false
    }

    /// Map a worker error to the job's terminal event
    ///
    /// A requested cancel wins over any error text. Otherwise a connectivity
    /// signature or an offline re-probe means `ConnectivityLost`.
    async fn classify_failure(&self, job: &Job, error: &FetchError) -> Event {
        if job.cancel_requested() {
            tracing::info!(job_id = %job.id, error = %error, "Job cancelled");
            return cancelled_event(&error.to_string());
        }

        if error.is_connectivity_failure() || !self.probe.is_online().await {
            tracing::warn!(
                job_id = %job.id,
                kind = %job.kind,
                error = %error,
                "Connectivity lost"
            );
            return Event::ConnectivityLost;
        }

        let kind = match job.kind {
            JobKind::Fetch => FailureKind::InvalidSource,
            JobKind::Download => FailureKind::DownloadFailed,
        };
        tracing::error!(job_id = %job.id, kind = ?kind, error = %error, "Job failed");
        Event::Failed {
            kind,
            detail: error.to_string(),
        }
    }
}

fn cancelled_event(detail: &str) -> Event {
    Event::Failed {
        kind: FailureKind::Cancelled,
        detail: detail.to_string(),
    }
}

fn worker_stopped(e: tokio::task::JoinError) -> FetchError {
    FetchError::Extraction(format!("worker stopped unexpectedly: {e}"))
}
