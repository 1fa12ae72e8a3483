//! Draining the event channel and applying events to session state

use super::{ActiveJob, DownloadSession, PendingResume};
use crate::types::{Event, FailureKind, JobEvent, JobKind, SessionPhase};
use serde::Serialize;
use std::path::PathBuf;
use tokio::time::MissedTickBehavior;

/// Something the user should be told about, derived from terminal events
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// A download finished
    Saved {
        /// Final file location
        path: PathBuf,
    },
    /// A download was cancelled by the user
    Cancelled,
    /// A fetch failed because the URL is not usable; shown once per URL
    InvalidSource {
        /// The offending URL
        url: String,
    },
    /// A download failed for a reason other than cancel or connectivity
    DownloadFailed {
        /// Underlying error text
        detail: String,
    },
    /// An action was suspended until the network returns
    ConnectivityLost {
        /// Kind of the suspended action
        kind: JobKind,
    },
    /// The network returned and the suspended action was restarted
    ConnectivityRestored {
        /// Kind of the resumed action
        kind: JobKind,
    },
    /// The network did not return before the retry cap
    NoConnectivity {
        /// Kind of the abandoned action
        kind: JobKind,
    },
}

impl DownloadSession {
    /// Take every event published since the last drain and apply it
    ///
    /// Never waits. Events of stale jobs are returned as well but leave
    /// session state untouched.
    pub fn drain_events(&mut self) -> Vec<JobEvent> {
        let events = self.channel.drain_all();
        for event in &events {
            self.apply_event(event);
        }
        events
    }

    /// Notifications collected since the last call
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Drain on a fixed cadence until nothing is running or pending
    ///
    /// Each drained event is passed to `handler` in publish order. The first
    /// drain happens immediately.
    pub async fn run_until_idle<F>(&mut self, mut handler: F)
    where
        F: FnMut(&JobEvent),
    {
        let mut ticker = tokio::time::interval(self.config.session.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for event in self.drain_events() {
                handler(&event);
            }
            if self.phase() == SessionPhase::Idle {
                return;
            }
        }
    }

    fn apply_event(&mut self, event: &JobEvent) {
        let kind = event.kind;

        // Retry loops publish under the id reserved for the resumed job
        if self.is_pending_resume(event) {
            match &event.event {
                Event::ConnectivityRestored => {
                    self.resume(kind);
                    return;
                }
                Event::Failed {
                    kind: FailureKind::NoConnectivity,
                    detail,
                } => {
                    self.pending.remove(&kind);
                    self.retries.clear(kind);
                    tracing::error!(
                        job_id = %event.job_id,
                        kind = %kind,
                        detail = %detail,
                        "Giving up on connectivity"
                    );
                    if kind == JobKind::Download {
                        self.progress.set_status("No internet connection");
                    }
                    self.notifications.push(Notification::NoConnectivity { kind });
                    return;
                }
                _ => {}
            }
        }

        if self.active_job(kind) != Some(event.job_id) {
            tracing::debug!(job_id = %event.job_id, kind = %kind, "Ignoring event from stale job");
            return;
        }

        match &event.event {
            Event::MetadataReady { metadata } => {
                self.metadata = Some(metadata.clone());
            }
            Event::Progress { sample } => {
                if kind == JobKind::Download {
                    self.progress.record(sample);
                }
            }
            Event::LogLine { message } => {
                tracing::debug!(job_id = %event.job_id, message = %message, "Job log");
            }
            Event::FormatsReady { formats } => {
                self.formats = formats.clone();
                self.finish(kind);
            }
            Event::Completed { path } => {
                self.finish(kind);
                self.progress.complete();
                self.notifications.push(Notification::Saved { path: path.clone() });
            }
            Event::Failed { kind: failure, detail } => {
                if let Some(finished) = self.finish(kind) {
                    self.report_failure(&finished, *failure, detail);
                }
            }
            Event::ConnectivityLost => {
                if let Some(finished) = self.finish(kind) {
                    self.suspend(finished);
                }
            }
            Event::ConnectivityRestored => {
                tracing::debug!(job_id = %event.job_id, "Restore for a job that is not waiting");
            }
        }
    }

    fn is_pending_resume(&self, event: &JobEvent) -> bool {
        self.pending
            .get(&event.kind)
            .is_some_and(|pending| pending.job_id == event.job_id)
    }

    /// Drop the job reference for `kind` after its terminal event
    fn finish(&mut self, kind: JobKind) -> Option<ActiveJob> {
        let finished = self.active.remove(&kind)?;
        tracing::debug!(
            job_id = %finished.job.id,
            kind = %kind,
            elapsed_ms = (chrono::Utc::now() - finished.job.started_at).num_milliseconds(),
            "Job finished"
        );
        Some(finished)
    }

    fn report_failure(&mut self, finished: &ActiveJob, failure: FailureKind, detail: &str) {
        match failure {
            FailureKind::Cancelled => {
                self.progress.set_status("Download cancelled");
                self.notifications.push(Notification::Cancelled);
            }
            FailureKind::InvalidSource => {
                let url = finished.action.url().to_string();
                if self.reported_invalid.insert(url.clone()) {
                    self.notifications.push(Notification::InvalidSource { url });
                } else {
                    tracing::debug!(url = %url, "Invalid source already reported");
                }
            }
            FailureKind::DownloadFailed => {
                self.progress.set_status(format!("Download failed: {detail}"));
                self.notifications.push(Notification::DownloadFailed {
                    detail: detail.to_string(),
                });
            }
            FailureKind::NoConnectivity => {
                self.notifications.push(Notification::NoConnectivity {
                    kind: finished.job.kind,
                });
            }
        }
    }

    /// Park `finished` until the probe reports online again
    fn suspend(&mut self, finished: ActiveJob) {
        let kind = finished.job.kind;

        // A cancel that raced the connectivity loss wins
        if finished.job.cancel_requested() {
            self.report_failure(&finished, FailureKind::Cancelled, "cancelled while offline");
            return;
        }

        let job_id = self.allocate_job_id();
        let restored = self.channel.publisher().for_job(job_id, kind);
        let exhausted = restored.clone();

        self.retries.schedule_retry(
            kind,
            self.probe.clone(),
            move || restored.publish(Event::ConnectivityRestored),
            move |offline_checks| {
                exhausted.publish(Event::Failed {
                    kind: FailureKind::NoConnectivity,
                    detail: format!("still offline after {offline_checks} checks"),
                })
            },
        );

        tracing::warn!(
            job_id = %finished.job.id,
            resume_job_id = %job_id,
            kind = %kind,
            url = finished.action.url(),
            "Waiting for connectivity"
        );
        if kind == JobKind::Download {
            self.progress.set_status("Waiting for internet connection...");
        }
        self.pending.insert(
            kind,
            PendingResume {
                job_id,
                action: finished.action,
            },
        );
        self.notifications.push(Notification::ConnectivityLost { kind });
    }

    /// Restart the action suspended for `kind` with identical arguments
    fn resume(&mut self, kind: JobKind) {
        let Some(pending) = self.pending.remove(&kind) else {
            return;
        };
        self.retries.clear(kind);

        tracing::info!(job_id = %pending.job_id, kind = %kind, "Connectivity restored, resuming");
        self.notifications.push(Notification::ConnectivityRestored { kind });
        self.start_job(pending.job_id, pending.action);
    }
}
