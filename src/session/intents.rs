//! Consumer intents: start a fetch, start a download, cancel

use super::{DownloadSession, JobAction};
use crate::error::{Error, Result};
use crate::fetcher::FetchRequest;
use crate::formats::{merge_format_for, post_processing_for, select_format};
use crate::types::{DownloadRequest, JobId, JobKind};
use crate::utils::resolve_output_dir;

use super::events::Notification;

impl DownloadSession {
    /// Start extracting metadata and formats for `url`
    ///
    /// Rejected with [`Error::InvalidInput`] for an empty URL and with
    /// [`Error::AlreadyActive`] while another fetch runs. A fetch suspended
    /// waiting for connectivity is replaced by the new one.
    pub fn request_fetch(&mut self, url: &str) -> Result<JobId> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("URL must not be empty".to_string()));
        }
        self.ensure_idle(JobKind::Fetch)?;
        self.user_acted(JobKind::Fetch);

        let job_id = self.allocate_job_id();
        Ok(self.start_job(
            job_id,
            JobAction::Fetch {
                url: url.to_string(),
            },
        ))
    }

    /// Start downloading according to `request`
    ///
    /// The stream selector is decided here, once: a resumed download reuses
    /// the same fetcher request even if the format list changed meanwhile.
    /// The output folder is remembered for the next run.
    pub fn request_download(&mut self, request: DownloadRequest) -> Result<JobId> {
        let url = request.url.trim();
        if url.is_empty() {
            return Err(Error::InvalidInput("please enter a video URL".to_string()));
        }
        self.ensure_idle(JobKind::Download)?;
        self.user_acted(JobKind::Download);

        let output_dir = resolve_output_dir(&request.output_dir, &self.default_output_dir());
        self.store.save_last_folder(&output_dir);

        let selector = select_format(&request, self.formats_ready());
        let fetch_request = FetchRequest {
            url: url.to_string(),
            selector,
            output_dir,
            output_template: self.config.ytdlp.output_template.clone(),
            merge_format: merge_format_for(request.mode, &self.config.ytdlp),
            post_processing: post_processing_for(request.mode, &self.config.ytdlp),
        };

        let job_id = self.allocate_job_id();
        Ok(self.start_job(
            job_id,
            JobAction::Download {
                request: fetch_request,
            },
        ))
    }

    /// Ask the running download to stop
    ///
    /// Idempotent. With no download running but one waiting for connectivity,
    /// the wait is abandoned instead. Returns false when there was nothing to
    /// cancel.
    pub fn request_cancel(&mut self) -> bool {
        if let Some(active) = self.active.get(&JobKind::Download) {
            if !active.job.cancel_requested() {
                tracing::info!(job_id = %active.job.id, "Cancelling download");
                active.job.cancel.cancel();
                self.progress.set_status("Cancelling...");
            }
            return true;
        }

        if let Some(pending) = self.pending.remove(&JobKind::Download) {
            self.retries.cancel(JobKind::Download);
            tracing::info!(
                job_id = %pending.job_id,
                url = pending.action.url(),
                "Abandoning download waiting for connectivity"
            );
            self.progress.set_status("Download cancelled");
            self.notifications.push(Notification::Cancelled);
            return true;
        }

        tracing::debug!("Cancel requested with no download running");
        false
    }

    fn ensure_idle(&self, kind: JobKind) -> Result<()> {
        if let Some(active) = self.active.get(&kind) {
            tracing::warn!(
                job_id = %active.job.id,
                kind = %kind,
                "Job already active, ignoring request"
            );
            return Err(Error::AlreadyActive { kind });
        }
        Ok(())
    }

    /// A new user intent supersedes a suspended action of the same kind and
    /// re-arms invalid-source notices
    fn user_acted(&mut self, kind: JobKind) {
        if let Some(pending) = self.pending.remove(&kind) {
            self.retries.cancel(kind);
            tracing::info!(
                job_id = %pending.job_id,
                kind = %kind,
                "Replacing action waiting for connectivity"
            );
        }
        self.reported_invalid.clear();
    }
}
