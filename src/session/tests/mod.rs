//! Session tests split by concern


use super::*;
use crate::test_helpers::{StubFetcher, StubProbe};
use crate::types::{DownloadRequest, Event, FailureKind, FormatMode, JobEvent, ResolutionChoice};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

pub(super) struct Harness {
    pub(super) session: DownloadSession,
    pub(super) fetcher: Arc<StubFetcher>,
    pub(super) probe: Arc<StubProbe>,
    pub(super) dir: TempDir,
}

pub(super) fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.session.poll_interval = Duration::from_millis(5);
    config.session.default_output_dir = dir.join("downloads");
    config.session.store_path = dir.join("config.json");
    config.connectivity.retry_interval = Duration::from_millis(20);
    config
}

pub(super) fn harness(fetcher: StubFetcher, probe: Arc<StubProbe>) -> Harness {
    harness_with(fetcher, probe, |_| {})
}

pub(super) fn harness_with(
    fetcher: StubFetcher,
    probe: Arc<StubProbe>,
    adjust: impl FnOnce(&mut Config),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    adjust(&mut config);

    let fetcher = Arc::new(fetcher);
    let store = Arc::new(JsonConfigStore::new(config.session.store_path.clone()));
    let session =
        DownloadSession::with_components(config, fetcher.clone(), probe.clone(), store).unwrap();

    Harness {
        session,
        fetcher,
        probe,
        dir,
    }
}

impl Harness {
    pub(super) fn video(&self, resolution: ResolutionChoice) -> DownloadRequest {
        DownloadRequest {
            url: "https://example/video".to_string(),
            mode: FormatMode::Video,
            resolution,
            output_dir: self.dir.path().join("out"),
        }
    }

    /// Drain until the session is idle, returning everything drained
    pub(super) async fn settle(&mut self) -> Vec<JobEvent> {
        let mut events = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            self.session.run_until_idle(|event| events.push(event.clone())),
        )
        .await
        .expect("session did not become idle");
        events
    }

    /// Drain until `done` holds, returning everything drained
    pub(super) async fn drain_until(
        &mut self,
        done: impl Fn(&DownloadSession) -> bool,
    ) -> Vec<JobEvent> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !done(&self.session) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached, phase {:?}",
                self.session.phase()
            );
            events.extend(self.session.drain_events());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        events
    }
}
