//! Shared test doubles for the fetcher and connectivity probe

use crate::error::FetchError;
use crate::fetcher::{
    FetchProgress, FetchRequest, FetchResult, MediaFetcher, ProbeResult, RawFormat,
};
use crate::probe::ConnectivityProbe;
use crate::types::{ProgressSample, VideoMetadata};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Error a stub produces; `FetchError` itself is not `Clone`
#[derive(Clone, Debug)]
pub(crate) enum StubFailure {
    /// Transport timeout, classified as connectivity loss
    Timeout,
    /// Content failure such as an unsupported URL
    Extraction(String),
}

impl StubFailure {
    fn to_error(&self) -> FetchError {
        match self {
            StubFailure::Timeout => FetchError::Network("Read timed out".to_string()),
            StubFailure::Extraction(msg) => FetchError::Extraction(msg.clone()),
        }
    }
}

/// One step of a scripted download
#[derive(Clone, Debug)]
pub(crate) enum Step {
    /// Report a progress sample
    Progress(ProgressSample),
    /// Report the post-processing tick
    Finished,
    /// Report a failed chunk that is being retried
    ChunkError,
    /// Fail at this point
    Fail(StubFailure),
}

/// Fetcher that replays a script instead of touching the network
///
/// Every `fetch` call consumes the next script from the queue; once the queue
/// is empty the last script is repeated.
pub(crate) struct StubFetcher {
    probe: Mutex<Result<ProbeResult, StubFailure>>,
    scripts: Mutex<VecDeque<Vec<Step>>>,
    last_script: Mutex<Vec<Step>>,
    final_path: PathBuf,
    tick_delay: Duration,
    fetch_requests: Mutex<Vec<FetchRequest>>,
    probe_calls: AtomicU32,
}

impl StubFetcher {
    pub(crate) fn new(final_path: impl Into<PathBuf>) -> Self {
        Self {
            probe: Mutex::new(Ok(sample_probe())),
            scripts: Mutex::new(VecDeque::new()),
            last_script: Mutex::new(Vec::new()),
            final_path: final_path.into(),
            tick_delay: Duration::ZERO,
            fetch_requests: Mutex::new(Vec::new()),
            probe_calls: AtomicU32::new(0),
        }
    }

    /// Queue the steps of the next `fetch` call
    pub(crate) fn with_script(self, steps: Vec<Step>) -> Self {
        self.scripts.lock().unwrap().push_back(steps);
        self
    }

    /// Make `probe_formats` fail
    pub(crate) fn with_probe_failure(self, failure: StubFailure) -> Self {
        *self.probe.lock().unwrap() = Err(failure);
        self
    }

    /// Block the worker for `delay` before each step
    pub(crate) fn with_tick_delay(mut self, delay: Duration) -> Self {
        self.tick_delay = delay;
        self
    }

    /// Every request passed to `fetch`, in call order
    pub(crate) fn fetch_requests(&self) -> Vec<FetchRequest> {
        self.fetch_requests.lock().unwrap().clone()
    }

    /// Number of `probe_formats` calls
    pub(crate) fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }

    fn next_script(&self) -> Vec<Step> {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.pop_front() {
            Some(script) => {
                *self.last_script.lock().unwrap() = script.clone();
                script
            }
            None => self.last_script.lock().unwrap().clone(),
        }
    }
}

impl MediaFetcher for StubFetcher {
    fn probe_formats(&self, _url: &str) -> FetchResult<ProbeResult> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        self.probe.lock().unwrap().clone().map_err(|f| f.to_error())
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(FetchProgress) -> ControlFlow<()>,
    ) -> FetchResult<PathBuf> {
        self.fetch_requests.lock().unwrap().push(request.clone());

        for step in self.next_script() {
            if !self.tick_delay.is_zero() {
                std::thread::sleep(self.tick_delay);
            }
            let progress = match step {
                Step::Progress(sample) => FetchProgress::Downloading(sample),
                Step::Finished => FetchProgress::Finished,
                Step::ChunkError => FetchProgress::ChunkError,
                Step::Fail(failure) => return Err(failure.to_error()),
            };
            if on_progress(progress).is_break() {
                return Err(FetchError::Aborted);
            }
        }

        Ok(self.final_path.clone())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Probe result with a title and two video heights
pub(crate) fn sample_probe() -> ProbeResult {
    ProbeResult {
        metadata: VideoMetadata {
            title: "title".to_string(),
            duration_seconds: Some(90),
            uploader: "uploader".to_string(),
            thumbnail: None,
        },
        formats: vec![
            RawFormat {
                format_id: "136".to_string(),
                height: Some(720),
                width: Some(1280),
                vcodec: Some("avc1".to_string()),
                acodec: Some("none".to_string()),
                tbr: Some(1500.0),
                filesize: Some(1_500_000),
                ..Default::default()
            },
            RawFormat {
                format_id: "134".to_string(),
                height: Some(360),
                width: Some(640),
                vcodec: Some("avc1".to_string()),
                acodec: Some("none".to_string()),
                tbr: Some(400.0),
                ..Default::default()
            },
            RawFormat {
                format_id: "140".to_string(),
                vcodec: Some("none".to_string()),
                acodec: Some("mp4a".to_string()),
                abr: Some(128.0),
                filesize: Some(500_000),
                ..Default::default()
            },
        ],
    }
}

/// Progress step with a known total
pub(crate) fn tick(downloaded: u64, total: u64) -> Step {
    Step::Progress(ProgressSample {
        downloaded_bytes: downloaded,
        total_bytes: Some(total),
        speed_bytes_per_sec: None,
        eta_seconds: None,
    })
}

/// Probe whose answer is scripted first, then controlled by a switch
pub(crate) struct StubProbe {
    script: Mutex<VecDeque<bool>>,
    online: AtomicBool,
    calls: AtomicU32,
    delay: Duration,
}

impl StubProbe {
    pub(crate) fn online() -> Arc<Self> {
        Self::with_script(&[], true)
    }

    pub(crate) fn offline() -> Arc<Self> {
        Self::with_script(&[], false)
    }

    /// Answer `script` in order, then `then` until switched
    pub(crate) fn with_script(script: &[bool], then: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            online: AtomicBool::new(then),
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
        })
    }

    /// Always offline, answering only after `delay`
    pub(crate) fn slow_offline(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            online: AtomicBool::new(false),
            calls: AtomicU32::new(0),
            delay,
        })
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for StubProbe {
    async fn is_online(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.script.lock().unwrap().pop_front() {
            Some(answer) => answer,
            None => self.online.load(Ordering::SeqCst),
        }
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
