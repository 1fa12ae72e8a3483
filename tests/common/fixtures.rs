//! Scripted fetcher and probe built only on the public traits

use async_trait::async_trait;
use media_dl::fetcher::{FetchProgress, FetchRequest, FetchResult, ProbeResult, RawFormat};
use media_dl::{
    Config, ConnectivityProbe, DownloadSession, FetchError, JsonConfigStore, MediaFetcher,
    ProgressSample, VideoMetadata,
};
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// One scripted step of a transfer
#[derive(Clone, Debug)]
pub enum Tick {
    /// Report progress
    Bytes {
        /// Bytes so far
        downloaded: u64,
        /// Total, if known
        total: Option<u64>,
    },
    /// Report the post-processing tick
    PostProcessing,
    /// Fail with a transport timeout
    TimedOut,
}

/// Fetcher that plays one script per `fetch` call and records its requests
pub struct ScriptedFetcher {
    scripts: Mutex<VecDeque<Vec<Tick>>>,
    output: PathBuf,
    delay: Duration,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn new(output: impl Into<PathBuf>, delay: Duration, scripts: Vec<Vec<Tick>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            output: output.into(),
            delay,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl MediaFetcher for ScriptedFetcher {
    fn probe_formats(&self, _url: &str) -> FetchResult<ProbeResult> {
        Ok(ProbeResult {
            metadata: VideoMetadata {
                title: "Sample clip".to_string(),
                duration_seconds: Some(212),
                uploader: "Uploader".to_string(),
                thumbnail: None,
            },
            formats: vec![
                video_format("137", 1080, 4_000_000),
                video_format("136", 720, 2_000_000),
                RawFormat {
                    format_id: "140".to_string(),
                    vcodec: Some("none".to_string()),
                    acodec: Some("mp4a.40.2".to_string()),
                    abr: Some(129.5),
                    filesize: Some(3_400_000),
                    ..Default::default()
                },
            ],
        })
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(FetchProgress) -> ControlFlow<()>,
    ) -> FetchResult<PathBuf> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();

        for tick in script {
            std::thread::sleep(self.delay);
            let progress = match tick {
                Tick::Bytes { downloaded, total } => FetchProgress::Downloading(ProgressSample {
                    downloaded_bytes: downloaded,
                    total_bytes: total,
                    speed_bytes_per_sec: Some(1_048_576.0),
                    eta_seconds: Some(3),
                }),
                Tick::PostProcessing => FetchProgress::Finished,
                Tick::TimedOut => {
                    return Err(FetchError::Network(
                        "Unable to download webpage: The read operation timed out".to_string(),
                    ));
                }
            };
            if on_progress(progress).is_break() {
                return Err(FetchError::Aborted);
            }
        }
        Ok(self.output.clone())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn video_format(id: &str, height: u32, size: u64) -> RawFormat {
    RawFormat {
        format_id: id.to_string(),
        ext: Some("mp4".to_string()),
        height: Some(height),
        width: Some(height * 16 / 9),
        vcodec: Some("avc1.640028".to_string()),
        acodec: Some("none".to_string()),
        tbr: Some(f64::from(height) * 2.0),
        filesize: Some(size),
        ..Default::default()
    }
}

/// A progress tick of a transfer with a known size
pub fn bytes(downloaded: u64, total: u64) -> Tick {
    Tick::Bytes {
        downloaded,
        total: Some(total),
    }
}

/// Probe answering from a script, then from a switch
pub struct SwitchProbe {
    script: Mutex<VecDeque<bool>>,
    online: AtomicBool,
    calls: AtomicU32,
}

impl SwitchProbe {
    pub fn new(script: &[bool], then: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.iter().copied().collect()),
            online: AtomicBool::new(then),
            calls: AtomicU32::new(0),
        })
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectivityProbe for SwitchProbe {
    async fn is_online(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.online.load(Ordering::SeqCst))
    }

    fn name(&self) -> &'static str {
        "switch"
    }
}

/// Config with fast polling and retries, rooted in `dir`
pub fn fast_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.session.poll_interval = Duration::from_millis(5);
    config.session.default_output_dir = dir.path().join("downloads");
    config.session.store_path = dir.path().join("config.json");
    config.connectivity.retry_interval = Duration::from_millis(25);
    config
}

/// Session wired to the given fetcher and probe, with a JSON store in `dir`
pub fn create_session(
    dir: &TempDir,
    fetcher: Arc<ScriptedFetcher>,
    probe: Arc<SwitchProbe>,
) -> DownloadSession {
    let config = fast_config(dir);
    let store = Arc::new(JsonConfigStore::new(config.session.store_path.clone()));
    DownloadSession::with_components(config, fetcher, probe, store).unwrap()
}
