//! Media fetcher backed by the external yt-dlp binary

use super::parser::{
    FILEPATH_TEMPLATE, OutputLine, PROGRESS_TEMPLATE, classify_failure, parse_output_line,
    parse_probe_json,
};
use super::traits::{
    FetchProgress, FetchRequest, FetchResult, MediaFetcher, PostProcessing, ProbeResult,
};
use crate::config::YtDlpConfig;
use crate::error::FetchError;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Read};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

const TOOL: &str = "yt-dlp";

/// Fetcher that drives the external `yt-dlp` binary
///
/// Probing runs `yt-dlp -J`; downloads stream machine-readable progress lines
/// from stdout and kill the child process when the progress callback breaks.
///
/// # Examples
///
/// ```no_run
/// use media_dl::config::YtDlpConfig;
/// use media_dl::fetcher::{MediaFetcher, YtDlpFetcher};
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let fetcher = YtDlpFetcher::new(PathBuf::from("/usr/local/bin/yt-dlp"));
///
/// // Or resolve from configuration (explicit path, then PATH)
/// let fetcher = YtDlpFetcher::from_config(&YtDlpConfig::default())?;
/// assert_eq!(fetcher.name(), "yt-dlp");
/// # Ok::<(), media_dl::FetchError>(())
/// ```
pub struct YtDlpFetcher {
    binary_path: PathBuf,
    ffmpeg_path: Option<PathBuf>,
    config: YtDlpConfig,
}

impl YtDlpFetcher {
    /// Create a fetcher with an explicit binary path and default settings
    pub fn new(binary_path: PathBuf) -> Self {
        Self::with_config(binary_path, YtDlpConfig::default())
    }

    /// Create a fetcher with an explicit binary path and custom settings
    ///
    /// ffmpeg is taken from `config.ffmpeg_path`, or searched in PATH when
    /// `config.search_path` is set.
    pub fn with_config(binary_path: PathBuf, config: YtDlpConfig) -> Self {
        let ffmpeg_path = config.ffmpeg_path.clone().or_else(|| {
            if config.search_path {
                which::which("ffmpeg").ok()
            } else {
                None
            }
        });

        if ffmpeg_path.is_none() {
            tracing::warn!("ffmpeg not found, merging and audio extraction may fail");
        }

        Self {
            binary_path,
            ffmpeg_path,
            config,
        }
    }

    /// Attempt to find yt-dlp in PATH
    ///
    /// Returns `None` if the binary is not found.
    pub fn from_path() -> Option<Self> {
        which::which(TOOL).ok().map(Self::new)
    }

    /// Resolve the binary from configuration
    ///
    /// An explicit `binary_path` wins; otherwise PATH is searched if
    /// `search_path` is enabled.
    pub fn from_config(config: &YtDlpConfig) -> FetchResult<Self> {
        let binary_path = match &config.binary_path {
            Some(path) => path.clone(),
            None if config.search_path => {
                which::which(TOOL).map_err(|_| FetchError::ToolMissing {
                    tool: TOOL.to_string(),
                })?
            }
            None => {
                return Err(FetchError::ToolMissing {
                    tool: TOOL.to_string(),
                });
            }
        };

        tracing::info!(binary = %binary_path.display(), "Using yt-dlp binary");
        Ok(Self::with_config(binary_path, config.clone()))
    }

    /// Path of the yt-dlp binary in use
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Path of the ffmpeg binary passed to yt-dlp, if any
    pub fn ffmpeg_path(&self) -> Option<&Path> {
        self.ffmpeg_path.as_deref()
    }

    pub(crate) fn probe_args(&self, url: &str) -> Vec<OsString> {
        ["-J", "--no-playlist", "--no-warnings", "--", url]
            .into_iter()
            .map(OsString::from)
            .collect()
    }

    pub(crate) fn download_args(&self, request: &FetchRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--newline",
            "--no-warnings",
            "--no-playlist",
            "--progress",
            "--no-simulate",
            "--progress-template",
            PROGRESS_TEMPLATE,
            "--print",
            FILEPATH_TEMPLATE,
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push("-f".into());
        args.push(request.selector.to_string().into());
        args.push("--paths".into());
        args.push(request.output_dir.clone().into_os_string());
        args.push("-o".into());
        args.push(request.output_template.clone().into());

        if let Some(merge_format) = &request.merge_format {
            args.push("--merge-output-format".into());
            args.push(merge_format.into());
        }

        if let Some(PostProcessing::ExtractAudio { codec, quality }) = &request.post_processing {
            args.push("--extract-audio".into());
            args.push("--audio-format".into());
            args.push(codec.into());
            args.push("--audio-quality".into());
            args.push(audio_quality_arg(quality).into());
        }

        for (flag, value) in [
            ("--retries", self.config.retries),
            ("--fragment-retries", self.config.fragment_retries),
            ("--sleep-interval", self.config.sleep_interval),
            ("--max-sleep-interval", self.config.max_sleep_interval),
        ] {
            args.push(flag.into());
            args.push(value.to_string().into());
        }

        if let Some(ffmpeg) = &self.ffmpeg_path {
            args.push("--ffmpeg-location".into());
            args.push(ffmpeg.clone().into_os_string());
        }

        args.push("--".into());
        args.push(request.url.clone().into());
        args
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut command = Command::new(&self.binary_path);
        command.args(args).stdin(Stdio::null());
        command
    }

    fn spawn_error(&self, e: std::io::Error) -> FetchError {
        if e.kind() == std::io::ErrorKind::NotFound {
            FetchError::ToolMissing {
                tool: self.binary_path.display().to_string(),
            }
        } else {
            FetchError::Io(e)
        }
    }
}

// yt-dlp reads a bare number as a VBR level (0-10), so bitrates need a unit
fn audio_quality_arg(quality: &str) -> String {
    let quality = quality.trim();
    match quality.parse::<u32>() {
        Ok(kbps) if kbps > 10 => format!("{kbps}K"),
        _ => quality.to_string(),
    }
}

/// Kill and reap a child that is still running
fn stop_child(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::warn!(error = %e, "Failed to kill yt-dlp");
    }
    let _ = child.wait();
}

impl MediaFetcher for YtDlpFetcher {
    fn probe_formats(&self, url: &str) -> FetchResult<ProbeResult> {
        let output = self
            .command(&self.probe_args(url))
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(TOOL, output.status.code(), &stderr));
        }

        parse_probe_json(&output.stdout)
    }

    fn fetch(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(FetchProgress) -> ControlFlow<()>,
    ) -> FetchResult<PathBuf> {
        let args = self.download_args(request);
        tracing::debug!(
            binary = %self.binary_path.display(),
            format = %request.selector,
            url = %request.url,
            "Starting yt-dlp download"
        );

        let mut child = self
            .command(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // Drain stderr on its own thread so a chatty child never blocks on a full pipe
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            })
        });

        let mut final_path = None;
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            url = %request.url,
                            error = %e,
                            "Failed to read yt-dlp output"
                        );
                        stop_child(&mut child);
                        return Err(e.into());
                    }
                }

                // Paths follow the filesystem encoding, not necessarily UTF-8
                let line = String::from_utf8_lossy(&buf);
                match parse_output_line(&line) {
                    OutputLine::Progress(progress) => {
                        if on_progress(progress).is_break() {
                            tracing::debug!(
                                url = %request.url,
                                "Progress callback requested abort"
                            );
                            stop_child(&mut child);
                            return Err(FetchError::Aborted);
                        }
                    }
                    OutputLine::FinalPath(path) => final_path = Some(path),
                    OutputLine::Other => {}
                }
            }
        }

        let status = child.wait()?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            return Err(classify_failure(TOOL, status.code(), &stderr));
        }

        final_path.ok_or_else(|| FetchError::ToolFailed {
            tool: TOOL.to_string(),
            code: status.code(),
            stderr: "download finished without reporting an output path".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        TOOL
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::FormatSelector;

    fn config_without_discovery() -> YtDlpConfig {
        YtDlpConfig {
            search_path: false,
            ..Default::default()
        }
    }

    fn request(selector: FormatSelector) -> FetchRequest {
        FetchRequest {
            url: "https://example.com/watch?v=abc".to_string(),
            selector,
            output_dir: PathBuf::from("/out"),
            output_template: "%(title)s.%(ext)s".to_string(),
            merge_format: Some("mp4".to_string()),
            post_processing: None,
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn value_after(args: &[String], flag: &str) -> Option<String> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1).cloned())
    }

    #[test]
    fn download_args_carry_selector_output_and_merge_format() {
        let fetcher =
            YtDlpFetcher::with_config(PathBuf::from("yt-dlp"), config_without_discovery());
        let args = strings(&fetcher.download_args(&request(FormatSelector::MaxHeight(720))));

        assert_eq!(
            value_after(&args, "-f").as_deref(),
            Some("bestvideo[height<=720]+bestaudio/best")
        );
        assert_eq!(value_after(&args, "--paths").as_deref(), Some("/out"));
        assert_eq!(value_after(&args, "-o").as_deref(), Some("%(title)s.%(ext)s"));
        assert_eq!(
            value_after(&args, "--merge-output-format").as_deref(),
            Some("mp4")
        );
        assert_eq!(value_after(&args, "--retries").as_deref(), Some("5"));
        assert_eq!(value_after(&args, "--fragment-retries").as_deref(), Some("10"));
        assert!(!args.contains(&"--extract-audio".to_string()));
        assert!(!args.contains(&"--ffmpeg-location".to_string()));
        assert_eq!(
            args.last().map(String::as_str),
            Some("https://example.com/watch?v=abc"),
            "URL goes last, after --"
        );
    }

    #[test]
    fn audio_request_adds_extraction_step() {
        let fetcher =
            YtDlpFetcher::with_config(PathBuf::from("yt-dlp"), config_without_discovery());
        let mut req = request(FormatSelector::BestAudio);
        req.merge_format = None;
        req.post_processing = Some(PostProcessing::ExtractAudio {
            codec: "mp3".to_string(),
            quality: "192".to_string(),
        });

        let args = strings(&fetcher.download_args(&req));
        assert_eq!(value_after(&args, "-f").as_deref(), Some("bestaudio/best"));
        assert!(args.contains(&"--extract-audio".to_string()));
        assert_eq!(value_after(&args, "--audio-format").as_deref(), Some("mp3"));
        assert_eq!(value_after(&args, "--audio-quality").as_deref(), Some("192K"));
        assert!(!args.contains(&"--merge-output-format".to_string()));
    }

    #[test]
    fn explicit_ffmpeg_path_is_forwarded() {
        let config = YtDlpConfig {
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")),
            ..config_without_discovery()
        };
        let fetcher = YtDlpFetcher::with_config(PathBuf::from("yt-dlp"), config);
        assert_eq!(
            fetcher.ffmpeg_path(),
            Some(Path::new("/opt/ffmpeg/bin/ffmpeg"))
        );

        let args = strings(&fetcher.download_args(&request(FormatSelector::BestVideoAudio)));
        assert_eq!(
            value_after(&args, "--ffmpeg-location").as_deref(),
            Some("/opt/ffmpeg/bin/ffmpeg")
        );
    }

    #[test]
    fn audio_quality_gets_bitrate_unit() {
        assert_eq!(audio_quality_arg("192"), "192K");
        assert_eq!(audio_quality_arg("320K"), "320K");
        assert_eq!(audio_quality_arg("0"), "0", "VBR levels pass through");
    }

    #[test]
    fn from_config_without_binary_or_search_is_tool_missing() {
        let err = YtDlpFetcher::from_config(&config_without_discovery())
            .err()
            .expect("no binary configured");
        assert!(matches!(err, FetchError::ToolMissing { .. }));
    }

    #[test]
    fn from_config_prefers_explicit_binary() {
        let config = YtDlpConfig {
            binary_path: Some(PathBuf::from("/custom/yt-dlp")),
            ..config_without_discovery()
        };
        let fetcher = YtDlpFetcher::from_config(&config).unwrap();
        assert_eq!(fetcher.binary_path(), Path::new("/custom/yt-dlp"));
    }

    #[test]
    fn from_path_consistency_with_which_crate() {
        assert_eq!(
            which::which(TOOL).is_ok(),
            YtDlpFetcher::from_path().is_some(),
            "from_path() should return Some if and only if which::which() succeeds"
        );
    }

    #[test]
    fn missing_binary_reports_tool_missing() {
        let fetcher = YtDlpFetcher::with_config(
            PathBuf::from("/nonexistent/yt-dlp-binary-xyz"),
            config_without_discovery(),
        );
        let err = fetcher.probe_formats("https://example.com").unwrap_err();
        assert!(matches!(err, FetchError::ToolMissing { .. }), "{err:?}");
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script standing in for yt-dlp
        fn fake_binary(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-yt-dlp");
            let script = format!("#!/bin/sh\n[ \"$1\" = \"--exec-check\" ] && exit 0\n{body}\n");
            std::fs::write(&path, script).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

            // Another test forking while the file was open for writing can make exec
            // fail with ETXTBSY for a short moment
            for _ in 0..50 {
                match Command::new(&path).arg("--exec-check").status() {
                    Err(e) if e.raw_os_error() == Some(26) => {
                        std::thread::sleep(std::time::Duration::from_millis(20))
                    }
                    _ => break,
                }
            }
            path
        }

        fn fetcher(binary: PathBuf) -> YtDlpFetcher {
            YtDlpFetcher::with_config(binary, config_without_discovery())
        }

        #[test]
        fn fetch_streams_progress_and_returns_final_path() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_binary(
                dir.path(),
                r#"echo "[youtube] abc: Downloading webpage"
echo "[media-dl:progress] downloading 500 1000 NA 100.0 5"
echo "[media-dl:progress] downloading 1000 1000 NA 100.0 0"
echo "[media-dl:progress] finished 1000 1000 NA NA NA"
echo "[media-dl:path] /out/title.mp4""#,
            );

            let mut ticks = Vec::new();
            let path = fetcher(binary)
                .fetch(&request(FormatSelector::BestVideoAudio), &mut |p| {
                    ticks.push(p);
                    ControlFlow::Continue(())
                })
                .unwrap();

            assert_eq!(path, PathBuf::from("/out/title.mp4"));
            assert_eq!(ticks.len(), 3);
            assert_eq!(ticks[2], FetchProgress::Finished);
            match &ticks[0] {
                FetchProgress::Downloading(sample) => {
                    assert_eq!(sample.downloaded_bytes, 500);
                    assert_eq!(sample.total_bytes, Some(1000));
                }
                other => panic!("expected downloading tick, got {other:?}"),
            }
        }

        #[test]
        fn non_utf8_output_path_does_not_fail_or_orphan_the_download() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("exited");
            let binary = fake_binary(
                dir.path(),
                &format!(
                    r#"printf '[media-dl:path] /out/\377\376.mp4\n'
sleep 1
echo "[media-dl:progress] finished 10 10 NA NA NA"
touch "{}""#,
                    marker.display()
                ),
            );

            let mut ticks = Vec::new();
            let path = fetcher(binary)
                .fetch(&request(FormatSelector::BestVideoAudio), &mut |p| {
                    ticks.push(p);
                    ControlFlow::Continue(())
                })
                .unwrap();

            assert_eq!(path, PathBuf::from("/out/\u{FFFD}\u{FFFD}.mp4"));
            assert_eq!(ticks, vec![FetchProgress::Finished]);
            assert!(marker.exists(), "fetch returns only after the child exited");
        }

        #[test]
        fn break_from_callback_aborts_the_child() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_binary(
                dir.path(),
                r#"echo "[media-dl:progress] downloading 1 NA NA NA NA"
exec sleep 30"#,
            );

            let start = std::time::Instant::now();
            let err = fetcher(binary)
                .fetch(&request(FormatSelector::BestVideoAudio), &mut |_| {
                    ControlFlow::Break(())
                })
                .unwrap_err();

            assert!(matches!(err, FetchError::Aborted), "{err:?}");
            assert!(
                start.elapsed() < std::time::Duration::from_secs(10),
                "abort must not wait for the transfer to finish"
            );
        }

        #[test]
        fn failed_run_is_classified_from_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_binary(
                dir.path(),
                r#"echo "ERROR: Unable to download webpage: The read operation timed out" >&2
exit 1"#,
            );

            let err = fetcher(binary)
                .fetch(&request(FormatSelector::BestVideoAudio), &mut |_| {
                    ControlFlow::Continue(())
                })
                .unwrap_err();
            assert!(matches!(err, FetchError::Network(_)), "{err:?}");
        }

        #[test]
        fn probe_parses_json_from_stdout() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_binary(
                dir.path(),
                r#"echo '{"title": "Clip", "uploader": "Chan", "duration": 61, "formats": [{"format_id": "22", "height": 720, "vcodec": "avc1", "acodec": "mp4a"}]}'"#,
            );

            let probe = fetcher(binary).probe_formats("https://example.com/v").unwrap();
            assert_eq!(probe.metadata.title, "Clip");
            assert_eq!(probe.metadata.duration_seconds, Some(61));
            assert_eq!(probe.formats[0].height, Some(720));
        }

        #[test]
        fn probe_of_unsupported_source_is_extraction_error() {
            let dir = tempfile::tempdir().unwrap();
            let binary = fake_binary(
                dir.path(),
                r#"echo "ERROR: Unsupported URL: https://example.com/v" >&2
exit 1"#,
            );

            let err = fetcher(binary)
                .probe_formats("https://example.com/v")
                .unwrap_err();
            assert!(matches!(err, FetchError::Extraction(_)), "{err:?}");
        }
    }
}
