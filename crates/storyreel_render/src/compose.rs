use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use storyreel_core::config::{ComposerConfig, EncodingSettings};
use storyreel_core::types::{CompositionRequest, CompositionResult, CompositionWarning};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{RenderError, Result};
use crate::graph::{self, FilterGraph};
use crate::probe;

/// How many trailing stderr lines are kept as the failure diagnostic.
const STDERR_TAIL_LINES: usize = 40;

/// Progress update during composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderProgress {
    pub percent: f64,
    pub frame: u64,
    pub fps: f64,
    pub speed: String,
    pub eta_seconds: Option<f64>,
}

/// Lifecycle of one ffmpeg run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompositionEvent {
    Started { args: Vec<String> },
    Progress(RenderProgress),
    Finished(CompositionResult),
    Failed { message: String },
}

/// Optional channels a caller can attach to an execution.
#[derive(Debug, Default)]
pub struct ExecutionHooks {
    progress: Option<watch::Sender<RenderProgress>>,
    events: Option<mpsc::UnboundedSender<CompositionEvent>>,
    cancel: Option<watch::Receiver<bool>>,
    pub(crate) expected_duration_seconds: Option<f64>,
}

impl ExecutionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, tx: watch::Sender<RenderProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_events(mut self, tx: mpsc::UnboundedSender<CompositionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Cancel the run when the receiver sees `true`.
    pub fn with_cancel(mut self, rx: watch::Receiver<bool>) -> Self {
        self.cancel = Some(rx);
        self
    }

    /// Length of the output, used to turn encoder position into a percent.
    /// Probed from the narration when not given.
    pub fn with_expected_duration(mut self, seconds: f64) -> Self {
        self.expected_duration_seconds = Some(seconds);
        self
    }

    fn emit(&self, event: CompositionEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn report(&self, progress: RenderProgress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(progress.clone());
        }
        self.emit(CompositionEvent::Progress(progress));
    }
}

/// Build ffmpeg args for a graph: inputs in graph order, the filter graph,
/// explicit stream mapping and fixed encoder settings.
pub fn build_ffmpeg_args(graph: &FilterGraph, output: &Path, encoding: &EncodingSettings) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-nostats".to_string(),
        "-progress".to_string(),
        "pipe:1".to_string(),
    ];

    for input in &graph.inputs {
        args.push("-i".to_string());
        args.push(input.path.to_string_lossy().to_string());
    }

    args.push("-filter_complex".to_string());
    args.push(graph.filter_complex());

    args.extend([
        "-map".to_string(),
        graph.output.video.map_arg(),
        "-map".to_string(),
        graph.output.audio.map_arg(),
        "-c:v".to_string(),
        encoding.video_codec.clone(),
        "-preset".to_string(),
        encoding.preset.clone(),
        "-crf".to_string(),
        encoding.crf.to_string(),
        "-pix_fmt".to_string(),
        encoding.pix_fmt.clone(),
        "-c:a".to_string(),
        encoding.audio_codec.clone(),
        "-b:a".to_string(),
        encoding.audio_bitrate.clone(),
        "-shortest".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]);

    args.push(output.to_string_lossy().to_string());

    args
}

/// Runs compositions with one configuration.
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    config: ComposerConfig,
}

impl Compositor {
    pub fn new(config: ComposerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Validate inputs and build the filter graph. Nothing is spawned.
    pub fn plan(&self, request: &CompositionRequest) -> Result<FilterGraph> {
        graph::build(request, &self.config)
    }

    pub fn ffmpeg_args(&self, request: &CompositionRequest, graph: &FilterGraph) -> Vec<String> {
        build_ffmpeg_args(graph, &request.output_path, &self.config.encoding)
    }

    /// Plan and execute in one step.
    pub async fn compose(
        &self,
        request: &CompositionRequest,
        hooks: ExecutionHooks,
    ) -> Result<CompositionResult> {
        let graph = self.plan(request)?;
        self.execute(request, &graph, hooks).await
    }

    /// Run ffmpeg for a built graph.
    ///
    /// Progress is best-effort. Backend failures are returned with ffmpeg's
    /// own diagnostics and never retried here. On failure or cancellation
    /// the partial output file is removed. Dropping the returned future
    /// kills the ffmpeg process.
    pub async fn execute(
        &self,
        request: &CompositionRequest,
        graph: &FilterGraph,
        mut hooks: ExecutionHooks,
    ) -> Result<CompositionResult> {
        let output_path = &request.output_path;
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let narration_secs = self.preflight(request).await?;
        let total_secs = hooks.expected_duration_seconds.or(narration_secs);
        if total_secs.is_none() {
            debug!("no expected duration, progress will stay at 0");
        }

        let args = self.ffmpeg_args(request, graph);
        debug!("Running ffmpeg: {} {}", self.config.ffmpeg_bin.display(), args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::FfmpegNotFound
                } else {
                    RenderError::Io(e)
                }
            })?;

        info!(output = %output_path.display(), inputs = graph.inputs.len(), "composition started");
        hooks.emit(CompositionEvent::Started { args: args.clone() });

        let stderr = child.stderr.take().ok_or_else(|| {
            RenderError::Io(std::io::Error::other("ffmpeg stderr was not captured"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            RenderError::Io(std::io::Error::other("ffmpeg stdout was not captured"))
        })?;

        let stderr_task = tokio::spawn(collect_stderr_tail(stderr));
        let mut progress_lines = BufReader::new(stdout).lines();
        let mut parser = ProgressParser::default();
        let mut tracker = ProgressTracker::default();
        let mut stdout_open = true;
        let mut cancel = hooks.cancel.take();

        let status = loop {
            tokio::select! {
                line = progress_lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        if let Some(progress) = parser.feed(&line, total_secs) {
                            hooks.report(tracker.observe(progress));
                        }
                    }
                    _ => stdout_open = false,
                },
                status = child.wait() => break status?,
                _ = cancelled(&mut cancel) => {
                    info!(output = %output_path.display(), "composition cancelled, killing ffmpeg");
                    let _ = child.kill().await;
                    stderr_task.abort();
                    discard_partial_output(output_path).await;
                    hooks.emit(CompositionEvent::Failed { message: "cancelled".into() });
                    return Err(RenderError::Cancelled);
                }
            }
        };

        // Progress written just before exit may still be buffered.
        while stdout_open {
            match progress_lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(progress) = parser.feed(&line, total_secs) {
                        hooks.report(tracker.observe(progress));
                    }
                }
                _ => stdout_open = false,
            }
        }

        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let message = if stderr_tail.is_empty() {
                format!("ffmpeg exited with {status}")
            } else {
                stderr_tail.into_iter().collect::<Vec<_>>().join("\n")
            };
            warn!(output = %output_path.display(), "composition failed: {message}");
            discard_partial_output(output_path).await;
            hooks.emit(CompositionEvent::Failed {
                message: message.clone(),
            });
            return Err(RenderError::BackendExecutionFailed {
                message,
                exit_code: status.code(),
            });
        }

        hooks.report(tracker.complete());

        let mut warnings = graph.warnings.clone();
        let duration_seconds = match probe::probe_duration(&self.config.ffprobe_bin, output_path).await {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(output = %output_path.display(), "could not read output duration: {e}");
                warnings.push(CompositionWarning::DurationProbeFailed {
                    reason: e.to_string(),
                });
                None
            }
        };

        let result = CompositionResult {
            output_path: output_path.clone(),
            duration_seconds,
            warnings,
        };

        info!(
            output = %output_path.display(),
            duration = ?result.duration_seconds,
            "composition finished"
        );
        hooks.emit(CompositionEvent::Finished(result.clone()));

        Ok(result)
    }
}

impl Compositor {
    /// Check the base video carries a video stream and the narration an
    /// audio stream before ffmpeg is started. Returns the narration length.
    /// Probe failures are not fatal; ffmpeg reports unreadable inputs itself.
    async fn preflight(&self, request: &CompositionRequest) -> Result<Option<f64>> {
        let ffprobe = &self.config.ffprobe_bin;

        match probe::probe_media(ffprobe, &request.base_video).await {
            Ok(info) if !info.has_video => {
                return Err(RenderError::MissingStream {
                    role: "base video",
                    stream: "video",
                    path: request.base_video.clone(),
                });
            }
            Ok(_) => {}
            Err(e) => debug!(path = %request.base_video.display(), "skipping base video check: {e}"),
        }

        match probe::probe_media(ffprobe, &request.narration_audio).await {
            Ok(info) if !info.has_audio => Err(RenderError::MissingStream {
                role: "narration",
                stream: "audio",
                path: request.narration_audio.clone(),
            }),
            Ok(info) => Ok(info.duration_seconds),
            Err(e) => {
                debug!(path = %request.narration_audio.display(), "skipping narration check: {e}");
                Ok(None)
            }
        }
    }
}

/// Resolves once the cancel flag is set; never resolves without a receiver
/// or after the sender is gone.
async fn cancelled(cancel: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = cancel {
        if rx.wait_for(|flag| *flag).await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

async fn collect_stderr_tail(stderr: tokio::process::ChildStderr) -> VecDeque<String> {
    let mut lines = BufReader::new(stderr).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::trace!(target: "ffmpeg", "{line}");
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

async fn discard_partial_output(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial output"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "could not remove partial output: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Accumulates ffmpeg `-progress` key=value lines; a block ends with
/// `progress=continue` or `progress=end`.
#[derive(Debug, Default)]
struct ProgressParser {
    frame: u64,
    fps: f64,
    out_time_secs: f64,
    speed: String,
}

impl ProgressParser {
    fn feed(&mut self, line: &str, total_secs: Option<f64>) -> Option<RenderProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    self.fps = fps;
                }
            }
            // Both are microseconds despite the name of the second.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_secs = us.max(0) as f64 / 1_000_000.0;
                }
            }
            "out_time" => {
                if let Some(secs) = parse_time_str(value) {
                    self.out_time_secs = secs.max(0.0);
                }
            }
            "speed" => self.speed = value.to_string(),
            "progress" => return Some(self.snapshot(total_secs.unwrap_or(0.0))),
            _ => {}
        }
        None
    }

    fn snapshot(&self, total_secs: f64) -> RenderProgress {
        let time_secs = self.out_time_secs;

        let percent = if total_secs > 0.0 {
            (time_secs / total_secs * 100.0).min(100.0)
        } else {
            0.0
        };

        let speed_factor = self
            .speed
            .trim_end_matches('x')
            .parse::<f64>()
            .unwrap_or(0.0);

        let eta_seconds = if speed_factor > 0.0 && total_secs > time_secs {
            Some((total_secs - time_secs) / speed_factor)
        } else {
            None
        };

        RenderProgress {
            percent,
            frame: self.frame,
            fps: self.fps,
            speed: self.speed.clone(),
            eta_seconds,
        }
    }
}

/// Keeps reported percent from going backwards.
#[derive(Debug, Default)]
struct ProgressTracker {
    last: RenderProgress,
}

impl ProgressTracker {
    fn observe(&mut self, mut progress: RenderProgress) -> RenderProgress {
        progress.percent = progress.percent.max(self.last.percent);
        self.last = progress.clone();
        progress
    }

    fn complete(&mut self) -> RenderProgress {
        let mut done = self.last.clone();
        done.percent = 100.0;
        done.eta_seconds = Some(0.0);
        self.observe(done)
    }
}

/// Parse an ffmpeg time string like "00:01:02.05" into seconds.
fn parse_time_str(s: &str) -> Option<f64> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let mins: f64 = parts[1].parse().ok()?;
    let secs: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + mins * 60.0 + secs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
