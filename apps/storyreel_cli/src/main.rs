use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyreel_core::collaborators::{self, SpeechSynthesizer, SynthesizedSpeech, TranscriptFile};
use storyreel_core::config::ComposerConfig;
use storyreel_core::paths::JobId;
use storyreel_core::types::{CaptionStyle, CompositionRequest, CompositionResult, ImageOverlaySpec};
use storyreel_core::{cues, style, subtitle};
use storyreel_render::compose::{Compositor, ExecutionHooks, RenderProgress};
use storyreel_render::job::{NarrationJob, NarrationJobInput};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compose narrated short videos with ffmpeg", long_about = None)]
struct Cli {
    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a transcript into timed caption cues and write them as SRT
    Cues {
        /// Transcript segments (JSON)
        #[arg(short, long)]
        transcript: PathBuf,
        #[arg(short, long)]
        words_per_cue: Option<usize>,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Print the subtitle force_style string for a caption style
    Style {
        /// Caption style (JSON); the configured default when omitted
        #[arg(short, long)]
        style: Option<PathBuf>,
    },
    /// Print the ffmpeg invocation for a composition request
    Plan {
        #[arg(short, long)]
        request: PathBuf,
    },
    /// Run a composition request
    Compose {
        #[arg(short, long)]
        request: PathBuf,
    },
    /// Run a full narration job from a script and prerecorded narration
    Job {
        #[arg(long)]
        job_id: Option<String>,
        /// Narration script (plain text)
        #[arg(long)]
        script: PathBuf,
        /// Transcript segments of the narration (JSON)
        #[arg(long)]
        transcript: PathBuf,
        /// Prerecorded narration audio
        #[arg(long)]
        narration: PathBuf,
        #[arg(long)]
        video: PathBuf,
        #[arg(long)]
        music: Option<PathBuf>,
        #[arg(long)]
        voice: Option<String>,
        /// Caption style (JSON)
        #[arg(long)]
        style: Option<PathBuf>,
        /// Timed image as path:start:duration, repeatable
        #[arg(long = "image", value_parser = parse_image_arg)]
        images: Vec<ImageOverlaySpec>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Cues {
            transcript,
            words_per_cue,
            out,
        } => {
            let segments = collaborators::read_transcript(&transcript)
                .with_context(|| format!("failed to read transcript {}", transcript.display()))?;
            let cues = cues::segment(&segments, words_per_cue.unwrap_or(config.words_per_cue))?;
            subtitle::write_srt(&out, &cues)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("{} cues written to {}", cues.len(), out.display());
        }
        Commands::Style { style } => {
            let style = match style {
                Some(path) => read_json::<CaptionStyle>(&path)?,
                None => config.default_style.clone(),
            };
            println!("{}", style::translate(&style)?);
        }
        Commands::Plan { request } => {
            let request = read_json::<CompositionRequest>(&request)?;
            let compositor = Compositor::new(config);
            let graph = compositor.plan(&request)?;
            for dropped in &graph.warnings {
                warn!("{dropped:?}");
            }
            let args = compositor.ffmpeg_args(&request, &graph);
            println!("{} {}", compositor.config().ffmpeg_bin.display(), shell_join(&args));
        }
        Commands::Compose { request } => {
            let request = read_json::<CompositionRequest>(&request)?;
            let compositor = Compositor::new(config);
            let result = run_with_progress(|hooks| async move {
                compositor.compose(&request, hooks).await
            })
            .await?;
            report(&result);
        }
        Commands::Job {
            job_id,
            script,
            transcript,
            narration,
            video,
            music,
            voice,
            style,
            images,
        } => {
            let job_id = match job_id {
                Some(id) => JobId::parse(id)?,
                None => JobId::generate(),
            };
            let mut input = NarrationJobInput::new(
                std::fs::read_to_string(&script)
                    .with_context(|| format!("failed to read script {}", script.display()))?,
                video,
            );
            input.voice_id = voice;
            input.background_music = music;
            input.images = images;
            input.style = style.as_deref().map(read_json::<CaptionStyle>).transpose()?;

            let job = NarrationJob::new(
                Compositor::new(config),
                Arc::new(PrerecordedNarration { source: narration }),
                Arc::new(TranscriptFile::new(transcript)),
                job_id,
            );
            info!(job = %job.paths().job_id(), "running job in {}", job.paths().job_dir().display());
            let outcome = run_with_progress(|hooks| async move { job.run(&input, hooks).await }).await?;
            println!("job {}: {} cues", outcome.job_id, outcome.cues.len());
            report(&outcome.result);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ComposerConfig> {
    match path {
        Some(path) => ComposerConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ComposerConfig::default()),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Run a composition with a progress line on stderr and Ctrl-C cancellation.
async fn run_with_progress<F, Fut, T>(run: F) -> Result<T>
where
    F: FnOnce(ExecutionHooks) -> Fut,
    Fut: std::future::Future<Output = storyreel_render::error::Result<T>>,
{
    let (progress_tx, mut progress_rx) = watch::channel(RenderProgress::default());
    let (cancel_tx, cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, cancelling composition");
            let _ = cancel_tx.send(true);
        }
    });

    let printer = tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let p = progress_rx.borrow_and_update().clone();
            let eta = p
                .eta_seconds
                .map(|s| format!(" eta {s:.0}s"))
                .unwrap_or_default();
            eprint!("\r{:5.1}% frame {} {}{eta}   ", p.percent, p.frame, p.speed);
            let _ = std::io::stderr().flush();
        }
        eprintln!();
    });

    let hooks = ExecutionHooks::new()
        .with_progress(progress_tx)
        .with_cancel(cancel_rx);
    let result = run(hooks).await;
    let _ = printer.await;

    Ok(result?)
}

fn report(result: &CompositionResult) {
    match result.duration_seconds {
        Some(d) => println!("wrote {} ({d:.2}s)", result.output_path.display()),
        None => println!("wrote {}", result.output_path.display()),
    }
    for warning in &result.warnings {
        warn!("{warning:?}");
    }
}

fn shell_join(args: &[String]) -> String {
    args.iter()
        .map(|a| {
            if a.is_empty() || a.contains(|c: char| c.is_whitespace() || "'\"[];\\$".contains(c)) {
                format!("'{}'", a.replace('\'', r"'\''"))
            } else {
                a.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `path:start:duration`; the path may itself contain colons.
fn parse_image_arg(s: &str) -> std::result::Result<ImageOverlaySpec, String> {
    let mut parts = s.rsplitn(3, ':');
    let (Some(duration), Some(start), Some(path)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected path:start:duration, got '{s}'"));
    };
    let start: f64 = start
        .parse()
        .map_err(|_| format!("invalid start time '{start}'"))?;
    let duration: f64 = duration
        .parse()
        .map_err(|_| format!("invalid duration '{duration}'"))?;
    if path.is_empty() {
        return Err("image path is empty".to_string());
    }
    Ok(ImageOverlaySpec::new(path, start, duration))
}

/// Stands in for a TTS engine: the narration was recorded ahead of time and
/// is copied into the job directory.
struct PrerecordedNarration {
    source: PathBuf,
}

impl SpeechSynthesizer for PrerecordedNarration {
    fn synthesize(
        &self,
        _text: &str,
        _voice_id: &str,
        output: &Path,
    ) -> storyreel_core::error::Result<SynthesizedSpeech> {
        std::fs::copy(&self.source, output)?;
        // Unknown here; the executor probes the narration instead.
        Ok(SynthesizedSpeech {
            audio_path: output.to_path_buf(),
            duration_seconds: 0.0,
        })
    }
}
