use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use storyreel_core::config::ComposerConfig;
use storyreel_core::style;
use storyreel_core::types::{CompositionRequest, CompositionWarning, ImageOverlaySpec};
use tracing::{debug, warn};

use crate::error::{RenderError, Result};

/// Label of the video stream handed to the muxer.
pub const TERMINAL_VIDEO: &str = "vout";
/// Label of the mixed audio stream when background music is present.
pub const TERMINAL_AUDIO: &str = "aout";

// ---------------------------------------------------------------------------
// Labels and stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
}

/// A stream reference inside the filter graph: either a stream of an input
/// file (`1:a`) or a label produced by an earlier stage (`vsub`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamLabel {
    Input { index: usize, kind: StreamKind },
    Named(String),
}

impl StreamLabel {
    pub fn named(name: impl Into<String>) -> Self {
        StreamLabel::Named(name.into())
    }

    pub fn input(index: usize, kind: StreamKind) -> Self {
        StreamLabel::Input { index, kind }
    }

    /// Form used inside `-filter_complex`: `[1:a]`, `[vout]`.
    pub fn bracketed(&self) -> String {
        format!("[{self}]")
    }

    /// Form used after `-map`: input streams are bare, stage labels bracketed.
    pub fn map_arg(&self) -> String {
        match self {
            StreamLabel::Input { .. } => self.to_string(),
            StreamLabel::Named(_) => self.bracketed(),
        }
    }
}

impl fmt::Display for StreamLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamLabel::Input { index, kind } => {
                let k = match kind {
                    StreamKind::Video => 'v',
                    StreamKind::Audio => 'a',
                };
                write!(f, "{index}:{k}")
            }
            StreamLabel::Named(name) => f.write_str(name),
        }
    }
}

/// One node of the filter graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStage {
    pub inputs: Vec<StreamLabel>,
    pub output: StreamLabel,
    pub expression: String,
}

impl FilterStage {
    /// `[in0][in1]expression[out]`
    pub fn render(&self) -> String {
        let mut s = String::new();
        for input in &self.inputs {
            s.push_str(&input.bracketed());
        }
        s.push_str(&self.expression);
        s.push_str(&self.output.bracketed());
        s
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputRole {
    BaseVideo,
    Narration,
    Music,
    /// Position of the overlay in the request's list.
    Image(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInput {
    pub index: usize,
    pub path: PathBuf,
    pub role: InputRole,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMap {
    pub video: StreamLabel,
    pub audio: StreamLabel,
}

/// A built filter graph: inputs in `-i` order, stages in execution order,
/// and the two streams to map into the output file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterGraph {
    pub inputs: Vec<GraphInput>,
    pub stages: Vec<FilterStage>,
    pub output: OutputMap,
    pub warnings: Vec<CompositionWarning>,
}

impl FilterGraph {
    pub fn input_order(&self) -> Vec<&Path> {
        self.inputs.iter().map(|i| i.path.as_path()).collect()
    }

    /// The `-filter_complex` argument.
    pub fn filter_complex(&self) -> String {
        self.stages
            .iter()
            .map(FilterStage::render)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn dropped_overlays(&self) -> usize {
        self.warnings
            .iter()
            .filter(|w| matches!(w, CompositionWarning::OverlayDropped { .. }))
            .count()
    }

    pub fn overlay_count(&self) -> usize {
        self.inputs
            .iter()
            .filter(|i| matches!(i.role, InputRole::Image(_)))
            .count()
    }

    /// Check label hygiene: every consumed label exists by the time it is
    /// used, every stage label is defined once and consumed once (terminal
    /// labels excepted), and each input stream feeds at most one place.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(RenderError::InvalidGraph(msg));

        for (pos, input) in self.inputs.iter().enumerate() {
            if input.index != pos {
                return invalid(format!(
                    "input {} listed at position {pos}",
                    input.index
                ));
            }
        }

        let mut defined: HashSet<&str> = HashSet::new();
        let mut consumed: HashSet<&StreamLabel> = HashSet::new();

        for (i, stage) in self.stages.iter().enumerate() {
            for label in &stage.inputs {
                match label {
                    StreamLabel::Input { index, .. } if *index >= self.inputs.len() => {
                        return invalid(format!("stage {i} reads unknown input {label}"));
                    }
                    StreamLabel::Named(name) if !defined.contains(name.as_str()) => {
                        return invalid(format!("stage {i} reads undefined label {label}"));
                    }
                    _ => {}
                }
                if !consumed.insert(label) {
                    return invalid(format!("label {label} consumed more than once"));
                }
            }

            match &stage.output {
                StreamLabel::Named(name) => {
                    if !defined.insert(name.as_str()) {
                        return invalid(format!("label {name} defined more than once"));
                    }
                }
                StreamLabel::Input { .. } => {
                    return invalid(format!("stage {i} writes to an input stream"));
                }
            }
        }

        for terminal in [&self.output.video, &self.output.audio] {
            match terminal {
                StreamLabel::Named(name) if !defined.contains(name.as_str()) => {
                    return invalid(format!("terminal label {name} is never produced"));
                }
                StreamLabel::Input { index, .. } if *index >= self.inputs.len() => {
                    return invalid(format!("terminal stream {terminal} has no input"));
                }
                _ => {}
            }
            if consumed.contains(terminal) {
                return invalid(format!("terminal label {terminal} is consumed by a stage"));
            }
        }

        for name in &defined {
            let label = StreamLabel::named(*name);
            let is_terminal = label == self.output.video || label == self.output.audio;
            if !is_terminal && !consumed.contains(&label) {
                return invalid(format!("label {name} is produced but never used"));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Build the filter graph for a composition request.
///
/// The graph is assembled by a fixed sequence of steps, each appending
/// stages only when its optional input is present:
///
/// 1. base video (input 0) and narration (input 1)
/// 2. audio: narration alone, or narration + music mixed into `aout`
/// 3. captions burned into the base video
/// 4. one overlay stage per image, in list order
/// 5. relabel to `vout` if no overlay stage produced it
///
/// Missing image files are dropped with a warning; missing base video,
/// narration, subtitle or music files fail the build.
pub fn build(request: &CompositionRequest, config: &ComposerConfig) -> Result<FilterGraph> {
    require_file(&request.base_video, "base video")?;
    require_file(&request.narration_audio, "narration")?;
    if let Some(music) = &request.background_music {
        require_file(music, "background music")?;
    }

    let caption_style = if request.style.enabled {
        require_file(&request.subtitle_path, "subtitle")?;
        Some(style::translate(&request.style)?)
    } else {
        None
    };

    for (i, overlay) in request.overlays.iter().enumerate() {
        overlay.validate(i)?;
    }

    let mut builder = GraphBuilder::new();
    let base = builder.add_input(&request.base_video, InputRole::BaseVideo);
    let narration = builder.add_input(&request.narration_audio, InputRole::Narration);

    builder.current_video = StreamLabel::input(base, StreamKind::Video);
    builder.audio = StreamLabel::input(narration, StreamKind::Audio);

    if let Some(music) = &request.background_music {
        builder.mix_music(music, config.narration_volume, config.music_volume);
    }

    if let Some(force_style) = &caption_style {
        builder.burn_captions(&request.subtitle_path, force_style);
    }

    let overlays = builder.keep_existing_overlays(&request.overlays);
    builder.apply_overlays(&overlays);

    builder.finish_video();

    let graph = builder.into_graph();
    graph.validate()?;

    debug!(
        stages = graph.stages.len(),
        inputs = graph.inputs.len(),
        dropped_overlays = graph.dropped_overlays(),
        "built filter graph"
    );

    Ok(graph)
}

struct GraphBuilder {
    inputs: Vec<GraphInput>,
    stages: Vec<FilterStage>,
    current_video: StreamLabel,
    audio: StreamLabel,
    warnings: Vec<CompositionWarning>,
}

impl GraphBuilder {
    fn new() -> Self {
        Self {
            inputs: Vec::new(),
            stages: Vec::new(),
            current_video: StreamLabel::input(0, StreamKind::Video),
            audio: StreamLabel::input(1, StreamKind::Audio),
            warnings: Vec::new(),
        }
    }

    /// Register an input file and return its `-i` index. The only place
    /// indices are handed out.
    fn add_input(&mut self, path: &Path, role: InputRole) -> usize {
        let index = self.inputs.len();
        self.inputs.push(GraphInput {
            index,
            path: path.to_path_buf(),
            role,
        });
        index
    }

    fn push(&mut self, inputs: Vec<StreamLabel>, output: StreamLabel, expression: String) {
        self.stages.push(FilterStage {
            inputs,
            output,
            expression,
        });
    }

    fn mix_music(&mut self, music: &Path, narration_volume: f64, music_volume: f64) {
        let music_index = self.add_input(music, InputRole::Music);

        let narration = StreamLabel::named("narration");
        let bed = StreamLabel::named("music");
        let mixed = StreamLabel::named(TERMINAL_AUDIO);

        self.push(
            vec![self.audio.clone()],
            narration.clone(),
            format!("volume={narration_volume}"),
        );
        self.push(
            vec![StreamLabel::input(music_index, StreamKind::Audio)],
            bed.clone(),
            format!("volume={music_volume}"),
        );
        // duration=first keeps the mix as long as the narration.
        self.push(
            vec![narration, bed],
            mixed.clone(),
            "amix=inputs=2:duration=first:dropout_transition=0".to_string(),
        );

        self.audio = mixed;
    }

    fn burn_captions(&mut self, subtitle_path: &Path, force_style: &str) {
        let out = StreamLabel::named("vsub");
        self.push(
            vec![self.current_video.clone()],
            out.clone(),
            format!(
                "subtitles=filename={}:force_style='{force_style}'",
                escape_filter_path(subtitle_path)
            ),
        );
        self.current_video = out;
    }

    fn keep_existing_overlays<'a>(
        &mut self,
        overlays: &'a [ImageOverlaySpec],
    ) -> Vec<(usize, &'a ImageOverlaySpec)> {
        let mut kept = Vec::with_capacity(overlays.len());
        for (i, overlay) in overlays.iter().enumerate() {
            if overlay.image_path.is_file() {
                kept.push((i, overlay));
            } else {
                warn!(
                    index = i,
                    path = %overlay.image_path.display(),
                    "image overlay file missing, dropping overlay"
                );
                self.warnings.push(CompositionWarning::OverlayDropped {
                    index: i,
                    path: overlay.image_path.clone(),
                });
            }
        }
        kept
    }

    /// Each overlay composites onto the previous video label, so list order
    /// is stacking order. The last one writes the terminal label.
    fn apply_overlays(&mut self, overlays: &[(usize, &ImageOverlaySpec)]) {
        for (n, (original_index, overlay)) in overlays.iter().enumerate() {
            let input_index = self.add_input(&overlay.image_path, InputRole::Image(*original_index));
            let mut image = StreamLabel::input(input_index, StreamKind::Video);

            if let Some(width) = overlay.width {
                let scaled = StreamLabel::named(format!("img{n}"));
                self.push(vec![image], scaled.clone(), format!("scale={width}:-1"));
                image = scaled;
            }

            let (x, y) = match overlay.position() {
                Some((x, y)) => (x.to_string(), y.to_string()),
                None => ("(W-w)/2".to_string(), "(H-h)/2".to_string()),
            };

            let out = if n == overlays.len() - 1 {
                StreamLabel::named(TERMINAL_VIDEO)
            } else {
                StreamLabel::named(format!("vov{n}"))
            };

            let start = overlay.start_seconds;
            let end = overlay.end_seconds();
            self.push(
                vec![self.current_video.clone(), image],
                out.clone(),
                format!("overlay=x={x}:y={y}:enable='between(t,{start},{end})'"),
            );
            self.current_video = out;
        }
    }

    /// Pass the current video through `null` so the terminal label exists
    /// however many overlays there were.
    fn finish_video(&mut self) {
        let terminal = StreamLabel::named(TERMINAL_VIDEO);
        if self.current_video != terminal {
            self.push(
                vec![self.current_video.clone()],
                terminal.clone(),
                "null".to_string(),
            );
            self.current_video = terminal;
        }
    }

    fn into_graph(self) -> FilterGraph {
        FilterGraph {
            inputs: self.inputs,
            stages: self.stages,
            output: OutputMap {
                video: self.current_video,
                audio: self.audio,
            },
            warnings: self.warnings,
        }
    }
}

fn require_file(path: &Path, role: &'static str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(RenderError::MissingInput {
            role,
            path: path.to_path_buf(),
        })
    }
}

/// Quote a path for use as a filter option value.
///
/// ffmpeg unescapes the value twice: once when splitting the filtergraph and
/// again when splitting the filter's `key=value` options on `:`. Separators
/// become `/`, then `\`, `'` and `:` are backslash-escaped for the option
/// parser, and the result is single-quoted for the filtergraph parser
/// (a literal `'` closes the quote and is re-emitted as `\'`).
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/");
    let mut option_level = String::with_capacity(raw.len() + 8);
    for c in raw.chars() {
        if matches!(c, '\\' | '\'' | ':') {
            option_level.push('\\');
        }
        option_level.push(c);
    }
    format!("'{}'", option_level.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
