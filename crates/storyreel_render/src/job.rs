use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use storyreel_core::collaborators::{self, SpeechSynthesizer, SynthesizedSpeech, Transcriber};
use storyreel_core::cues;
use storyreel_core::error::CoreError;
use storyreel_core::paths::{ArtifactKind, JobId, JobPaths};
use storyreel_core::subtitle;
use storyreel_core::types::{
    CaptionCue, CaptionStyle, CompositionRequest, CompositionResult, ImageOverlaySpec,
    TranscriptSegment,
};
use tracing::{debug, info, warn};

use crate::compose::{Compositor, ExecutionHooks};
use crate::error::{RenderError, Result};

/// What the caller supplies for one narrated video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrationJobInput {
    pub script: String,
    /// Falls back to the configured default voice.
    #[serde(default)]
    pub voice_id: Option<String>,
    pub base_video: PathBuf,
    #[serde(default)]
    pub background_music: Option<PathBuf>,
    #[serde(default)]
    pub images: Vec<ImageOverlaySpec>,
    /// Falls back to the configured default style.
    #[serde(default)]
    pub style: Option<CaptionStyle>,
}

impl NarrationJobInput {
    pub fn new(script: impl Into<String>, base_video: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
            voice_id: None,
            base_video: base_video.into(),
            background_music: None,
            images: Vec::new(),
            style: None,
        }
    }
}

/// Everything a finished job produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrationJobOutcome {
    pub job_id: JobId,
    pub speech: SynthesizedSpeech,
    pub cues: Vec<CaptionCue>,
    pub result: CompositionResult,
}

/// Runs synthesis, transcription, cue segmentation and composition for a
/// single job directory.
pub struct NarrationJob {
    compositor: Compositor,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    transcriber: Arc<dyn Transcriber>,
    paths: JobPaths,
}

impl NarrationJob {
    pub fn new(
        compositor: Compositor,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        transcriber: Arc<dyn Transcriber>,
        job_id: JobId,
    ) -> Self {
        let paths = JobPaths::new(compositor.config().jobs_root.clone(), job_id);
        Self {
            compositor,
            synthesizer,
            transcriber,
            paths,
        }
    }

    pub fn paths(&self) -> &JobPaths {
        &self.paths
    }

    pub async fn run(
        &self,
        input: &NarrationJobInput,
        mut hooks: ExecutionHooks,
    ) -> Result<NarrationJobOutcome> {
        if input.script.trim().is_empty() {
            return Err(CoreError::InvalidOperation("narration script is empty".into()).into());
        }

        let config = self.compositor.config();
        let job_id = self.paths.job_id().clone();
        info!(job = %job_id, dir = %self.paths.job_dir().display(), "narration job started");
        self.paths.ensure_dirs()?;

        let voice = input
            .voice_id
            .clone()
            .unwrap_or_else(|| config.default_voice.clone());
        let speech = self.synthesize(&input.script, &voice).await?;
        debug!(job = %job_id, duration = speech.duration_seconds, "narration synthesized");

        let segments = self.transcribe(&speech.audio_path).await?;
        collaborators::write_transcript(self.paths.path(ArtifactKind::Transcript), &segments)?;

        let cues = cues::segment(&segments, config.words_per_cue)?;
        let captions_path = self.paths.path(ArtifactKind::Captions);
        subtitle::write_srt(&captions_path, &cues)?;
        info!(job = %job_id, segments = segments.len(), cues = cues.len(), "captions written");

        let mut request = CompositionRequest::new(
            &input.base_video,
            &speech.audio_path,
            captions_path,
            self.paths.path(ArtifactKind::Output),
        )
        .with_style(input.style.clone().unwrap_or_else(|| config.default_style.clone()));
        if let Some(music) = &input.background_music {
            request = request.with_music(music);
        }
        for (slot, image) in input.images.iter().enumerate() {
            request = request.with_overlay(self.stage_image(slot, image).await?);
        }

        if hooks.expected_duration_seconds.is_none() && speech.duration_seconds > 0.0 {
            hooks = hooks.with_expected_duration(speech.duration_seconds);
        }

        let result = self.compositor.compose(&request, hooks).await?;
        info!(job = %job_id, output = %result.output_path.display(), "narration job finished");

        Ok(NarrationJobOutcome {
            job_id,
            speech,
            cues,
            result,
        })
    }

    async fn synthesize(&self, script: &str, voice: &str) -> Result<SynthesizedSpeech> {
        let synthesizer = Arc::clone(&self.synthesizer);
        let script = script.to_string();
        let voice = voice.to_string();
        let output = self.paths.path(ArtifactKind::Narration);
        let speech =
            tokio::task::spawn_blocking(move || synthesizer.synthesize(&script, &voice, &output))
                .await
                .map_err(join_error)??;
        Ok(speech)
    }

    async fn transcribe(&self, audio: &Path) -> Result<Vec<TranscriptSegment>> {
        let transcriber = Arc::clone(&self.transcriber);
        let audio = audio.to_path_buf();
        let segments = tokio::task::spawn_blocking(move || transcriber.transcribe(&audio))
            .await
            .map_err(join_error)??;
        Ok(segments)
    }

    /// Copy an overlay image into its job slot. Missing sources are passed
    /// through untouched so the graph builder drops them with a warning.
    async fn stage_image(&self, slot: usize, image: &ImageOverlaySpec) -> Result<ImageOverlaySpec> {
        let target = self.paths.path(ArtifactKind::Image(slot));
        if image.image_path == target {
            return Ok(image.clone());
        }
        if !image.image_path.is_file() {
            warn!(slot, path = %image.image_path.display(), "overlay image not found, leaving in place");
            return Ok(image.clone());
        }
        tokio::fs::copy(&image.image_path, &target).await?;
        let mut staged = image.clone();
        staged.image_path = target;
        Ok(staged)
    }
}

fn join_error(e: tokio::task::JoinError) -> RenderError {
    RenderError::Io(std::io::Error::other(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use storyreel_core::config::ComposerConfig;
    use storyreel_core::types::CompositionWarning;

    /// Writes a placeholder audio file and reports a fixed duration.
    struct FakeSynthesizer {
        duration: f64,
    }

    impl SpeechSynthesizer for FakeSynthesizer {
        fn synthesize(
            &self,
            text: &str,
            voice_id: &str,
            output: &Path,
        ) -> storyreel_core::error::Result<SynthesizedSpeech> {
            std::fs::write(output, format!("{voice_id}:{text}"))?;
            Ok(SynthesizedSpeech {
                audio_path: output.to_path_buf(),
                duration_seconds: self.duration,
            })
        }
    }

    struct FixedTranscriber(Vec<TranscriptSegment>);

    impl Transcriber for FixedTranscriber {
        fn transcribe(&self, audio_path: &Path) -> storyreel_core::error::Result<Vec<TranscriptSegment>> {
            assert!(audio_path.exists());
            Ok(self.0.clone())
        }
    }

    struct FailingTranscriber;

    impl Transcriber for FailingTranscriber {
        fn transcribe(&self, _audio_path: &Path) -> storyreel_core::error::Result<Vec<TranscriptSegment>> {
            Err(CoreError::Other("recognizer unavailable".into()))
        }
    }

    fn segments() -> Vec<TranscriptSegment> {
        vec![
            TranscriptSegment::new(0.0, 3.0, "once upon a time there was"),
            TranscriptSegment::new(3.0, 5.0, "a tiny crab"),
        ]
    }

    fn config(dir: &Path) -> ComposerConfig {
        ComposerConfig {
            jobs_root: dir.join("jobs"),
            ffprobe_bin: PathBuf::from("/nonexistent/storyreel-ffprobe"),
            ..ComposerConfig::default()
        }
    }

    fn job(config: ComposerConfig, transcriber: Arc<dyn Transcriber>, id: &str) -> NarrationJob {
        NarrationJob::new(
            Compositor::new(config),
            Arc::new(FakeSynthesizer { duration: 5.0 }),
            transcriber,
            JobId::parse(id).unwrap(),
        )
    }

    #[tokio::test]
    async fn empty_script_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(config(dir.path()), Arc::new(FixedTranscriber(segments())), "empty");
        let err = job
            .run(&NarrationJobInput::new("   ", dir.path().join("base.mp4")), ExecutionHooks::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Core(CoreError::InvalidOperation(_))));
        assert!(!job.paths().job_dir().exists());
    }

    #[tokio::test]
    async fn transcriber_failure_stops_before_captions() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(config(dir.path()), Arc::new(FailingTranscriber), "failing");
        let err = job
            .run(
                &NarrationJobInput::new("hello there", dir.path().join("base.mp4")),
                ExecutionHooks::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Core(CoreError::Other(_))));
        assert!(job.paths().path(ArtifactKind::Narration).exists());
        assert!(!job.paths().path(ArtifactKind::Captions).exists());
    }

    #[tokio::test]
    async fn missing_base_video_fails_after_captions_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let job = job(config(dir.path()), Arc::new(FixedTranscriber(segments())), "nobase");
        let err = job
            .run(
                &NarrationJobInput::new("once upon a time", dir.path().join("missing.mp4")),
                ExecutionHooks::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::MissingInput { role: "base video", .. }));

        let cues = subtitle::read_srt(job.paths().path(ArtifactKind::Captions)).unwrap();
        assert_eq!(cues.len(), 3);
        let transcript =
            collaborators::read_transcript(job.paths().path(ArtifactKind::Transcript)).unwrap();
        assert_eq!(transcript, segments());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn full_job_writes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.ffmpeg_bin = crate::test_support::fake_ffmpeg(
            dir.path(),
            "printf 'out_time_us=2500000\\nprogress=end\\n'\necho video > \"$last\"",
        );

        let base = dir.path().join("base.mp4");
        std::fs::write(&base, b"base").unwrap();
        let image = dir.path().join("crab.png");
        std::fs::write(&image, b"png").unwrap();

        let mut input = NarrationJobInput::new("once upon a time there was a tiny crab", &base);
        input.images = vec![
            ImageOverlaySpec::new(&image, 0.0, 2.0),
            ImageOverlaySpec::new(dir.path().join("lost.png"), 2.0, 1.0),
        ];

        let job = job(config, Arc::new(FixedTranscriber(segments())), "story-1");
        let (progress_tx, progress_rx) =
            tokio::sync::watch::channel(crate::compose::RenderProgress::default());
        let outcome = job
            .run(&input, ExecutionHooks::new().with_progress(progress_tx))
            .await
            .unwrap();

        let paths = job.paths();
        assert_eq!(outcome.job_id.as_str(), "story-1");
        assert_eq!(outcome.result.output_path, paths.path(ArtifactKind::Output));
        assert!(paths.path(ArtifactKind::Output).exists());
        assert!(paths.path(ArtifactKind::Narration).exists());
        assert!(paths.path(ArtifactKind::Transcript).exists());
        assert!(paths.path(ArtifactKind::Image(0)).exists());
        assert!(!paths.path(ArtifactKind::Image(1)).exists());

        let words: Vec<String> = outcome.cues.iter().map(|c| c.text.clone()).collect();
        assert_eq!(words, vec!["once upon a", "time there was", "a tiny crab"]);
        assert_eq!(subtitle::read_srt(paths.path(ArtifactKind::Captions)).unwrap().len(), 3);

        assert!(outcome.result.warnings.iter().any(|w| matches!(
            w,
            CompositionWarning::OverlayDropped { index: 1, .. }
        )));
        assert_eq!(progress_rx.borrow().percent, 100.0);
    }
}
