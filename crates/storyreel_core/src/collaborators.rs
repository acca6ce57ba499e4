//! Boundaries to the speech services. Their internals live elsewhere.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::TranscriptSegment;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SynthesizedSpeech {
    pub audio_path: PathBuf,
    pub duration_seconds: f64,
}

/// Text-to-speech.
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `text` in `voice_id` to an audio file at `output`.
    fn synthesize(&self, text: &str, voice_id: &str, output: &Path) -> Result<SynthesizedSpeech>;
}

/// Speech-to-text.
pub trait Transcriber: Send + Sync {
    fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>>;
}

/// A transcriber backed by a JSON file of segments that an external
/// recognition step already produced.
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    path: PathBuf,
}

impl TranscriptFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Transcriber for TranscriptFile {
    fn transcribe(&self, _audio_path: &Path) -> Result<Vec<TranscriptSegment>> {
        read_transcript(&self.path)
    }
}

pub fn read_transcript(path: impl AsRef<Path>) -> Result<Vec<TranscriptSegment>> {
    let data = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&data)?)
}

pub fn write_transcript(path: impl AsRef<Path>, segments: &[TranscriptSegment]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(segments)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_file_reads_segments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.json");
        let segments = vec![
            TranscriptSegment::new(0.0, 2.0, "hello there friend"),
            TranscriptSegment::new(2.0, 5.0, "how are you today"),
        ];
        write_transcript(&path, &segments).unwrap();

        let transcriber = TranscriptFile::new(&path);
        let read = transcriber.transcribe(Path::new("ignored.mp3")).unwrap();
        assert_eq!(read, segments);
    }

    #[test]
    fn transcript_file_missing_is_io_error() {
        let transcriber = TranscriptFile::new("/tmp/storyreel_no_such_transcript.json");
        assert!(matches!(
            transcriber.transcribe(Path::new("a.mp3")),
            Err(crate::error::CoreError::Io(_))
        ));
    }
}
