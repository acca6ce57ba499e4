use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cues::DEFAULT_WORDS_PER_CUE;
use crate::error::{CoreError, Result};
use crate::style;
use crate::types::CaptionStyle;

/// Fixed encoder parameters for the final video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncodingSettings {
    pub video_codec: String,
    pub preset: String,
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub pix_fmt: String,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "veryfast".to_string(),
            crf: 23,
            audio_codec: "aac".to_string(),
            audio_bitrate: "192k".to_string(),
            pix_fmt: "yuv420p".to_string(),
        }
    }
}

/// Engine configuration. Passed explicitly to every component that needs it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ComposerConfig {
    pub ffmpeg_bin: PathBuf,
    pub ffprobe_bin: PathBuf,
    pub words_per_cue: usize,
    pub narration_volume: f64,
    pub music_volume: f64,
    pub encoding: EncodingSettings,
    pub default_style: CaptionStyle,
    pub jobs_root: PathBuf,
    pub default_voice: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: PathBuf::from("ffmpeg"),
            ffprobe_bin: PathBuf::from("ffprobe"),
            words_per_cue: DEFAULT_WORDS_PER_CUE,
            narration_volume: 1.0,
            music_volume: 0.15,
            encoding: EncodingSettings::default(),
            default_style: CaptionStyle::default(),
            jobs_root: PathBuf::from("jobs"),
            default_voice: "default".to_string(),
        }
    }
}

impl ComposerConfig {
    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON. Missing fields take their defaults.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: ComposerConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.words_per_cue == 0 {
            return Err(CoreError::InvalidOperation(
                "words_per_cue must be at least 1".into(),
            ));
        }
        if !(self.narration_volume.is_finite() && self.narration_volume > 0.0) {
            return Err(CoreError::InvalidOperation(format!(
                "narration_volume {} must be positive",
                self.narration_volume
            )));
        }
        if !(self.music_volume.is_finite() && self.music_volume >= 0.0) {
            return Err(CoreError::InvalidOperation(format!(
                "music_volume {} must be non-negative",
                self.music_volume
            )));
        }
        if self.music_volume >= self.narration_volume {
            return Err(CoreError::InvalidOperation(format!(
                "music_volume {} must be below narration_volume {}",
                self.music_volume, self.narration_volume
            )));
        }
        style::translate(&self.default_style)?;
        Ok(())
    }
}
