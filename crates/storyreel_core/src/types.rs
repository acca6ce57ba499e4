use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// TranscriptSegment
// ---------------------------------------------------------------------------

/// A raw, time-stamped span of recognised speech as returned by the
/// transcription collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

impl TranscriptSegment {
    pub fn new(start_seconds: f64, end_seconds: f64, text: impl Into<String>) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text: text.into(),
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }
}

// ---------------------------------------------------------------------------
// CaptionCue
// ---------------------------------------------------------------------------

/// One on-screen caption: a handful of words and the window they are shown in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptionCue {
    /// 1-based, contiguous across the whole cue list.
    pub index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

impl CaptionCue {
    pub fn duration_seconds(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }
}

// ---------------------------------------------------------------------------
// CaptionStyle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Default,
    Bold,
    Minimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptionPosition {
    Top,
    Center,
    #[default]
    Bottom,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptionStyle {
    pub enabled: bool,
    pub font_family: String,
    pub size_pt: u32,
    /// `#RRGGBB`
    pub color_hex: String,
    pub weight: FontWeight,
    pub position: CaptionPosition,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            font_family: "Arial".to_string(),
            size_pt: 24,
            color_hex: "#FFFFFF".to_string(),
            weight: FontWeight::Bold,
            position: CaptionPosition::Bottom,
        }
    }
}

// ---------------------------------------------------------------------------
// ImageOverlaySpec
// ---------------------------------------------------------------------------

/// An image shown on top of the video for a time window.
///
/// List order is stacking order: a later overlay is drawn over an earlier
/// one when their windows coincide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageOverlaySpec {
    pub image_path: PathBuf,
    pub start_seconds: f64,
    pub duration_seconds: f64,
    /// Pixel position of the image's top-left corner. Centered unless both
    /// `x` and `y` are set.
    #[serde(default)]
    pub x: Option<i32>,
    #[serde(default)]
    pub y: Option<i32>,
    /// Scale the image to this width, keeping its aspect ratio.
    #[serde(default)]
    pub width: Option<u32>,
}

impl ImageOverlaySpec {
    pub fn new(image_path: impl Into<PathBuf>, start_seconds: f64, duration_seconds: f64) -> Self {
        Self {
            image_path: image_path.into(),
            start_seconds,
            duration_seconds,
            x: None,
            y: None,
            width: None,
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.width = Some(width);
        self
    }

    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }

    /// Explicit coordinates, if both were supplied.
    pub fn position(&self) -> Option<(i32, i32)> {
        self.x.zip(self.y)
    }

    /// Check the time window. `index` is only used for the error message.
    pub fn validate(&self, index: usize) -> Result<()> {
        if !self.start_seconds.is_finite() || self.start_seconds < 0.0 {
            return Err(CoreError::InvalidOverlay {
                index,
                reason: format!("start {} must be >= 0", self.start_seconds),
            });
        }
        if !self.duration_seconds.is_finite() || self.duration_seconds <= 0.0 {
            return Err(CoreError::InvalidOverlay {
                index,
                reason: format!("duration {} must be > 0", self.duration_seconds),
            });
        }
        if self.width == Some(0) {
            return Err(CoreError::InvalidOverlay {
                index,
                reason: "width must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// CompositionRequest
// ---------------------------------------------------------------------------

/// Everything one composition needs. Built fresh per job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositionRequest {
    pub base_video: PathBuf,
    pub narration_audio: PathBuf,
    pub subtitle_path: PathBuf,
    #[serde(default)]
    pub style: CaptionStyle,
    #[serde(default)]
    pub background_music: Option<PathBuf>,
    #[serde(default)]
    pub overlays: Vec<ImageOverlaySpec>,
    pub output_path: PathBuf,
}

impl CompositionRequest {
    pub fn new(
        base_video: impl Into<PathBuf>,
        narration_audio: impl Into<PathBuf>,
        subtitle_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            base_video: base_video.into(),
            narration_audio: narration_audio.into(),
            subtitle_path: subtitle_path.into(),
            style: CaptionStyle::default(),
            background_music: None,
            overlays: vec![],
            output_path: output_path.into(),
        }
    }

    pub fn with_style(mut self, style: CaptionStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_music(mut self, path: impl Into<PathBuf>) -> Self {
        self.background_music = Some(path.into());
        self
    }

    pub fn with_overlay(mut self, overlay: ImageOverlaySpec) -> Self {
        self.overlays.push(overlay);
        self
    }
}

// ---------------------------------------------------------------------------
// CompositionWarning / CompositionResult
// ---------------------------------------------------------------------------

/// Non-fatal conditions met while building or running a composition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CompositionWarning {
    OverlayDropped { index: usize, path: PathBuf },
    DurationProbeFailed { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompositionResult {
    pub output_path: PathBuf,
    /// Read back from the finished file. `None` when probing failed; the
    /// composition itself still succeeded.
    pub duration_seconds: Option<f64>,
    pub warnings: Vec<CompositionWarning>,
}
