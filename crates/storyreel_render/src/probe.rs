use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::process::Command;

use crate::error::{RenderError, Result};

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// The subset of probe data the composer cares about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_seconds: Option<f64>,
    pub has_video: bool,
    pub has_audio: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run ffprobe on a media file.
pub async fn probe_media(ffprobe_bin: &Path, path: impl AsRef<Path>) -> Result<MediaInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RenderError::MissingInput {
            role: "probe target",
            path: path.to_path_buf(),
        });
    }

    let output = Command::new(ffprobe_bin)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .await
        .map_err(|e| RenderError::FfprobeExec(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RenderError::FfprobeFailed(stderr.into_owned()));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    Ok(parse_probe_output(&probe))
}

/// Duration of a media file in seconds.
pub async fn probe_duration(ffprobe_bin: &Path, path: impl AsRef<Path>) -> Result<f64> {
    let path = path.as_ref();
    match probe_media(ffprobe_bin, path).await {
        Ok(MediaInfo {
            duration_seconds: Some(d),
            ..
        }) => Ok(d),
        Ok(_) => Err(RenderError::DurationProbeFailed(format!(
            "no duration reported for {}",
            path.display()
        ))),
        Err(e) => Err(RenderError::DurationProbeFailed(e.to_string())),
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_probe_output(probe: &FfprobeOutput) -> MediaInfo {
    // Container duration first; some muxers only report it per stream.
    let duration_seconds = parse_seconds(probe.format.duration.as_deref()).or_else(|| {
        probe
            .streams
            .iter()
            .filter_map(|s| parse_seconds(s.duration.as_deref()))
            .reduce(f64::max)
    });

    MediaInfo {
        duration_seconds,
        has_video: probe.streams.iter().any(|s| s.codec_type == "video"),
        has_audio: probe.streams.iter().any(|s| s.codec_type == "audio"),
    }
}

fn parse_seconds(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_output_video_and_audio() {
        let json = r#"{
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1080,
                    "height": 1920,
                    "r_frame_rate": "30/1"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "channels": 2
                }
            ],
            "format": {
                "duration": "31.250000"
            }
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = parse_probe_output(&output);

        assert!(info.has_video);
        assert!(info.has_audio);
        assert!((info.duration_seconds.unwrap() - 31.25).abs() < 1e-9);
    }

    #[test]
    fn parse_probe_output_falls_back_to_stream_duration() {
        let json = r#"{
            "streams": [
                { "codec_type": "audio", "duration": "12.5" },
                { "codec_type": "video", "duration": "12.7", "width": 640, "height": 360 }
            ],
            "format": {}
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = parse_probe_output(&output);
        assert!((info.duration_seconds.unwrap() - 12.7).abs() < 1e-9);
    }

    #[test]
    fn parse_probe_output_without_duration() {
        let json = r#"{ "streams": [], "format": { "duration": "N/A" } }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = parse_probe_output(&output);
        assert_eq!(info.duration_seconds, None);
        assert!(!info.has_video);
        assert!(!info.has_audio);
    }

    #[tokio::test]
    async fn probe_nonexistent_file_returns_error() {
        let result = probe_media(
            Path::new("ffprobe"),
            "/tmp/does_not_exist_storyreel_probe_test.mp4",
        )
        .await;
        assert!(matches!(result, Err(RenderError::MissingInput { .. })));
    }

    #[tokio::test]
    async fn duration_probe_failure_is_reported_as_such() {
        let result = probe_duration(
            Path::new("ffprobe"),
            "/tmp/does_not_exist_storyreel_probe_test.mp4",
        )
        .await;
        assert!(matches!(result, Err(RenderError::DurationProbeFailed(_))));
    }
}
