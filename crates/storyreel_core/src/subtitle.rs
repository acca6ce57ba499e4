//! SubRip (`.srt`) cue files.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::types::CaptionCue;

/// Seconds → `HH:MM:SS,mmm`, rounded to the millisecond.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let mins = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;
    format!("{hours:02}:{mins:02}:{secs:02},{millis:03}")
}

/// `HH:MM:SS,mmm` → seconds. A `.` is accepted in place of the comma.
pub fn parse_timestamp(s: &str) -> Option<f64> {
    let (hms, millis) = s.trim().split_once([',', '.'])?;
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 || millis.is_empty() {
        return None;
    }
    let hours: u64 = parts[0].parse().ok()?;
    let mins: u64 = parts[1].parse().ok()?;
    let secs: u64 = parts[2].parse().ok()?;
    let millis: u64 = millis.parse().ok()?;
    if mins >= 60 || secs >= 60 || millis >= 1000 {
        return None;
    }
    Some((hours * 3600 + mins * 60 + secs) as f64 + millis as f64 / 1000.0)
}

/// Render cues in SubRip layout: index, `start --> end`, text, blank line.
pub fn to_srt(cues: &[CaptionCue]) -> String {
    let mut out = String::new();
    for cue in cues {
        // Writing into a String cannot fail.
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            cue.index,
            format_timestamp(cue.start_seconds),
            format_timestamp(cue.end_seconds),
            cue.text
        );
    }
    out
}

/// Write cues to `path`, creating parent directories as needed.
pub fn write_srt(path: impl AsRef<Path>, cues: &[CaptionCue]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_srt(cues))?;
    tracing::debug!(path = %path.display(), cues = cues.len(), "wrote subtitle file");
    Ok(())
}

/// Parse SubRip text. Multi-line cue text is joined with `\n`.
pub fn parse_srt(text: &str) -> Result<Vec<CaptionCue>> {
    let mut cues = Vec::new();
    let mut lines = text
        .trim_start_matches('\u{feff}')
        .lines()
        .enumerate()
        .peekable();

    loop {
        // Skip blank lines between blocks.
        while lines.peek().is_some_and(|(_, l)| l.trim().is_empty()) {
            lines.next();
        }
        let Some((index_line_no, index_line)) = lines.next() else {
            break;
        };

        let index: usize = index_line.trim().parse().map_err(|_| CoreError::InvalidSubtitle {
            line: index_line_no + 1,
            reason: format!("expected cue index, got {index_line:?}"),
        })?;

        let (timing_line_no, timing_line) =
            lines.next().ok_or_else(|| CoreError::InvalidSubtitle {
                line: index_line_no + 2,
                reason: "missing timing line".into(),
            })?;
        let bad_timing = || CoreError::InvalidSubtitle {
            line: timing_line_no + 1,
            reason: format!("expected `start --> end`, got {timing_line:?}"),
        };
        let (start, end) = timing_line.split_once("-->").ok_or_else(bad_timing)?;
        let start_seconds = parse_timestamp(start).ok_or_else(bad_timing)?;
        let end_seconds = parse_timestamp(end).ok_or_else(bad_timing)?;

        let mut text_lines = Vec::new();
        while let Some((_, line)) = lines.next_if(|(_, l)| !l.trim().is_empty()) {
            text_lines.push(line.trim_end());
        }

        cues.push(CaptionCue {
            index,
            start_seconds,
            end_seconds,
            text: text_lines.join("\n"),
        });
    }

    Ok(cues)
}

/// Read and parse a `.srt` file.
pub fn read_srt(path: impl AsRef<Path>) -> Result<Vec<CaptionCue>> {
    let text = std::fs::read_to_string(path.as_ref())?;
    parse_srt(&text)
}
