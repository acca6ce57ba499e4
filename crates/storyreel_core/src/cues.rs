use crate::error::{CoreError, Result};
use crate::types::{CaptionCue, TranscriptSegment};

/// Default number of words shown per caption.
pub const DEFAULT_WORDS_PER_CUE: usize = 3;

/// Re-segment transcript spans into short caption cues.
///
/// Each segment's words are cut into windows of `words_per_cue`, and each
/// window gets a share of the segment's time proportional to its word count.
/// Cue indices run 1-based across the whole output. Segments with no words
/// are skipped; segments with broken timing are rejected.
pub fn segment(segments: &[TranscriptSegment], words_per_cue: usize) -> Result<Vec<CaptionCue>> {
    if words_per_cue == 0 {
        return Err(CoreError::InvalidOperation(
            "words_per_cue must be at least 1".into(),
        ));
    }

    let mut cues = Vec::new();
    let mut previous_end = f64::NEG_INFINITY;

    for (seg_idx, seg) in segments.iter().enumerate() {
        validate_segment(seg_idx, seg, previous_end)?;

        let words = seg.words();
        if words.is_empty() {
            tracing::debug!(segment = seg_idx, "skipping transcript segment with no words");
            continue;
        }
        previous_end = seg.end_seconds;

        let word_count = words.len();
        let time_per_word = seg.duration_seconds() / word_count as f64;

        for (chunk_idx, chunk) in words.chunks(words_per_cue).enumerate() {
            let first = chunk_idx * words_per_cue;
            let last = first + chunk.len();

            let start_seconds = seg.start_seconds + first as f64 * time_per_word;
            // The final window ends exactly on the segment boundary so float
            // drift never leaves a gap.
            let end_seconds = if last == word_count {
                seg.end_seconds
            } else {
                seg.start_seconds + last as f64 * time_per_word
            };

            cues.push(CaptionCue {
                index: cues.len() + 1,
                start_seconds,
                end_seconds,
                text: chunk.join(" "),
            });
        }
    }

    Ok(cues)
}

fn validate_segment(index: usize, seg: &TranscriptSegment, previous_end: f64) -> Result<()> {
    let invalid = |reason: String| CoreError::InvalidSegment { index, reason };

    if !seg.start_seconds.is_finite() || !seg.end_seconds.is_finite() {
        return Err(invalid("timestamps must be finite".into()));
    }
    if seg.start_seconds < 0.0 {
        return Err(invalid(format!("start {} is negative", seg.start_seconds)));
    }
    if seg.end_seconds <= seg.start_seconds {
        return Err(invalid(format!(
            "end {} is not after start {}",
            seg.end_seconds, seg.start_seconds
        )));
    }
    if seg.start_seconds < previous_end {
        return Err(invalid(format!(
            "start {} overlaps previous segment ending at {}",
            seg.start_seconds, previous_end
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start, end, text)
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn narration_example_produces_expected_cues() {
        let segments = vec![
            seg(0.0, 2.0, "hello there friend"),
            seg(2.0, 5.0, "how are you today"),
        ];
        let cues = segment(&segments, 3).unwrap();

        assert_eq!(cues.len(), 3);

        assert_eq!(cues[0].index, 1);
        assert!(approx(cues[0].start_seconds, 0.0));
        assert!(approx(cues[0].end_seconds, 2.0));
        assert_eq!(cues[0].text, "hello there friend");

        assert_eq!(cues[1].index, 2);
        assert!(approx(cues[1].start_seconds, 2.0));
        assert!(approx(cues[1].end_seconds, 4.25));
        assert_eq!(cues[1].text, "how are you");

        assert_eq!(cues[2].index, 3);
        assert!(approx(cues[2].start_seconds, 4.25));
        assert!(approx(cues[2].end_seconds, 5.0));
        assert_eq!(cues[2].text, "today");
    }

    #[test]
    fn words_survive_resegmentation_in_order() {
        let segments = vec![
            seg(0.0, 3.1, "the quick brown fox jumps over the lazy dog"),
            seg(3.5, 4.0, "again"),
            seg(4.0, 9.7, "a  b\tc d e f g h i j k l m"),
        ];
        for words_per_cue in 1..=5 {
            let cues = segment(&segments, words_per_cue).unwrap();
            let original: Vec<&str> = segments.iter().flat_map(|s| s.words()).collect();
            let rebuilt: Vec<String> = cues
                .iter()
                .flat_map(|c| c.text.split_whitespace().map(str::to_string))
                .collect();
            assert_eq!(rebuilt, original, "words_per_cue={words_per_cue}");
            assert!(cues.iter().all(|c| c.text.split_whitespace().count() <= words_per_cue));
        }
    }

    #[test]
    fn cues_partition_each_segment_without_gaps() {
        let s = seg(1.3, 7.9, "one two three four five six seven eight nine ten eleven");
        for words_per_cue in 1..=4 {
            let cues = segment(std::slice::from_ref(&s), words_per_cue).unwrap();
            assert_eq!(cues.len(), 11_usize.div_ceil(words_per_cue));
            assert!(approx(cues[0].start_seconds, s.start_seconds));
            assert_eq!(cues.last().unwrap().end_seconds, s.end_seconds);
            for pair in cues.windows(2) {
                assert!(approx(pair[0].end_seconds, pair[1].start_seconds));
                assert!(pair[0].start_seconds < pair[0].end_seconds);
            }
        }
    }

    #[test]
    fn timing_is_proportional_to_word_count() {
        // 5 words over 10s: cues of 3 and 2 words → 6s and 4s.
        let cues = segment(&[seg(0.0, 10.0, "a b c d e")], 3).unwrap();
        assert!(approx(cues[0].duration_seconds(), 6.0));
        assert!(approx(cues[1].duration_seconds(), 4.0));
    }

    #[test]
    fn short_segment_yields_single_cue() {
        let cues = segment(&[seg(4.0, 4.5, "hi")], 3).unwrap();
        assert_eq!(cues.len(), 1);
        assert!(approx(cues[0].start_seconds, 4.0));
        assert!(approx(cues[0].end_seconds, 4.5));
        assert_eq!(cues[0].text, "hi");
    }

    #[test]
    fn index_keeps_counting_across_segments() {
        let cues = segment(
            &[seg(0.0, 1.0, "a b c d"), seg(2.0, 3.0, "e f"), seg(3.0, 4.0, "g h i j k l m")],
            3,
        )
        .unwrap();
        let indices: Vec<usize> = cues.iter().map(|c| c.index).collect();
        assert_eq!(indices, (1..=cues.len()).collect::<Vec<_>>());
        assert_eq!(cues.len(), 2 + 1 + 3);
    }

    #[test]
    fn blank_segments_are_skipped() {
        let cues = segment(&[seg(0.0, 1.0, "   "), seg(1.0, 2.0, "word")], 3).unwrap();
        assert_eq!(cues.len(), 1);
        assert_eq!(cues[0].index, 1);
        assert_eq!(cues[0].text, "word");
    }

    #[test]
    fn empty_input_yields_no_cues() {
        assert!(segment(&[], 3).unwrap().is_empty());
    }

    #[test]
    fn gaps_between_segments_are_kept() {
        let cues = segment(&[seg(0.0, 1.0, "a"), seg(3.0, 4.0, "b")], 3).unwrap();
        assert!(approx(cues[0].end_seconds, 1.0));
        assert!(approx(cues[1].start_seconds, 3.0));
    }

    #[test]
    fn rejects_inverted_or_empty_interval() {
        let err = segment(&[seg(0.0, 1.0, "ok"), seg(2.0, 1.5, "bad")], 3).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSegment { index: 1, .. }));

        let err = segment(&[seg(2.0, 2.0, "zero")], 3).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSegment { index: 0, .. }));
    }

    #[test]
    fn rejects_negative_and_non_finite_times() {
        assert!(segment(&[seg(-0.5, 1.0, "a")], 3).is_err());
        assert!(segment(&[seg(0.0, f64::INFINITY, "a")], 3).is_err());
        assert!(segment(&[seg(f64::NAN, 1.0, "a")], 3).is_err());
    }

    #[test]
    fn rejects_overlapping_segments() {
        let err = segment(&[seg(0.0, 2.0, "a b"), seg(1.5, 3.0, "c")], 3).unwrap_err();
        assert!(matches!(err, CoreError::InvalidSegment { index: 1, .. }));
    }

    #[test]
    fn rejects_zero_words_per_cue() {
        assert!(matches!(
            segment(&[seg(0.0, 1.0, "a")], 0),
            Err(CoreError::InvalidOperation(_))
        ));
    }
}
