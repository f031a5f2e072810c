//! Sliding-window text chunker.
//!
//! Splits document text into overlapping passages sized for retrieval and
//! prompt budgets. A window of `max_chunk_chars` advances by
//! `max_chunk_chars − overlap_chars`; within the last 10% of each window the
//! splitter prefers a sentence or line boundary over a mid-sentence cut,
//! falling back to a hard cut when none is found. The overlap exists so a
//! fact spanning a window edge is still retrievable whole in at least one
//! chunk.
//!
//! Offsets are measured in chars (not bytes) into the source text, so they
//! form a stable citation locator regardless of encoding width.
//!
//! # Guarantees
//!
//! - Empty input yields an empty sequence (callers treat a zero-chunk
//!   document as an ingestion failure).
//! - Text shorter than the window yields exactly one span covering it.
//! - Span `[char_start, char_end)` ranges cover the text contiguously:
//!   each span starts at or before the previous span's end.
//! - Splitting is deterministic for identical input and configuration.

/// One produced passage with its location in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkSpan {
    pub text: String,
    /// Start offset in chars (inclusive).
    pub char_start: usize,
    /// End offset in chars (exclusive).
    pub char_end: usize,
}

/// Split `raw_text` into overlapping spans.
///
/// `overlap_chars` is clamped below `max_chunk_chars`; the config layer
/// rejects such values before they get here.
pub fn split(raw_text: &str, max_chunk_chars: usize, overlap_chars: usize) -> Vec<ChunkSpan> {
    let chars: Vec<char> = raw_text.chars().collect();
    let n = chars.len();
    if n == 0 || max_chunk_chars == 0 {
        return Vec::new();
    }
    let overlap = overlap_chars.min(max_chunk_chars.saturating_sub(1));

    // char offset -> byte offset, with a sentinel for the end
    let mut byte_pos: Vec<usize> = Vec::with_capacity(n + 1);
    byte_pos.extend(raw_text.char_indices().map(|(b, _)| b));
    byte_pos.push(raw_text.len());

    let mut spans = Vec::new();
    let mut start = 0usize;

    loop {
        let hard_end = (start + max_chunk_chars).min(n);
        let end = if hard_end < n {
            find_break(&chars, start, hard_end, max_chunk_chars)
        } else {
            hard_end
        };

        spans.push(ChunkSpan {
            text: raw_text[byte_pos[start]..byte_pos[end]].to_string(),
            char_start: start,
            char_end: end,
        });

        if end >= n {
            break;
        }
        // Step back by the overlap, but always make progress.
        start = end.saturating_sub(overlap).max(start + 1);
    }

    spans
}

/// Pick a cut position within the lookback window `[hard_end − 10%,
/// hard_end)`, preferring the latest sentence or line boundary. Returns
/// `hard_end` when the window holds no boundary.
fn find_break(chars: &[char], start: usize, hard_end: usize, max_chunk_chars: usize) -> usize {
    let lookback = (max_chunk_chars / 10).max(1);
    let floor = hard_end.saturating_sub(lookback).max(start + 1);

    for cut in (floor..hard_end).rev() {
        let prev = chars[cut - 1];
        if prev == '\n' {
            return cut;
        }
        if matches!(prev, '.' | '!' | '?') && chars[cut].is_whitespace() {
            return cut;
        }
    }
    hard_end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage_ok(spans: &[ChunkSpan], total_chars: usize, overlap: usize) {
        assert_eq!(spans[0].char_start, 0);
        assert_eq!(spans.last().unwrap().char_end, total_chars);
        for pair in spans.windows(2) {
            // no gap, bounded overlap, forward progress
            assert!(pair[1].char_start <= pair[0].char_end);
            assert!(pair[0].char_end - pair[1].char_start <= overlap);
            assert!(pair[1].char_start > pair[0].char_start);
        }
    }

    #[test]
    fn empty_input_yields_no_spans() {
        assert!(split("", 100, 20).is_empty());
    }

    #[test]
    fn short_text_yields_single_span() {
        let spans = split("Hello, world!", 100, 20);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].char_start, 0);
        assert_eq!(spans[0].char_end, 13);
        assert_eq!(spans[0].text, "Hello, world!");
    }

    #[test]
    fn long_text_covers_without_gaps() {
        let text = "word ".repeat(200); // 1000 chars, no sentence boundaries
        let spans = split(&text, 120, 30);
        assert!(spans.len() > 1);
        coverage_ok(&spans, 1000, 30);
    }

    #[test]
    fn hard_cut_steps_by_window_minus_overlap() {
        let text = "x".repeat(500);
        let spans = split(&text, 100, 25);
        assert_eq!(spans[0].char_end, 100);
        assert_eq!(spans[1].char_start, 75);
        coverage_ok(&spans, 500, 25);
    }

    #[test]
    fn prefers_sentence_boundary_in_lookback_window() {
        // A period lands inside the last 10% of the 120-char window.
        let mut text = "a".repeat(110);
        text.push_str(". ");
        text.push_str(&"b".repeat(200));
        let spans = split(&text, 120, 20);
        assert_eq!(spans[0].char_end, 111, "should cut after the period");
        assert!(spans[0].text.ends_with('.'));
    }

    #[test]
    fn prefers_line_boundary_in_lookback_window() {
        let mut text = "a".repeat(115);
        text.push('\n');
        text.push_str(&"b".repeat(200));
        let spans = split(&text, 120, 20);
        assert_eq!(spans[0].char_end, 116);
    }

    #[test]
    fn boundary_outside_lookback_is_ignored() {
        // Period at char 10, far before the lookback window: hard cut wins.
        let mut text = "a".repeat(9);
        text.push_str(". ");
        text.push_str(&"b".repeat(300));
        let spans = split(&text, 100, 10);
        assert_eq!(spans[0].char_end, 100);
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "Überraschung für München. ".repeat(40);
        let total_chars = text.chars().count();
        let spans = split(&text, 80, 16);
        coverage_ok(&spans, total_chars, 16);
        for s in &spans {
            assert!(!s.text.is_empty());
        }
    }

    #[test]
    fn deterministic_for_identical_input() {
        let text = "Sentence one. Sentence two goes here. ".repeat(30);
        let a = split(&text, 150, 30);
        let b = split(&text, 150, 30);
        assert_eq!(a, b);
    }

    #[test]
    fn overlap_clamped_below_window() {
        let text = "y".repeat(50);
        let spans = split(&text, 10, 10); // degenerate overlap, still terminates
        assert_eq!(spans.last().unwrap().char_end, 50);
        for pair in spans.windows(2) {
            assert!(pair[1].char_start > pair[0].char_start);
        }
    }
}
