use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::models::{renumber, validate_tokens, Cue, TimingRange, Token};

use super::stage0_segment::{segment_tokens, LineBreakOracle, SegmenterConfig};

/// Configuration for Stage 1 merging
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Slack (seconds) allowed when checking that fresh tokens cover a range
    pub coverage_tolerance_sec: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            coverage_tolerance_sec: 1.0,
        }
    }
}

/// Fresh tokens for one block of cues
#[derive(Debug, Clone)]
pub struct Retranscription {
    pub range: TimingRange,
    pub tokens: Vec<Token>,
}

/// Result of Stage 1 merging
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub cues: Vec<Cue>,
    /// Cues removed from the replaced ranges
    pub cues_replaced: usize,
    /// Cues inserted in their place
    pub cues_inserted: usize,
    /// Replacement boundaries moved to abut a neighbour
    pub boundaries_clamped: usize,
}

/// Execute Stage 1: splice a re-transcribed block back into the cue list
///
/// Cues inside `range` are replaced by segmenting the fresh tokens that fall
/// within the range's time span. Cues outside keep their text and timing;
/// indices are renumbered afterwards.
pub fn merge_retranscription(
    cues: &[Cue],
    range: TimingRange,
    tokens: &[Token],
    segmenter: &SegmenterConfig,
    config: &MergeConfig,
    oracle: Option<&dyn LineBreakOracle>,
) -> Result<MergeResult, EngineError> {
    if range.end_index() > cues.len() {
        return Err(EngineError::RangeOutOfBounds {
            range,
            cue_count: cues.len(),
        });
    }
    validate_tokens(tokens)?;

    let positions = range.positions();
    let (first, last) = (*positions.start(), *positions.end());
    let span_start = cues[first].start;
    let span_end = cues[first..=last]
        .iter()
        .map(|c| c.end)
        .fold(cues[last].end, f64::max);

    check_coverage(range, span_start, span_end, tokens, config.coverage_tolerance_sec)?;

    let in_span: Vec<Token> = tokens
        .iter()
        .filter(|t| overlaps_span(t, span_start, span_end))
        .cloned()
        .collect();
    debug!(
        "Range {}: {} of {} fresh tokens fall within {:.2}s-{:.2}s",
        range,
        in_span.len(),
        tokens.len(),
        span_start,
        span_end
    );

    let mut replacement = segment_tokens(&in_span, segmenter, oracle)?.cues;
    let predecessor_end = first.checked_sub(1).map(|p| cues[p].end);
    let successor_start = cues.get(last + 1).map(|c| c.start);
    let boundaries_clamped = clamp_to_neighbours(&mut replacement, predecessor_end, successor_start);

    let cues_replaced = range.len();
    let cues_inserted = replacement.len();

    let mut merged = Vec::with_capacity(cues.len() - cues_replaced + cues_inserted);
    merged.extend_from_slice(&cues[..first]);
    merged.extend(replacement);
    merged.extend_from_slice(&cues[last + 1..]);
    renumber(&mut merged);

    info!(
        "Stage 1: range {} replaced {} cues with {} ({} boundary clamp(s))",
        range, cues_replaced, cues_inserted, boundaries_clamped
    );

    Ok(MergeResult {
        cues: merged,
        cues_replaced,
        cues_inserted,
        boundaries_clamped,
    })
}

/// Merge several re-transcribed blocks in one pass
///
/// Ranges refer to the input numbering and must not overlap. They are applied
/// from the last to the first so that earlier indices stay valid.
pub fn merge_retranscriptions(
    cues: &[Cue],
    retranscriptions: &[Retranscription],
    segmenter: &SegmenterConfig,
    config: &MergeConfig,
    oracle: Option<&dyn LineBreakOracle>,
) -> Result<MergeResult, EngineError> {
    let mut ordered: Vec<&Retranscription> = retranscriptions.iter().collect();
    ordered.sort_by(|a, b| b.range.start_index().cmp(&a.range.start_index()));

    for pair in ordered.windows(2) {
        if pair[1].range.end_index() >= pair[0].range.start_index() {
            return Err(EngineError::InvalidRange(format!(
                "ranges {} and {} overlap",
                pair[1].range, pair[0].range
            )));
        }
    }

    let mut total = MergeResult {
        cues: cues.to_vec(),
        ..Default::default()
    };
    for item in ordered {
        let step = merge_retranscription(
            &total.cues,
            item.range,
            &item.tokens,
            segmenter,
            config,
            oracle,
        )?;
        total.cues = step.cues;
        total.cues_replaced += step.cues_replaced;
        total.cues_inserted += step.cues_inserted;
        total.boundaries_clamped += step.boundaries_clamped;
    }

    Ok(total)
}

fn check_coverage(
    range: TimingRange,
    span_start: f64,
    span_end: f64,
    tokens: &[Token],
    tolerance: f64,
) -> Result<(), EngineError> {
    let token_start = tokens.first().map_or(f64::NAN, |t| t.start);
    let token_end = tokens.iter().map(|t| t.end).fold(f64::NAN, f64::max);

    let covered = !tokens.is_empty()
        && token_start <= span_start + tolerance
        && token_end >= span_end - tolerance;
    if covered {
        Ok(())
    } else {
        Err(EngineError::RangeMismatch {
            range,
            span_start,
            span_end,
            token_start,
            token_end,
        })
    }
}

fn overlaps_span(token: &Token, span_start: f64, span_end: f64) -> bool {
    if token.end <= token.start {
        token.start >= span_start && token.start <= span_end
    } else {
        token.end > span_start && token.start < span_end
    }
}

/// Keep the replacement inside the gap left by the removed cues
fn clamp_to_neighbours(
    replacement: &mut [Cue],
    predecessor_end: Option<f64>,
    successor_start: Option<f64>,
) -> usize {
    let mut clamped = 0;

    if let Some(mut lower) = predecessor_end {
        for cue in replacement.iter_mut() {
            if cue.start >= lower {
                break;
            }
            cue.start = lower;
            cue.end = cue.end.max(cue.start);
            lower = cue.end;
            clamped += 1;
        }
    }

    if let Some(mut upper) = successor_start {
        for cue in replacement.iter_mut().rev() {
            if cue.end <= upper {
                break;
            }
            cue.end = upper;
            cue.start = cue.start.min(cue.end);
            upper = cue.start;
            clamped += 1;
        }
    }

    clamped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn original_cues() -> Vec<Cue> {
        vec![
            Cue::new(1, "Before.", 0.0, 2.0),
            Cue::new(2, "garbled", 2.0, 2.1),
            Cue::new(3, "garbled", 2.1, 2.2),
            Cue::new(4, "long tail", 2.2, 8.0),
            Cue::new(5, "After.", 8.0, 10.0),
        ]
    }

    fn fresh_tokens() -> Vec<Token> {
        vec![
            Token::new("One", 2.0, 2.5),
            Token::new("sentence.", 2.5, 4.0),
            Token::new("Another", 4.5, 5.5),
            Token::new("one.", 5.5, 7.9),
        ]
    }

    #[test]
    fn test_merge_replaces_only_the_range() {
        let cues = original_cues();
        let range = TimingRange::new(2, 4).unwrap();
        let result = merge_retranscription(
            &cues,
            range,
            &fresh_tokens(),
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap();

        let texts: Vec<&str> = result.cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["Before.", "One sentence.", "Another one.", "After."]);
        assert_eq!(result.cues_replaced, 3);
        assert_eq!(result.cues_inserted, 2);

        // Cues outside the range are identical apart from their index
        assert_eq!(result.cues[0], cues[0]);
        let tail = &result.cues[3];
        let original_tail = &cues[4];
        assert_eq!(tail.text, original_tail.text);
        assert_eq!(tail.start.to_bits(), original_tail.start.to_bits());
        assert_eq!(tail.end.to_bits(), original_tail.end.to_bits());
        assert_eq!(tail.flags, original_tail.flags);

        // Renumbered contiguously
        let indices: Vec<usize> = result.cues.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_tokens_outside_span_are_ignored() {
        let cues = original_cues();
        let mut tokens = vec![Token::new("Before.", 0.0, 2.0)];
        tokens.extend(fresh_tokens());
        tokens.push(Token::new("After.", 8.0, 10.0));

        let result = merge_retranscription(
            &cues,
            TimingRange::new(2, 4).unwrap(),
            &tokens,
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap();

        assert_eq!(result.cues.len(), 4);
        assert_eq!(result.cues[1].text, "One sentence.");
    }

    #[test]
    fn test_uncovered_range_is_rejected() {
        let cues = original_cues();
        let short = vec![Token::new("One", 2.0, 2.5), Token::new("sentence.", 2.5, 4.0)];

        let err = merge_retranscription(
            &cues,
            TimingRange::new(2, 4).unwrap(),
            &short,
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::RangeMismatch { .. }));

        let err = merge_retranscription(
            &cues,
            TimingRange::new(2, 4).unwrap(),
            &[],
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::RangeMismatch { .. }));
    }

    #[test]
    fn test_out_of_bounds_range() {
        let err = merge_retranscription(
            &original_cues(),
            TimingRange::new(4, 6).unwrap(),
            &fresh_tokens(),
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::RangeOutOfBounds { cue_count: 5, .. }));
    }

    #[test]
    fn test_boundaries_clamped_to_neighbours() {
        let cues = vec![
            Cue::new(1, "Before.", 0.0, 2.2),
            Cue::new(2, "x", 2.0, 2.1),
            Cue::new(3, "y", 2.1, 3.0),
            Cue::new(4, "After.", 3.0, 5.0),
        ];
        // Fresh timing drifts into both neighbours
        let tokens = vec![Token::new("Fresh", 1.9, 2.4), Token::new("words.", 2.4, 3.3)];

        let result = merge_retranscription(
            &cues,
            TimingRange::new(2, 3).unwrap(),
            &tokens,
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap();

        assert_eq!(result.cues.len(), 3);
        let fresh = &result.cues[1];
        assert_eq!(fresh.text, "Fresh words.");
        assert_eq!(fresh.start, 2.2);
        assert_eq!(fresh.end, 3.0);
        assert_eq!(result.boundaries_clamped, 2);
        for pair in result.cues.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[test]
    fn test_merge_several_ranges() {
        let cues = vec![
            Cue::new(1, "a", 0.0, 0.1),
            Cue::new(2, "b", 0.1, 2.0),
            Cue::new(3, "Middle.", 2.0, 4.0),
            Cue::new(4, "c", 4.0, 4.1),
            Cue::new(5, "d", 4.1, 6.0),
        ];
        let retranscriptions = vec![
            Retranscription {
                range: TimingRange::new(1, 2).unwrap(),
                tokens: vec![
                    Token::new("First.", 0.0, 1.0),
                    Token::new("Second.", 1.0, 2.0),
                ],
            },
            Retranscription {
                range: TimingRange::new(4, 5).unwrap(),
                tokens: vec![Token::new("Last.", 4.0, 6.0)],
            },
        ];

        let result = merge_retranscriptions(
            &cues,
            &retranscriptions,
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap();

        let texts: Vec<&str> = result.cues.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["First.", "Second.", "Middle.", "Last."]);
        assert_eq!(result.cues_replaced, 4);
        assert_eq!(result.cues_inserted, 3);
        assert_eq!(result.cues.last().unwrap().index, 4);
    }

    #[test]
    fn test_overlapping_ranges_rejected() {
        let retranscriptions = vec![
            Retranscription {
                range: TimingRange::new(1, 3).unwrap(),
                tokens: fresh_tokens(),
            },
            Retranscription {
                range: TimingRange::new(3, 4).unwrap(),
                tokens: fresh_tokens(),
            },
        ];
        let err = merge_retranscriptions(
            &original_cues(),
            &retranscriptions,
            &SegmenterConfig::default(),
            &MergeConfig::default(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(_)));
    }
}
