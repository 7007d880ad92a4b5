use thiserror::Error;

use crate::models::TimingRange;

/// Errors surfaced by the cue engine.
///
/// An empty token stream and an unbreakable line are not errors: the first
/// yields an empty cue list, the second a single over-long cue.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid token at position {position}: {reason}")]
    InvalidToken { position: usize, reason: String },
    #[error(
        "replacement tokens span {token_start:.3}s-{token_end:.3}s but range {range} needs {span_start:.3}s-{span_end:.3}s"
    )]
    RangeMismatch {
        range: TimingRange,
        span_start: f64,
        span_end: f64,
        token_start: f64,
        token_end: f64,
    },
    #[error("range {range} is outside the document ({cue_count} cues)")]
    RangeOutOfBounds { range: TimingRange, cue_count: usize },
    #[error("invalid range: {0}")]
    InvalidRange(String),
}

impl EngineError {
    pub(crate) fn invalid_token(position: usize, reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            position,
            reason: reason.into(),
        }
    }
}
