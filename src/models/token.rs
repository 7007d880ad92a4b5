use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A time-stamped unit of recognized text (a word, a character, or spacing)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The recognized text, never rewritten by the engine
    pub text: String,
    /// Start timestamp in seconds
    pub start: f64,
    /// End timestamp in seconds
    pub end: f64,
    /// Recognition confidence (0-1), when the provider reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Token {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Duration of this token in seconds
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Check the ordering invariants the timing arithmetic relies on.
///
/// Times must be finite, `end >= start`, and starts non-decreasing.
pub fn validate_tokens(tokens: &[Token]) -> Result<(), EngineError> {
    let mut previous_start = f64::NEG_INFINITY;

    for (position, token) in tokens.iter().enumerate() {
        if !token.start.is_finite() || !token.end.is_finite() {
            return Err(EngineError::invalid_token(position, "non-finite timestamp"));
        }
        if token.end < token.start {
            return Err(EngineError::invalid_token(
                position,
                format!(
                    "negative duration ({:.3}s ends before {:.3}s)",
                    token.end, token.start
                ),
            ));
        }
        if token.start < previous_start {
            return Err(EngineError::invalid_token(
                position,
                format!(
                    "starts at {:.3}s, before the previous token at {:.3}s",
                    token.start, previous_start
                ),
            ));
        }
        if let Some(confidence) = token.confidence {
            if !(0.0..=1.0).contains(&confidence) {
                return Err(EngineError::invalid_token(
                    position,
                    format!("confidence {} outside [0, 1]", confidence),
                ));
            }
        }
        previous_start = token.start;
    }

    Ok(())
}

/// Move clip-relative tokens into document time
pub fn shift_tokens(tokens: &[Token], offset: f64) -> Vec<Token> {
    tokens
        .iter()
        .map(|t| Token {
            start: t.start + offset,
            end: t.end + offset,
            ..t.clone()
        })
        .collect()
}
