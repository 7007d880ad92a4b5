use serde::{Deserialize, Serialize};

use super::Token;

/// Provider-neutral transcription output, already normalized to word timings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscriptionResult {
    pub words: Vec<TranscribedWord>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Kind of entry reported by the recognizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WordKind {
    #[default]
    Word,
    Spacing,
    AudioEvent,
}

/// A single recognized word
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscribedWord {
    pub text: String,
    /// Start timestamp in seconds
    pub start: f64,
    /// End timestamp in seconds
    pub end: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default, rename = "type")]
    pub kind: WordKind,
}

impl TranscriptionResult {
    /// Token stream for the segmenter; audio events are not subtitle text
    pub fn tokens(&self) -> Vec<Token> {
        self.words
            .iter()
            .filter(|w| matches!(w.kind, WordKind::Word | WordKind::Spacing))
            .map(|w| Token {
                text: w.text.clone(),
                start: w.start,
                end: w.end,
                confidence: w.confidence,
            })
            .collect()
    }
}
