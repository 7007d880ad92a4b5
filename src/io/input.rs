use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use super::output::CueDocument;
use crate::models::{Token, TranscriptionResult};

/// Read a word-timed transcription and return its token stream
pub fn parse_transcript_file(path: &Path) -> Result<Vec<Token>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    parse_transcript_json(&content).with_context(|| format!("In transcript file: {:?}", path))
}

/// Parse `{ "words": [...] }`, keeping only word and spacing entries
pub fn parse_transcript_json(json: &str) -> Result<Vec<Token>> {
    let result: TranscriptionResult =
        serde_json::from_str(json).context("Failed to parse transcription JSON")?;
    let tokens = result.tokens();
    debug!(
        "Read {} tokens from {} transcription entries (language: {})",
        tokens.len(),
        result.words.len(),
        result.language.as_deref().unwrap_or("unknown")
    );
    Ok(tokens)
}

/// Read a cue document previously written by [`CueDocument::write_json`]
pub fn load_cue_document(path: &Path) -> Result<CueDocument> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse cue document: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transcript_json() {
        let json = r#"{
            "language": "en",
            "words": [
                {"text": "hello", "start": 0.5, "end": 0.8, "confidence": 0.95},
                {"text": " ", "start": 0.8, "end": 0.9, "type": "spacing"},
                {"text": "(music)", "start": 0.9, "end": 3.0, "type": "audio_event"},
                {"text": "world.", "start": 3.0, "end": 3.4}
            ]
        }"#;

        let tokens = parse_transcript_json(json).unwrap();
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", " ", "world."]);
    }

    #[test]
    fn test_empty_transcript() {
        let tokens = parse_transcript_json(r#"{"words": []}"#).unwrap();
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_malformed_transcript() {
        assert!(parse_transcript_json(r#"{"segments": []}"#).is_err());
    }

    #[test]
    fn test_cue_document_with_bad_range_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cues.json");
        std::fs::write(
            &path,
            r#"{"cues": [{"index": 1, "text": "a", "start": 0.0, "end": 1.0}],
                "ranges": [{"start_index": 0, "end_index": 0}]}"#,
        )
        .unwrap();

        assert!(load_cue_document(&path).is_err());
    }
}
