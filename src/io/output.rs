use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Cue, CueFlag, TimingRange};

/// Cue list plus what the pipeline found out about it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CueDocument {
    pub cues: Vec<Cue>,
    /// Blocks proposed for re-transcription
    #[serde(default)]
    pub ranges: Vec<TimingRange>,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub total_cues: usize,
    /// End of the last cue, in seconds
    pub duration_sec: f64,
    pub mistimed_lines: usize,
    pub low_confidence_cues: usize,
    pub padded_cues: usize,
    /// Source transcription, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl CueDocument {
    /// Build a document and fill its metadata from the cues
    pub fn new(cues: Vec<Cue>, ranges: Vec<TimingRange>, source: Option<String>) -> Self {
        let mut document = Self {
            cues,
            ranges,
            metadata: DocumentMetadata {
                source,
                ..Default::default()
            },
        };
        document.refresh_metadata();
        document
    }

    /// Recount the metadata after the cues changed
    pub fn refresh_metadata(&mut self) {
        let count = |flag: CueFlag| self.cues.iter().filter(|c| c.has_flag(flag)).count();
        self.metadata.total_cues = self.cues.len();
        self.metadata.duration_sec = self.cues.iter().map(|c| c.end).fold(0.0, f64::max);
        self.metadata.mistimed_lines = count(CueFlag::MistimedLine);
        self.metadata.low_confidence_cues = count(CueFlag::LowConfidence);
        self.metadata.padded_cues = count(CueFlag::Padded);
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }

    /// One line per cue: `[MM:SS.mmm --> MM:SS.mmm] text`, flags appended
    pub fn format_text(&self) -> String {
        let mut output = String::new();
        for cue in &self.cues {
            output.push_str(&format!(
                "{:>4} [{} --> {}] {}",
                cue.index,
                format_timestamp(cue.start),
                format_timestamp(cue.end),
                cue.text.replace('\n', " / ")
            ));
            if !cue.flags.is_empty() {
                let tags: Vec<String> = cue
                    .flags
                    .iter()
                    .map(|f| serde_json::to_value(f).ok().and_then(|v| v.as_str().map(String::from)))
                    .map(|tag| tag.unwrap_or_default())
                    .collect();
                output.push_str(&format!("  ({})", tags.join(", ")));
            }
            output.push('\n');
        }
        output
    }

    pub fn write_text(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        write!(file, "{}", self.format_text())?;
        Ok(())
    }
}

/// Format seconds as MM:SS.mmm
pub fn format_timestamp(seconds: f64) -> String {
    let ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let minutes = ms / 60_000;
    let secs = (ms / 1000) % 60;
    let millis = ms % 1000;
    format!("{:02}:{:02}.{:03}", minutes, secs, millis)
}
