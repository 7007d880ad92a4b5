pub mod mistimed_lines;
pub mod mistimed_segments;

pub use mistimed_lines::*;
pub use mistimed_segments::*;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Cue, CueFlag, TimingRange};

/// Thresholds for both mistiming detectors
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MistimingConfig {
    /// A cue this short (seconds) is always suspect
    pub mistimed_line_threshold_sec: f64,
    /// Fastest plausible speech rate, in characters per second
    pub max_speech_cps: f64,
    /// Smallest run of suspect cues reported as a segment
    pub min_segment_lines: usize,
    /// How many cues to search backward for a block boundary
    pub backtrace_limit: usize,
    /// How many cues to search forward for a block boundary
    pub foretrace_limit: usize,
    /// Duration or silence (seconds) that marks a block boundary
    pub min_delay_sec: f64,
    /// Blocks separated by at most this many cues are merged
    pub max_gap_lines: usize,
}

impl Default for MistimingConfig {
    fn default() -> Self {
        Self {
            mistimed_line_threshold_sec: 0.2,
            max_speech_cps: 30.0,
            min_segment_lines: 4,
            backtrace_limit: 20,
            foretrace_limit: 5,
            min_delay_sec: 10.0,
            max_gap_lines: 4,
        }
    }
}

/// Result of running both detectors over a cue list
#[derive(Debug, Clone, Default, Serialize)]
pub struct MistimingReport {
    /// Number of cues with the `mistimed_line` flag
    pub mistimed_lines: usize,
    /// Blocks proposed for re-transcription
    pub ranges: Vec<TimingRange>,
}

/// Run both detectors and record the results as cue flags
///
/// Segment flags from a previous run are cleared first, so annotating twice
/// gives the same result. Text and timing are never touched.
pub fn annotate_mistiming(cues: &mut [Cue], config: &MistimingConfig) -> MistimingReport {
    let mistimed_lines = flag_mistimed_lines(cues, config);
    let ranges = find_mistimed_segments(cues, config);

    for cue in cues.iter_mut() {
        cue.flags.remove(CueFlag::MistimedSegmentStart);
        cue.flags.remove(CueFlag::MistimedSegmentEnd);
    }
    for range in &ranges {
        let positions = range.positions();
        cues[*positions.start()]
            .flags
            .insert(CueFlag::MistimedSegmentStart);
        cues[*positions.end()]
            .flags
            .insert(CueFlag::MistimedSegmentEnd);
    }

    info!(
        "Mistiming: {} line(s) flagged, {} segment(s) proposed",
        mistimed_lines,
        ranges.len()
    );
    for cue in cues.iter().filter(|c| c.has_flag(CueFlag::MistimedLine)) {
        debug!(
            "  #{} [{:.2}s, {} chars] {}",
            cue.index,
            cue.duration(),
            cue.char_count(),
            preview(&cue.text)
        );
    }

    MistimingReport {
        mistimed_lines,
        ranges,
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > 40 {
        format!("{}...", text.chars().take(40).collect::<String>())
    } else {
        text.to_string()
    }
}
