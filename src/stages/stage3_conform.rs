use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{Cue, CueFlag, TimingRange};

const EPSILON: f64 = 1e-6;

/// Configuration for Stage 3 timing conformance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaddingConfig {
    /// Most a cue's end may move later (seconds)
    pub max_lead_out_sec: f64,
    /// Most a cue's start may move earlier (seconds)
    pub max_lead_in_sec: f64,
    /// Reading speed ceiling, characters per second
    pub max_cps: f64,
    /// Minimum display time for any cue with text
    pub min_sec: f64,
}

impl Default for PaddingConfig {
    fn default() -> Self {
        Self {
            max_lead_out_sec: 1.0,
            max_lead_in_sec: 0.25,
            max_cps: 20.0,
            min_sec: 1.0,
        }
    }
}

/// Result of Stage 3 conformance
#[derive(Debug, Clone, Default)]
pub struct ConformResult {
    pub cues: Vec<Cue>,
    /// Cues whose start or end moved
    pub extended: usize,
    /// Cues still short after using all available space
    pub still_short: usize,
}

/// Execute Stage 3: pad cues to a readable duration
///
/// For each cue shorter than `max(chars / max_cps, min_sec)`:
/// 1. Move the end later by up to `max_lead_out_sec`, stopping at the
///    midpoint of the gap to the next cue
/// 2. Move the start earlier by up to `max_lead_in_sec`
/// 3. Still short: take the rest of the gap up to the next cue's start
/// 4. Still short: take the rest of the gap back to the previous cue's end
///
/// Lead limits give way to the duration target, which gives way to
/// no-overlap. Text, cue count and order never change, and a second run is a
/// no-op.
pub fn conform_timing(
    cues: &[Cue],
    config: &PaddingConfig,
    restrict: Option<TimingRange>,
) -> ConformResult {
    let mut out = cues.to_vec();
    let mut extended = 0;
    let mut still_short = 0;

    let positions = match restrict {
        Some(range) if range.end_index() <= out.len() => range.positions(),
        Some(range) => {
            debug!("Range {} exceeds {} cues, clamping", range, out.len());
            *range.positions().start()..=out.len().saturating_sub(1)
        }
        None => 0..=out.len().saturating_sub(1),
    };

    for i in positions {
        let Some(cue) = out.get(i) else {
            break;
        };
        let chars = cue.char_count();
        if chars == 0 {
            continue;
        }

        let target = target_duration(chars, config);
        if cue.end - cue.start >= target - EPSILON {
            continue;
        }

        let previous_end = i.checked_sub(1).map_or(0.0, |p| out[p].end);
        let next_start = out.get(i + 1).map(|c| c.start);
        let (start, end) = pad(cue.start, cue.end, target, previous_end, next_start, config);

        let cue = &mut out[i];
        if start < cue.start || end > cue.end {
            debug!(
                "Cue {}: {:.3}-{:.3} -> {:.3}-{:.3} (target {:.3}s)",
                cue.index, cue.start, cue.end, start, end, target
            );
            cue.start = start;
            cue.end = end;
            cue.flags.insert(CueFlag::Padded);
            extended += 1;
        }
        if end - start < target - EPSILON {
            still_short += 1;
        }
    }

    info!(
        "Stage 3: extended {} cue(s) to {} cps / {}s minimum ({} still short)",
        extended, config.max_cps, config.min_sec, still_short
    );

    ConformResult {
        cues: out,
        extended,
        still_short,
    }
}

fn target_duration(chars: usize, config: &PaddingConfig) -> f64 {
    let by_cps = if config.max_cps > 0.0 {
        chars as f64 / config.max_cps
    } else {
        0.0
    };
    by_cps.max(config.min_sec)
}

fn pad(
    start: f64,
    end: f64,
    target: f64,
    previous_end: f64,
    next_start: Option<f64>,
    config: &PaddingConfig,
) -> (f64, f64) {
    // Starts never move later, ends never move earlier
    let floor = previous_end.min(start);
    let ceiling = next_start.map_or(f64::INFINITY, |n| n.max(end));

    let midpoint = next_start.map_or(f64::INFINITY, |n| end + ((n - end) / 2.0).max(0.0));
    let lead_out_limit = (end + config.max_lead_out_sec).min(midpoint);
    let mut new_end = (start + target).min(lead_out_limit).max(end);

    let mut new_start = start;
    if new_end - new_start < target {
        let needed = target - (new_end - new_start);
        new_start = (start - needed.min(config.max_lead_in_sec)).max(floor);
    }

    if new_end - new_start < target {
        new_end = (new_start + target).min(ceiling).max(new_end);
    }

    if new_end - new_start < target {
        new_start = (new_end - target).max(floor).min(new_start);
    }

    (new_start, new_end)
}
