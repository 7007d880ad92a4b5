use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::models::{Cue, TimingRange};

use super::{is_mistimed_line, MistimingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Backward,
    Forward,
}

/// Positions (0-based) of cues that belong to a mistimed block
///
/// 1. Collect line-level hits and fill single-cue holes between them
/// 2. Runs of at least `min_segment_lines` are grown backward (up to
///    `backtrace_limit`) and forward (up to `foretrace_limit`) until a cue
///    whose duration, or the silence between it and the block, exceeds
///    `min_delay_sec`; a search that runs out of budget adds nothing
/// 3. Runs at most `max_gap_lines` apart are merged across the gap
pub fn find_mistimed_lines(cues: &[Cue], config: &MistimingConfig) -> BTreeSet<usize> {
    let mut positions: BTreeSet<usize> = cues
        .iter()
        .enumerate()
        .filter(|(_, cue)| is_mistimed_line(cue, config))
        .map(|(i, _)| i)
        .collect();

    debug!(
        "{} cue(s) with implausible timing (threshold {}s)",
        positions.len(),
        config.mistimed_line_threshold_sec
    );
    if positions.is_empty() {
        return positions;
    }

    fill_single_gaps(&mut positions);

    let mut groups = consecutive_runs(&positions, config.min_segment_lines);
    if groups.is_empty() {
        return positions;
    }

    for group in groups.iter_mut() {
        let backward = group.0.checked_sub(1).map_or_else(Vec::new, |from| {
            expand_group(cues, from, Direction::Backward, config.backtrace_limit, config.min_delay_sec)
        });
        if let Some(&first) = backward.iter().min() {
            debug!("Extending block {}-{} backward to cue {}", group.0 + 1, group.1 + 1, first + 1);
            group.0 = first;
            positions.extend(backward.iter().copied());
        }

        let forward = expand_group(
            cues,
            group.1 + 1,
            Direction::Forward,
            config.foretrace_limit,
            config.min_delay_sec,
        );
        if let Some(&last) = forward.iter().max() {
            debug!("Extending block {}-{} forward to cue {}", group.0 + 1, group.1 + 1, last + 1);
            group.1 = last;
            positions.extend(forward.iter().copied());
        }

        if backward.is_empty() && forward.is_empty() {
            warn!("Could not find a boundary for block {}-{}", group.0 + 1, group.1 + 1);
        }
    }

    merge_nearby_groups(&mut positions, groups, config.max_gap_lines);
    positions
}

/// Segment-level detector: blocks worth a re-transcription pass
///
/// Returns ranges of at least `min_segment_lines` cues, ascending and
/// non-overlapping. Isolated mistimed lines are left to the line-level flag.
pub fn find_mistimed_segments(cues: &[Cue], config: &MistimingConfig) -> Vec<TimingRange> {
    let positions = find_mistimed_lines(cues, config);
    let ranges: Vec<TimingRange> = consecutive_runs(&positions, config.min_segment_lines.max(1))
        .into_iter()
        .map(|(first, last)| TimingRange::from_positions(first, last))
        .collect();

    if ranges.is_empty() {
        debug!("No mistimed segments found");
    } else {
        info!(
            "Found {} mistimed segment(s) of {}+ cues",
            ranges.len(),
            config.min_segment_lines
        );
        for range in &ranges {
            let first = &cues[*range.positions().start()];
            let last = &cues[*range.positions().end()];
            info!(
                "  Cues {}: {:.2}s to {:.2}s ({} cues)",
                range,
                first.start,
                last.end,
                range.len()
            );
        }
    }

    ranges
}

/// Widen each range by one cue on each side, merging ranges that then meet
///
/// Gives a re-transcription pass some audio context around the block.
pub fn pad_ranges(ranges: &[TimingRange], cue_count: usize) -> Vec<TimingRange> {
    let mut padded: Vec<TimingRange> = ranges
        .iter()
        .filter(|r| r.end_index() <= cue_count)
        .map(|r| {
            let positions = r.positions();
            TimingRange::from_positions(
                positions.start().saturating_sub(1),
                (positions.end() + 1).min(cue_count - 1),
            )
        })
        .collect();
    padded.sort();

    let mut merged: Vec<TimingRange> = Vec::with_capacity(padded.len());
    for range in padded {
        match merged.last_mut() {
            Some(previous) if previous.overlaps_or_touches(&range) => {
                *previous = previous.union(&range);
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Add the cue between two hits that are one cue apart
fn fill_single_gaps(positions: &mut BTreeSet<usize>) {
    let sorted: Vec<usize> = positions.iter().copied().collect();
    for pair in sorted.windows(2) {
        if pair[1] - pair[0] == 2 {
            positions.insert(pair[0] + 1);
        }
    }
}

/// Runs of consecutive positions with at least `min_len` members
fn consecutive_runs(positions: &BTreeSet<usize>, min_len: usize) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut current: Option<(usize, usize)> = None;

    for &position in positions {
        current = match current {
            Some((first, last)) if position == last + 1 => Some((first, position)),
            Some(run) => {
                if run.1 - run.0 + 1 >= min_len {
                    runs.push(run);
                }
                Some((position, position))
            }
            None => Some((position, position)),
        };
    }
    if let Some(run) = current {
        if run.1 - run.0 + 1 >= min_len {
            runs.push(run);
        }
    }

    runs
}

/// Walk away from a block until a cue marks its boundary
fn expand_group(
    cues: &[Cue],
    from: usize,
    direction: Direction,
    limit: usize,
    min_delay_sec: f64,
) -> Vec<usize> {
    let mut added = Vec::new();
    let mut position = Some(from).filter(|&p| p < cues.len());
    let mut count = 0;

    while let Some(p) = position {
        if count >= limit {
            break;
        }
        added.push(p);
        if is_block_boundary(cues, p, direction, min_delay_sec) {
            break;
        }
        position = match direction {
            Direction::Backward => p.checked_sub(1),
            Direction::Forward => Some(p + 1).filter(|&next| next < cues.len()),
        };
        count += 1;
    }

    if count >= limit {
        Vec::new()
    } else {
        added
    }
}

/// A long cue absorbed the block's missing time, or silence separates it
fn is_block_boundary(cues: &[Cue], position: usize, direction: Direction, min_delay_sec: f64) -> bool {
    let cue = &cues[position];
    if cue.duration() > min_delay_sec {
        return true;
    }
    let silence = match direction {
        Direction::Backward => cues.get(position + 1).map(|next| next.start - cue.end),
        Direction::Forward => position
            .checked_sub(1)
            .map(|prev| cue.start - cues[prev].end),
    };
    silence.is_some_and(|gap| gap > min_delay_sec)
}

/// Join groups separated by at most `max_gap` cues
fn merge_nearby_groups(
    positions: &mut BTreeSet<usize>,
    mut groups: Vec<(usize, usize)>,
    max_gap: usize,
) {
    groups.sort();
    let mut i = 0;
    while i + 1 < groups.len() {
        let (first, last) = groups[i];
        let (next_first, next_last) = groups[i + 1];

        if next_first <= last + max_gap + 1 {
            let merged = (first, last.max(next_last));
            debug!(
                "Merging blocks {}-{} and {}-{}",
                first + 1,
                last + 1,
                next_first + 1,
                next_last + 1
            );
            positions.extend(merged.0..=merged.1);
            groups[i] = merged;
            groups.remove(i + 1);
        } else {
            i += 1;
        }
    }
}
