use tracing::{debug, info};

use crate::heuristics::{find_mistimed_lines, MistimingConfig};
use crate::models::{renumber, Cue, TimingRange};

/// Result of Stage 2 repair
#[derive(Debug, Clone, Default)]
pub struct RepairResult {
    pub cues: Vec<Cue>,
    /// Runs whose time was shared out with the preceding cue
    pub runs_redistributed: usize,
    /// Runs at the start of the document folded into the following cue
    pub runs_folded: usize,
    /// Cues dropped because they were left without text
    pub cues_removed: usize,
}

/// Execute Stage 2: repair mistimed lines without new audio
///
/// Each run of mistimed cues shares the time from the preceding cue's start
/// to the run's end, in proportion to character count. A run with no
/// preceding cue is folded into the next cue instead. `restrict` limits the
/// repair to runs touching that range.
pub fn repair_mistimed_lines(
    cues: &[Cue],
    config: &MistimingConfig,
    separator: &str,
    restrict: Option<TimingRange>,
) -> RepairResult {
    let mut result = RepairResult {
        cues: cues.to_vec(),
        ..Default::default()
    };

    let positions = find_mistimed_lines(cues, config);
    let runs = runs_of(positions.into_iter());

    for (first, last) in runs {
        if let Some(range) = restrict {
            let positions = range.positions();
            if first > *positions.end() || last < *positions.start() {
                continue;
            }
        }

        match first.checked_sub(1) {
            Some(previous) => {
                if redistribute(&mut result.cues, previous, last) {
                    result.runs_redistributed += 1;
                }
            }
            None => {
                if fold_forward(&mut result.cues, first, last, separator) {
                    result.runs_folded += 1;
                }
            }
        }
    }

    let before = result.cues.len();
    result.cues = remove_empty(&result.cues, restrict);
    result.cues_removed = before - result.cues.len();

    info!(
        "Stage 2: {} run(s) redistributed, {} folded forward, {} empty cue(s) removed",
        result.runs_redistributed, result.runs_folded, result.cues_removed
    );

    result
}

/// Drop cues with no visible text, optionally only inside `restrict`
pub fn remove_empty(cues: &[Cue], restrict: Option<TimingRange>) -> Vec<Cue> {
    let mut kept: Vec<Cue> = cues
        .iter()
        .enumerate()
        .filter(|(i, cue)| {
            let in_scope = restrict.is_none_or(|r| r.contains(i + 1));
            !(in_scope && cue.text.trim().is_empty())
        })
        .map(|(_, cue)| cue.clone())
        .collect();

    if kept.len() < cues.len() {
        debug!("Removed {} empty cue(s)", cues.len() - kept.len());
    }
    renumber(&mut kept);
    kept
}

fn runs_of(positions: impl Iterator<Item = usize>) -> Vec<(usize, usize)> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    for position in positions {
        match runs.last_mut() {
            Some(run) if position == run.1 + 1 => run.1 = position,
            _ => runs.push((position, position)),
        }
    }
    runs
}

/// Share the span from `cues[previous].start` to `cues[last].end`
fn redistribute(cues: &mut [Cue], previous: usize, last: usize) -> bool {
    let span_start = cues[previous].start;
    let span_end = cues[last].end;
    let lengths: Vec<usize> = cues[previous..=last].iter().map(Cue::char_count).collect();
    let total_chars: usize = lengths.iter().sum();
    if total_chars == 0 || span_end <= span_start {
        return false;
    }

    let total = span_end - span_start;
    let mut cursor = span_start;
    let count = lengths.len();
    for (offset, chars) in lengths.into_iter().enumerate() {
        let cue = &mut cues[previous + offset];
        cue.start = cursor;
        cursor = if offset + 1 == count {
            span_end
        } else {
            cursor + total * chars as f64 / total_chars as f64
        };
        cue.end = cursor;
    }

    debug!(
        "Redistributed {:.2}s across cues {}-{}",
        total,
        previous + 1,
        last + 1
    );
    true
}

/// Prepend the run's text to the cue after it, which takes the run's start
fn fold_forward(cues: &mut [Cue], first: usize, last: usize, separator: &str) -> bool {
    let next = last + 1;
    if next >= cues.len() {
        return false;
    }

    let mut parts: Vec<String> = cues[first..=last]
        .iter_mut()
        .map(|c| std::mem::take(&mut c.text))
        .filter(|t| !t.trim().is_empty())
        .collect();
    parts.push(std::mem::take(&mut cues[next].text));

    cues[next].text = parts.join(separator);
    cues[next].start = cues[first].start;

    debug!("Folded cues {}-{} into cue {}", first + 1, last + 1, next + 1);
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redistribute_with_previous_cue() {
        // The first cue swallowed the time that belonged to the next two
        let cues = vec![
            Cue::new(1, "aaaa", 0.0, 7.8),
            Cue::new(2, "bb", 7.8, 7.9),
            Cue::new(3, "cc", 7.9, 8.0),
            Cue::new(4, "dddd", 9.0, 11.0),
        ];
        let result = repair_mistimed_lines(&cues, &MistimingConfig::default(), " ", None);

        assert_eq!(result.runs_redistributed, 1);
        let c = &result.cues;
        assert_eq!(c.len(), 4);
        assert!((c[0].end - 4.0).abs() < 1e-9);
        assert!((c[1].start - 4.0).abs() < 1e-9);
        assert!((c[1].end - 6.0).abs() < 1e-9);
        assert_eq!(c[2].end, 8.0);
        assert_eq!(c[3].start, 9.0);
        for pair in c.windows(2) {
            assert!(pair[0].end <= pair[1].start + 1e-9);
        }
    }

    #[test]
    fn test_leading_run_folds_forward() {
        let cues = vec![
            Cue::new(1, "Hi", 0.5, 0.55),
            Cue::new(2, "there", 0.55, 0.6),
            Cue::new(3, "friend.", 0.6, 2.0),
        ];
        let result = repair_mistimed_lines(&cues, &MistimingConfig::default(), " ", None);

        assert_eq!(result.runs_folded, 1);
        assert_eq!(result.cues_removed, 2);
        assert_eq!(result.cues.len(), 1);
        assert_eq!(result.cues[0].text, "Hi there friend.");
        assert_eq!(result.cues[0].start, 0.5);
        assert_eq!(result.cues[0].index, 1);
    }

    #[test]
    fn test_restrict_skips_runs_outside() {
        let cues = vec![
            Cue::new(1, "aaaa", 0.0, 2.0),
            Cue::new(2, "bb", 2.0, 2.05),
            Cue::new(3, "cccc", 3.0, 5.0),
            Cue::new(4, "cccc", 5.0, 7.0),
            Cue::new(5, "dd", 7.0, 7.05),
            Cue::new(6, "eeee", 8.0, 10.0),
        ];
        let restrict = TimingRange::new(5, 6).ok();
        let result = repair_mistimed_lines(&cues, &MistimingConfig::default(), " ", restrict);

        assert_eq!(result.runs_redistributed, 1);
        assert_eq!(result.cues[1].start, 2.0);
        assert_eq!(result.cues[1].end, 2.05);
        assert!((result.cues[4].start - (5.0 + 2.05 * 4.0 / 6.0)).abs() < 1e-9);
        assert_eq!(result.cues[4].end, 7.05);
    }

    #[test]
    fn test_remove_empty_respects_restrict() {
        let cues = vec![
            Cue::new(1, " ", 0.0, 1.0),
            Cue::new(2, "a", 1.0, 2.0),
            Cue::new(3, "", 2.0, 3.0),
        ];
        let all = remove_empty(&cues, None);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].index, 1);

        let partial = remove_empty(&cues, TimingRange::new(3, 3).ok());
        assert_eq!(partial.len(), 2);
        assert_eq!(partial[0].text, " ");
    }
}
