use crate::models::{Cue, CueFlag};

use super::MistimingConfig;

/// Line-level check: is this cue's duration implausible for its text?
///
/// A cue is mistimed when it lasts no longer than the threshold, or when it
/// is shorter than its text could be spoken at `max_speech_cps` by more than
/// the threshold. Pure and stateless.
pub fn is_mistimed_line(cue: &Cue, config: &MistimingConfig) -> bool {
    let duration = cue.duration();
    if duration <= config.mistimed_line_threshold_sec {
        return true;
    }

    if config.max_speech_cps <= 0.0 {
        return false;
    }
    let expected = cue.char_count() as f64 / config.max_speech_cps;
    expected - duration > config.mistimed_line_threshold_sec
}

/// Set or clear the `mistimed_line` flag on every cue; returns the flagged count
pub fn flag_mistimed_lines(cues: &mut [Cue], config: &MistimingConfig) -> usize {
    let mut flagged = 0;
    for cue in cues.iter_mut() {
        if is_mistimed_line(cue, config) {
            cue.flags.insert(CueFlag::MistimedLine);
            flagged += 1;
        } else {
            cue.flags.remove(CueFlag::MistimedLine);
        }
    }
    flagged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_duration_is_mistimed() {
        let config = MistimingConfig::default();
        assert!(is_mistimed_line(&Cue::new(1, "hello", 3.0, 3.1), &config));
        assert!(is_mistimed_line(&Cue::new(1, "", 3.0, 3.0), &config));
        assert!(!is_mistimed_line(&Cue::new(1, "hello", 3.0, 4.0), &config));
    }

    #[test]
    fn test_text_too_long_for_duration_is_mistimed() {
        let config = MistimingConfig {
            mistimed_line_threshold_sec: 0.2,
            max_speech_cps: 30.0,
            ..Default::default()
        };
        // 60 chars need at least 2s at 30 cps
        let text = "a".repeat(60);
        assert!(is_mistimed_line(&Cue::new(1, text.clone(), 0.0, 1.0), &config));
        assert!(!is_mistimed_line(&Cue::new(1, text, 0.0, 1.9), &config));
    }

    #[test]
    fn test_flagging_is_deterministic() {
        let config = MistimingConfig::default();
        let mut cues = vec![Cue::new(1, "ok", 0.0, 0.05), Cue::new(2, "fine", 1.0, 2.0)];
        cues[1].flags.insert(CueFlag::MistimedLine);

        assert_eq!(flag_mistimed_lines(&mut cues, &config), 1);
        let first = cues.clone();
        assert_eq!(flag_mistimed_lines(&mut cues, &config), 1);

        assert_eq!(cues, first);
        assert!(cues[0].has_flag(CueFlag::MistimedLine));
        assert!(!cues[1].has_flag(CueFlag::MistimedLine));
    }
}
