use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Anomaly and processing markers that can be attached to a cue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CueFlag {
    /// Duration inconsistent with the amount of text
    MistimedLine,
    /// First cue of a block flagged for re-transcription
    MistimedSegmentStart,
    /// Last cue of a block flagged for re-transcription
    MistimedSegmentEnd,
    /// Mean recognition confidence below the configured floor
    LowConfidence,
    /// Timing was extended by the conformer
    Padded,
}

impl CueFlag {
    const ALL: [CueFlag; 5] = [
        CueFlag::MistimedLine,
        CueFlag::MistimedSegmentStart,
        CueFlag::MistimedSegmentEnd,
        CueFlag::LowConfidence,
        CueFlag::Padded,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of [`CueFlag`]s, stored as a bitset and serialized as a tag list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CueFlag>", into = "Vec<CueFlag>")]
pub struct CueFlags(u8);

impl CueFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, flag: CueFlag) {
        self.0 |= flag.bit();
    }

    pub fn remove(&mut self, flag: CueFlag) {
        self.0 &= !flag.bit();
    }

    pub fn contains(&self, flag: CueFlag) -> bool {
        self.0 & flag.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = CueFlag> + '_ {
        CueFlag::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

impl From<Vec<CueFlag>> for CueFlags {
    fn from(flags: Vec<CueFlag>) -> Self {
        let mut set = CueFlags::empty();
        for flag in flags {
            set.insert(flag);
        }
        set
    }
}

impl From<CueFlags> for Vec<CueFlag> {
    fn from(flags: CueFlags) -> Self {
        flags.iter().collect()
    }
}

/// A timed subtitle line
///
/// The segmenter may emit a cue with `end == start`, from a zero-length token
/// or from clamping against an overlapping successor. Such cues are left for
/// the timing conformer to widen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// 1-based position, contiguous within a document
    pub index: usize,
    pub text: String,
    /// Start timestamp in seconds
    pub start: f64,
    /// End timestamp in seconds
    pub end: f64,
    #[serde(default)]
    pub flags: CueFlags,
}

impl Cue {
    pub fn new(index: usize, text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            index,
            text: text.into(),
            start,
            end,
            flags: CueFlags::empty(),
        }
    }

    /// Display duration in seconds
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    /// Number of characters (not bytes) in the text
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// Reading speed; infinite for a zero-length cue with text
    pub fn chars_per_second(&self) -> f64 {
        let chars = self.char_count() as f64;
        if chars == 0.0 {
            return 0.0;
        }
        let duration = self.duration();
        if duration <= 0.0 {
            f64::INFINITY
        } else {
            chars / duration
        }
    }

    pub fn has_flag(&self, flag: CueFlag) -> bool {
        self.flags.contains(flag)
    }
}

/// Restore contiguous 1-based indices after cues were inserted or removed
pub fn renumber(cues: &mut [Cue]) {
    for (i, cue) in cues.iter_mut().enumerate() {
        cue.index = i + 1;
    }
}

/// Inclusive, 1-based block of cue indices
///
/// Only built through [`TimingRange::new`], so `start_index >= 1` and
/// `end_index >= start_index` always hold, including after deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimingRange")]
pub struct TimingRange {
    start_index: usize,
    end_index: usize,
}

#[derive(Deserialize)]
struct RawTimingRange {
    start_index: usize,
    end_index: usize,
}

impl TryFrom<RawTimingRange> for TimingRange {
    type Error = EngineError;

    fn try_from(raw: RawTimingRange) -> Result<Self, Self::Error> {
        Self::new(raw.start_index, raw.end_index)
    }
}

impl TimingRange {
    pub fn new(start_index: usize, end_index: usize) -> Result<Self, EngineError> {
        if start_index == 0 {
            return Err(EngineError::InvalidRange(
                "cue indices are 1-based".to_string(),
            ));
        }
        if end_index < start_index {
            return Err(EngineError::InvalidRange(format!(
                "{} ends before it starts",
                Self {
                    start_index,
                    end_index
                }
            )));
        }
        Ok(Self {
            start_index,
            end_index,
        })
    }

    /// Build from 0-based positions into a cue slice
    pub(crate) fn from_positions(first: usize, last: usize) -> Self {
        Self {
            start_index: first + 1,
            end_index: last + 1,
        }
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn end_index(&self) -> usize {
        self.end_index
    }

    /// Smallest range covering both
    pub fn union(&self, other: &TimingRange) -> Self {
        Self {
            start_index: self.start_index.min(other.start_index),
            end_index: self.end_index.max(other.end_index),
        }
    }

    /// Number of cues covered
    pub fn len(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index <= self.end_index
    }

    /// 0-based positions covered, for slicing a cue list
    pub fn positions(&self) -> std::ops::RangeInclusive<usize> {
        (self.start_index - 1)..=(self.end_index - 1)
    }

    /// True when the two ranges share a cue or sit next to each other
    pub fn overlaps_or_touches(&self, other: &TimingRange) -> bool {
        self.start_index <= other.end_index + 1 && other.start_index <= self.end_index + 1
    }

    /// Parse `"12-30"` or a single index `"12"`
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        let parse_index = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| EngineError::InvalidRange(format!("'{}' is not a cue index", part)))
        };

        match s.split_once('-') {
            Some((start, end)) => Self::new(parse_index(start)?, parse_index(end)?),
            None => {
                let index = parse_index(s)?;
                Self::new(index, index)
            }
        }
    }
}

impl fmt::Display for TimingRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_index, self.end_index)
    }
}
