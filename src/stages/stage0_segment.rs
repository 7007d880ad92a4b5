use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::models::{validate_tokens, Cue, CueFlag, Token};

/// Configuration for Stage 0 line building
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Sentence-ending marks; a token ending in one closes the line
    pub delimiters: Vec<String>,
    /// Preferred break points that do not end a sentence
    pub soft_delimiters: Vec<String>,
    /// Decorative glyphs stripped from cue text
    pub removal: Vec<String>,
    /// Inserted between tokens that carry no whitespace of their own
    pub word_separator: String,
    /// Length past which a line breaks at the next soft delimiter
    pub soft_max_chars: usize,
    /// Length past which a line looks back for any break point
    pub hard_max_chars: usize,
    /// Characters allowed past the hard ceiling before a forced break
    pub hard_max_carryover: usize,
    /// Silence (seconds) that starts a new line even mid-sentence
    pub max_time_gap_sec: f64,
    /// Mean token confidence below which a cue is flagged
    pub min_confidence: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            delimiters: [".", "!", "?", "。", "！", "？", "…"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            soft_delimiters: [",", ";", ":", "、", "，", "；", "："]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            removal: ["「", "」", "『", "』"].iter().map(|s| s.to_string()).collect(),
            word_separator: " ".to_string(),
            soft_max_chars: 20,
            hard_max_chars: 50,
            hard_max_carryover: 10,
            max_time_gap_sec: 2.0,
            min_confidence: 0.5,
        }
    }
}

/// Length constraints handed to a [`LineBreakOracle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakLimits {
    pub soft_max_chars: usize,
    pub hard_max_chars: usize,
}

/// External text-segmentation decision.
///
/// Given a run of text that crossed the hard ceiling, returns character
/// offsets at which it may be broken. Offsets that do not fall on a token
/// boundary are ignored, and an error leaves the deterministic rules in charge.
pub trait LineBreakOracle {
    fn break_offsets(&self, text: &str, limits: &BreakLimits) -> anyhow::Result<Vec<usize>>;
}

/// Result of Stage 0 segmentation
#[derive(Debug, Clone, Default)]
pub struct SegmentResult {
    pub cues: Vec<Cue>,
    /// Lines broken by silence between tokens
    pub gap_breaks: usize,
    /// Lines broken at the hard ceiling plus carryover
    pub forced_breaks: usize,
    /// Lines broken by looking back to an earlier soft delimiter
    pub lookback_breaks: usize,
    /// Lines broken where the oracle said
    pub oracle_breaks: usize,
}

/// Execute Stage 0: build cues from a token stream
///
/// Rules, in the order they are evaluated for each incoming token:
/// 1. Silence longer than `max_time_gap_sec` closes the line before the token
/// 2. A token starting with a hard delimiter gives that mark to the open line
/// 3. A token that would push the line past hard ceiling plus carryover
///    starts a new line
/// 4. Past the soft ceiling, the line breaks at a soft delimiter, preferring
///    the last one that keeps the head within the ceiling
/// 5. Past the hard ceiling with no soft delimiter, the line breaks where the
///    oracle says, or keeps growing until rule 3
/// 6. A token ending in a hard delimiter closes whatever is left of the line
pub fn segment_tokens(
    tokens: &[Token],
    config: &SegmenterConfig,
    oracle: Option<&dyn LineBreakOracle>,
) -> Result<SegmentResult, EngineError> {
    validate_tokens(tokens)?;

    let mut builder = LineBuilder::new(config, oracle);
    for token in tokens {
        builder.push_token(token);
    }
    let result = builder.finish();

    info!(
        "Stage 0: {} tokens -> {} cues ({} gap, {} forced, {} lookback, {} oracle breaks)",
        tokens.len(),
        result.cues.len(),
        result.gap_breaks,
        result.forced_breaks,
        result.lookback_breaks,
        result.oracle_breaks
    );

    Ok(result)
}

/// A token, or the part of one, placed on a line
#[derive(Debug, Clone)]
struct Piece {
    text: String,
    start: f64,
    end: f64,
    confidence: Option<f64>,
}

impl From<&Token> for Piece {
    fn from(token: &Token) -> Self {
        Self {
            text: token.text.clone(),
            start: token.start,
            end: token.end,
            confidence: token.confidence,
        }
    }
}

/// Joined text of a line with the char offsets around each piece boundary
struct Rendered {
    text: String,
    /// Char offset where piece `k` ends
    piece_ends: Vec<usize>,
    /// Char offset where piece `k` begins (after any separator)
    piece_starts: Vec<usize>,
}

struct LineBuilder<'a> {
    config: &'a SegmenterConfig,
    oracle: Option<&'a dyn LineBreakOracle>,
    line: Vec<Piece>,
    oracle_consulted: bool,
    result: SegmentResult,
}

impl<'a> LineBuilder<'a> {
    fn new(config: &'a SegmenterConfig, oracle: Option<&'a dyn LineBreakOracle>) -> Self {
        Self {
            config,
            oracle,
            line: Vec::new(),
            oracle_consulted: false,
            result: SegmentResult::default(),
        }
    }

    fn push_token(&mut self, token: &Token) {
        if let Some(last) = self.line.last() {
            if token.start - last.end > self.config.max_time_gap_sec {
                debug!(
                    "Gap of {:.2}s before {:?} at {:.2}s",
                    token.start - last.end,
                    token.text,
                    token.start
                );
                self.flush();
                self.result.gap_breaks += 1;
            }
        }

        let mut piece = Piece::from(token);

        if !self.line.is_empty() {
            if let Some((mark, rest)) = split_leading_delimiter(&token.text, &self.config.delimiters)
            {
                self.line.push(Piece {
                    text: mark.to_string(),
                    start: token.start,
                    end: token.start,
                    confidence: token.confidence,
                });
                self.flush();
                piece.text = rest.to_string();
            }
        }

        let ceiling = self.config.hard_max_chars + self.config.hard_max_carryover;
        if !self.line.is_empty() && self.length_with(&piece) > ceiling {
            debug!("Forced break before {:?} at {:.2}s", piece.text, piece.start);
            self.flush();
            self.result.forced_breaks += 1;
        }

        let ends_hard = ends_with_any(&piece.text, &self.config.delimiters);
        self.line.push(piece);

        if self.line_length() > self.config.soft_max_chars {
            self.break_at_soft_boundary();
        }
        if self.line_length() > self.config.hard_max_chars {
            self.break_past_hard_ceiling();
        }
        if ends_hard {
            self.flush();
        }
    }

    /// Break the line at a soft delimiter once it is past the soft ceiling
    ///
    /// The last boundary that keeps the head within the ceiling wins, else the
    /// first one past it. Without any soft boundary the line keeps growing.
    fn break_at_soft_boundary(&mut self) {
        let soft_max = self.config.soft_max_chars;
        while self.line_length() > soft_max {
            let rendered = self.render_line();
            let candidates: Vec<usize> = (0..self.line.len())
                .filter(|&k| ends_with_any(&self.line[k].text, &self.config.soft_delimiters))
                .collect();
            let boundary = candidates
                .iter()
                .rev()
                .find(|&&k| rendered.piece_ends[k] <= soft_max)
                .or(candidates.first())
                .copied();

            let Some(k) = boundary else {
                break;
            };
            if k + 1 < self.line.len() {
                debug!(
                    "Soft break after {:?} ({} chars)",
                    self.line[k].text, rendered.piece_ends[k]
                );
                self.result.lookback_breaks += 1;
            }
            self.split_after(&[k]);
        }
    }

    /// Ask the oracle for break points once the line is past the hard ceiling
    fn break_past_hard_ceiling(&mut self) {
        while self.line.len() > 1 && self.line_length() > self.config.hard_max_chars {
            // No break point: the line grows until the carryover ceiling
            let Some(boundaries) = self.consult_oracle() else {
                break;
            };
            self.result.oracle_breaks += boundaries.len();
            self.split_after(&boundaries);
            if self.line_length() > self.config.soft_max_chars {
                self.break_at_soft_boundary();
            }
        }
    }

    /// Ask the oracle once per line; returns piece indices to break after
    fn consult_oracle(&mut self) -> Option<Vec<usize>> {
        let oracle = self.oracle?;
        if self.oracle_consulted {
            return None;
        }
        self.oracle_consulted = true;

        let rendered = self.render_line();
        let limits = BreakLimits {
            soft_max_chars: self.config.soft_max_chars,
            hard_max_chars: self.config.hard_max_chars,
        };

        match oracle.break_offsets(&rendered.text, &limits) {
            Ok(offsets) => {
                let boundaries = boundaries_for_offsets(&rendered, &offsets);
                if boundaries.is_empty() {
                    warn!(
                        "Line break offsets {:?} do not fall on token boundaries: {:?}",
                        offsets, rendered.text
                    );
                    None
                } else {
                    Some(boundaries)
                }
            }
            Err(e) => {
                warn!("Line break oracle failed, keeping line: {:#}", e);
                None
            }
        }
    }

    /// Emit the pieces up to and including each boundary, keeping the rest open
    fn split_after(&mut self, boundaries: &[usize]) {
        let mut rest = std::mem::take(&mut self.line);
        let mut taken = 0;
        for &k in boundaries {
            let head: Vec<Piece> = rest.drain(..=(k - taken)).collect();
            taken = k + 1;
            self.emit(head);
        }
        self.line = rest;
        self.oracle_consulted = false;
    }

    fn flush(&mut self) {
        if self.line.is_empty() {
            return;
        }
        let pieces = std::mem::take(&mut self.line);
        self.oracle_consulted = false;
        self.emit(pieces);
    }

    fn emit(&mut self, pieces: Vec<Piece>) {
        let (Some(first), Some(last)) = (pieces.first(), pieces.last()) else {
            return;
        };
        let start = first.start;
        let end = last.end.max(start);

        let raw = render(&pieces, self.config).text;
        let text = clean_text(&raw, self.config);
        if text.is_empty() {
            debug!("Dropping line with no displayable text at {:.2}s", start);
            return;
        }

        let cues = &mut self.result.cues;

        if is_only_delimiters(&text, self.config) {
            if let Some(previous) = cues.last_mut() {
                previous.text.push_str(&text);
                previous.end = previous.end.max(end);
                return;
            }
        }

        if let Some(previous) = cues.last_mut() {
            if previous.end > start {
                previous.end = start.max(previous.start);
            }
        }

        let mut cue = Cue::new(cues.len() + 1, text, start, end);
        if is_low_confidence(&pieces, self.config.min_confidence) {
            cue.flags.insert(CueFlag::LowConfidence);
        }
        cues.push(cue);
    }

    fn render_line(&self) -> Rendered {
        render(&self.line, self.config)
    }

    fn line_length(&self) -> usize {
        self.render_line().text.chars().count()
    }

    fn length_with(&self, piece: &Piece) -> usize {
        let mut pieces = self.line.clone();
        pieces.push(piece.clone());
        render(&pieces, self.config).text.chars().count()
    }

    fn finish(mut self) -> SegmentResult {
        self.flush();
        self.result
    }
}

/// Join pieces with the configured separator, removal glyphs stripped
fn render(pieces: &[Piece], config: &SegmenterConfig) -> Rendered {
    let mut text = String::new();
    let mut length = 0usize;
    let mut piece_ends = Vec::with_capacity(pieces.len());
    let mut piece_starts = Vec::with_capacity(pieces.len());

    for piece in pieces {
        let stripped = strip_removal(&piece.text, &config.removal);
        if !stripped.is_empty() && !text.is_empty() && needs_separator(&text, &stripped, config) {
            text.push_str(&config.word_separator);
            length += config.word_separator.chars().count();
        }
        piece_starts.push(length);
        length += stripped.chars().count();
        text.push_str(&stripped);
        piece_ends.push(length);
    }

    Rendered {
        text,
        piece_ends,
        piece_starts,
    }
}

fn needs_separator(before: &str, next: &str, config: &SegmenterConfig) -> bool {
    if config.word_separator.is_empty() {
        return false;
    }
    let before_spaced = before.chars().last().is_some_and(char::is_whitespace);
    let next_spaced = next.chars().next().is_some_and(char::is_whitespace);
    let next_attaches = config
        .delimiters
        .iter()
        .chain(config.soft_delimiters.iter())
        .any(|d| !d.is_empty() && next.starts_with(d.as_str()));

    !before_spaced && !next_spaced && !next_attaches
}

fn strip_removal(text: &str, removal: &[String]) -> String {
    removal
        .iter()
        .filter(|r| !r.is_empty())
        .fold(text.to_string(), |acc, r| acc.replace(r.as_str(), ""))
}

/// Map oracle char offsets to the pieces they break after
fn boundaries_for_offsets(rendered: &Rendered, offsets: &[usize]) -> Vec<usize> {
    let last = rendered.piece_ends.len().saturating_sub(1);
    let mut boundaries: Vec<usize> = offsets
        .iter()
        .filter_map(|&offset| {
            (0..last).find(|&k| {
                offset > 0
                    && offset >= rendered.piece_ends[k]
                    && offset <= rendered.piece_starts[k + 1]
            })
        })
        .collect();
    boundaries.sort_unstable();
    boundaries.dedup();
    boundaries
}

fn ends_with_any(text: &str, marks: &[String]) -> bool {
    let trimmed = text.trim_end();
    marks
        .iter()
        .any(|m| !m.is_empty() && trimmed.ends_with(m.as_str()))
}

/// `"。次"` -> `("。", "次")`; `None` when the token is only the mark
fn split_leading_delimiter<'t>(text: &'t str, delimiters: &[String]) -> Option<(&'t str, &'t str)> {
    delimiters
        .iter()
        .filter(|d| !d.is_empty())
        .find(|d| text.starts_with(d.as_str()) && text.len() > d.len())
        .map(|d| text.split_at(d.len()))
}

fn is_only_delimiters(text: &str, config: &SegmenterConfig) -> bool {
    let mut rest = text.trim();
    if rest.is_empty() {
        return false;
    }
    while !rest.is_empty() {
        let mark = config
            .delimiters
            .iter()
            .chain(config.soft_delimiters.iter())
            .find(|d| !d.is_empty() && rest.starts_with(d.as_str()));
        match mark {
            Some(d) => rest = rest[d.len()..].trim_start(),
            None => return false,
        }
    }
    true
}

fn is_low_confidence(pieces: &[Piece], min_confidence: f64) -> bool {
    let scores: Vec<f64> = pieces.iter().filter_map(|p| p.confidence).collect();
    if scores.is_empty() {
        return false;
    }
    scores.iter().sum::<f64>() / (scores.len() as f64) < min_confidence
}

/// Final cue text: trimmed, no leading dash or soft delimiter, repeats collapsed
pub fn clean_text(raw: &str, config: &SegmenterConfig) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix('-') {
        text = rest.trim_start();
    }
    while let Some(d) = config
        .soft_delimiters
        .iter()
        .find(|d| !d.is_empty() && text.starts_with(d.as_str()))
    {
        text = text[d.len()..].trim_start();
    }
    collapse_repeats(text.trim_end())
}

/// Shorten any 1-6 char unit repeated five or more times to three repeats
pub fn collapse_repeats(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < n {
        let mut collapsed = false;
        for unit in 1..=6 {
            if i + unit > n {
                break;
            }
            let pattern = &chars[i..i + unit];
            let mut repeats = 1;
            while i + (repeats + 1) * unit <= n
                && &chars[i + repeats * unit..i + (repeats + 1) * unit] == pattern
            {
                repeats += 1;
            }
            if repeats >= 5 {
                for _ in 0..3 {
                    out.extend(pattern.iter());
                }
                i += repeats * unit;
                collapsed = true;
                break;
            }
        }
        if !collapsed {
            out.push(chars[i]);
            i += 1;
        }
    }

    out
}
