use thiserror::Error;

/// Why a proposed split was not used
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitRejection {
    #[error("expected two lines, got {0}")]
    WrongLineCount(usize),
    #[error("first line is not a prefix of the source: {0:?}")]
    ModifiedHead(String),
    #[error("second line does not complete the source: {0:?}")]
    ModifiedTail(String),
}

/// Check a two-line reply against the source text
///
/// The lines, joined by nothing but whitespace, must reproduce the source
/// exactly. Returns the char offset in `text` where the first line ends.
pub fn validate_split(text: &str, response: &str) -> Result<usize, SplitRejection> {
    let lines: Vec<&str> = response
        .trim()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let [head, tail] = lines.as_slice() else {
        return Err(SplitRejection::WrongLineCount(lines.len()));
    };

    let trimmed = text.trim();
    let rest = trimmed
        .strip_prefix(*head)
        .ok_or_else(|| SplitRejection::ModifiedHead(head.to_string()))?;
    if rest.trim_start() != *tail {
        return Err(SplitRejection::ModifiedTail(tail.to_string()));
    }

    let leading = text.chars().count() - text.trim_start().chars().count();
    Ok(leading + head.chars().count())
}
