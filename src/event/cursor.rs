//! Event log cursor codec.
//!
//! A cursor is `{relative_ms:011x}_{sequence:010x}`: fixed-width lowercase hex,
//! so lexical order matches `(relative_ms, sequence)` order and the string is
//! safe to put in a URL.

use std::fmt;

const TIME_WIDTH: usize = 11;
const SEQ_WIDTH: usize = 10;
const SEPARATOR: char = '_';

/// Decoded cursor contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CursorParts {
    /// Milliseconds since the owning log's epoch anchor
    pub relative_ms: u64,
    /// Sequence number of the event (or the last event seen, for synthetic cursors)
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CursorError {
    Empty,
    InvalidLength(usize),
    MissingSeparator,
    InvalidDigits(String),
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::Empty => write!(f, "cursor is empty"),
            CursorError::InvalidLength(len) => write!(
                f,
                "cursor must be {} characters, got {}",
                TIME_WIDTH + SEQ_WIDTH + 1,
                len
            ),
            CursorError::MissingSeparator => write!(f, "cursor separator missing"),
            CursorError::InvalidDigits(part) => write!(f, "invalid hex digits '{}'", part),
        }
    }
}

impl std::error::Error for CursorError {}

pub fn encode_cursor(parts: CursorParts) -> String {
    format!(
        "{:0tw$x}{}{:0sw$x}",
        parts.relative_ms,
        SEPARATOR,
        parts.sequence,
        tw = TIME_WIDTH,
        sw = SEQ_WIDTH
    )
}

pub fn decode_cursor(cursor: &str) -> Result<CursorParts, CursorError> {
    if cursor.is_empty() {
        return Err(CursorError::Empty);
    }
    if cursor.len() != TIME_WIDTH + SEQ_WIDTH + 1 {
        return Err(CursorError::InvalidLength(cursor.len()));
    }
    // split_at below needs byte offsets to be char boundaries
    if !cursor.is_ascii() {
        return Err(CursorError::InvalidDigits(cursor.to_string()));
    }

    let (time_part, rest) = cursor.split_at(TIME_WIDTH);
    let seq_part = rest
        .strip_prefix(SEPARATOR)
        .ok_or(CursorError::MissingSeparator)?;

    Ok(CursorParts {
        relative_ms: parse_hex(time_part)?,
        sequence: parse_hex(seq_part)?,
    })
}

fn parse_hex(part: &str) -> Result<u64, CursorError> {
    // from_str_radix accepts a leading '+' and uppercase; cursors never carry either
    if !part.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        return Err(CursorError::InvalidDigits(part.to_string()));
    }
    u64::from_str_radix(part, 16).map_err(|_| CursorError::InvalidDigits(part.to_string()))
}
