//! Raw header/body tokenizer.
//!
//! Splits a message into `(key, value)` header pairs and a body slice without
//! interpreting anything. `CRLF` and bare `LF` line endings are both accepted,
//! mixed freely. Folded values are unwrapped by removing the line breaks only,
//! so `"Hello\r\n World"` becomes `"Hello World"`.

use std::borrow::Cow;

use tracing::debug;

use crate::error::{EmlError, Result};

/// One header as it appeared in the input, folding removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader<'a> {
    pub key: &'a [u8],
    /// Borrowed unless the value was folded.
    pub value: Cow<'a, [u8]>,
}

/// Headers and body of one input buffer. All slices borrow from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage<'a> {
    pub headers: Vec<RawHeader<'a>>,
    /// Everything before the separator line, trailing line breaks trimmed.
    pub header_block: &'a [u8],
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    InKey,
    ValueLeadingWs,
    InValue,
}

/// How a line without a colon in the header block is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Dropped; the header block goes on.
    Message,
    /// Taken as the first body line of a part that lacks the blank separator.
    Part,
}

/// Result of one scan. `separator` is `(start, body_start)` of the blank line.
struct Scan<'a> {
    headers: Vec<RawHeader<'a>>,
    separator: Option<(usize, usize)>,
}

/// Tokenize a complete message.
///
/// Fails with [`EmlError::UnexpectedEndOfInput`] when no blank line separates
/// the headers from the body, even if there are no headers at all.
pub fn parse_raw(input: &[u8]) -> Result<RawMessage<'_>> {
    let scan = scan(input, Mode::Message);
    let (start, body_start) = scan.separator.ok_or(EmlError::UnexpectedEndOfInput)?;
    Ok(RawMessage {
        headers: scan.headers,
        header_block: trim_line_breaks(&input[..start]),
        body: &input[body_start..],
    })
}

/// Tokenize the headers of a MIME part.
///
/// Unlike [`parse_raw`], reaching the end of input simply ends the header
/// block: a part made of headers only has an empty body. A line without a
/// colon ends the headers too and is kept as the start of the body.
pub fn parse_part(input: &[u8]) -> RawMessage<'_> {
    let scan = scan(input, Mode::Part);
    match scan.separator {
        Some((start, body_start)) => RawMessage {
            headers: scan.headers,
            header_block: trim_line_breaks(&input[..start]),
            body: &input[body_start..],
        },
        None => RawMessage {
            headers: scan.headers,
            header_block: trim_line_breaks(input),
            body: &input[input.len()..],
        },
    }
}

fn scan(input: &[u8], mode: Mode) -> Scan<'_> {
    let mut headers = Vec::new();
    let mut state = State::Ready;
    let (mut key_start, mut key_end, mut value_start) = (0, 0, 0);
    let mut pos = 0;

    while pos < input.len() {
        match state {
            State::Ready => {
                if let Some(n) = newline_len(input, pos) {
                    return Scan {
                        headers,
                        separator: Some((pos, pos + n)),
                    };
                }
                key_start = pos;
                state = State::InKey;
                pos += 1;
            }
            State::InKey => {
                if input[pos] == b':' {
                    key_end = pos;
                    state = State::ValueLeadingWs;
                    pos += 1;
                } else if mode == Mode::Part {
                    if newline_len(input, pos).is_some() {
                        debug!("Part body starts without a blank line");
                        return Scan {
                            headers,
                            separator: Some((key_start, key_start)),
                        };
                    }
                    pos += 1;
                } else if let Some(n) = newline_len(input, pos) {
                    debug!(
                        line = %String::from_utf8_lossy(&input[key_start..pos]),
                        "Dropping header line without colon"
                    );
                    state = State::Ready;
                    pos += n;
                } else {
                    pos += 1;
                }
            }
            State::ValueLeadingWs => {
                if is_wsp(input[pos]) {
                    pos += 1;
                } else if let Some(n) = newline_len(input, pos).filter(|&n| folds_at(input, pos + n))
                {
                    pos += n;
                } else {
                    // Re-dispatched in InValue, so an empty value still ends at its newline.
                    value_start = pos;
                    state = State::InValue;
                }
            }
            State::InValue => match newline_len(input, pos) {
                Some(n) if folds_at(input, pos + n) => pos += n,
                Some(n) => {
                    headers.push(make_header(input, key_start, key_end, value_start, pos));
                    state = State::Ready;
                    pos += n;
                }
                None => pos += 1,
            },
        }
    }

    match state {
        State::InValue => headers.push(make_header(
            input,
            key_start,
            key_end,
            value_start,
            input.len(),
        )),
        State::InKey if mode == Mode::Part => {
            return Scan {
                headers,
                separator: Some((key_start, key_start)),
            };
        }
        _ => {}
    }

    Scan {
        headers,
        separator: None,
    }
}

fn make_header(
    input: &[u8],
    key_start: usize,
    key_end: usize,
    value_start: usize,
    value_end: usize,
) -> RawHeader<'_> {
    RawHeader {
        key: input[key_start..key_end].trim_ascii(),
        value: unfold(&input[value_start..value_end]),
    }
}

/// Remove folding line breaks (`CRLF` or bare `LF`), keeping everything else.
fn unfold(value: &[u8]) -> Cow<'_, [u8]> {
    if !value.contains(&b'\n') {
        return Cow::Borrowed(value);
    }
    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;
    while i < value.len() {
        match newline_len(value, i) {
            Some(n) => i += n,
            None => {
                out.push(value[i]);
                i += 1;
            }
        }
    }
    Cow::Owned(out)
}

/// Length of the line break at `pos` (`LF` → 1, `CRLF` → 2), if any.
fn newline_len(input: &[u8], pos: usize) -> Option<usize> {
    match input.get(pos) {
        Some(b'\n') => Some(1),
        Some(b'\r') if input.get(pos + 1) == Some(&b'\n') => Some(2),
        _ => None,
    }
}

/// Whether the line starting at `pos` continues the previous one.
fn folds_at(input: &[u8], pos: usize) -> bool {
    input.get(pos).is_some_and(|&b| is_wsp(b))
}

fn is_wsp(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn trim_line_breaks(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |i| i + 1);
    &bytes[..end]
}
