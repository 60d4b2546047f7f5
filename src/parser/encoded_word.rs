//! RFC 2047 encoded-word decoding for header values.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{EmlError, Result};
use crate::parser::decode::charset_transcode;

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Text that merely resembles an encoded word (no terminating `?=`, spaces in
/// the charset) is kept as-is. A well-formed word with an unknown encoding,
/// undecodable payload or unknown charset fails the whole value; callers keep
/// the raw value in that case.
pub fn decode_encoded_words(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        // Whitespace between two encoded words is not part of the text (RFC 2047 §6.2).
        if !last_was_encoded || !before.trim().is_empty() {
            result.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match split_word(after_start) {
            Some(word) => {
                result.push_str(&decode_word(&word)?);
                remaining = &after_start[word.consumed..];
                last_was_encoded = true;
            }
            None => {
                result.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    result.push_str(remaining);
    Ok(result)
}

/// Decode encoded words, returning the input unchanged on failure.
pub fn decode_or_raw(input: &str) -> String {
    decode_encoded_words(input).unwrap_or_else(|_| input.to_string())
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
    /// Bytes consumed from the string after the opening `=?`.
    consumed: usize,
}

/// Recognize `charset?encoding?text?=`. Returns `None` for text that only
/// looks like an encoded word.
fn split_word(s: &str) -> Option<EncodedWord<'_>> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let text = &rest2[..end];

    let is_token = |t: &str| !t.is_empty() && !t.contains(|c: char| c.is_whitespace());
    if !is_token(charset) || !is_token(encoding) || text.contains(|c: char| c.is_whitespace()) {
        return None;
    }

    Some(EncodedWord {
        charset,
        encoding,
        text,
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

fn decode_word(word: &EncodedWord<'_>) -> Result<String> {
    let bytes = match word.encoding.to_ascii_uppercase().as_str() {
        "B" => STANDARD
            .decode(word.text)
            .map_err(|e| EmlError::MalformedEncodedWord(format!("{}: {e}", word.text)))?,
        "Q" => decode_q_encoding(word.text),
        other => {
            return Err(EmlError::MalformedEncodedWord(format!(
                "unknown encoding '{other}'"
            )))
        }
    };

    // RFC 2231 allows a language suffix: `utf-8*en`.
    let charset = word.charset.split('*').next().unwrap_or(word.charset);
    let utf8 = charset_transcode(charset, &bytes)?;
    Ok(String::from_utf8_lossy(&utf8).into_owned())
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let mut result = Vec::with_capacity(input.len());
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match std::str::from_utf8(&bytes[i + 1..i + 3])
                    .ok()
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    Some(byte) => {
                        result.push(byte);
                        i += 3;
                    }
                    None => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}
