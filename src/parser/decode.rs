//! Charset transcoding and Content-Transfer-Encoding decoding.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{EmlError, Result};

/// Content-Transfer-Encoding of a part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    SevenBit,
    EightBit,
    Base64,
    QuotedPrintable,
    Binary,
}

impl TransferEncoding {
    /// Parse a header value. Unknown or absent encodings count as `7bit`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Reverse the encoding. Identity encodings return the input unchanged.
    pub fn decode(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(data),
            Self::QuotedPrintable => Ok(decode_quoted_printable(data)),
            Self::SevenBit | Self::EightBit | Self::Binary => Ok(data.to_vec()),
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// Convert `data` from the charset named `label` into UTF-8 bytes.
///
/// `UTF-8` (any case) and an empty label pass the bytes through untouched,
/// so invalid UTF-8 is preserved. Labels that `encoding_rs` does not know
/// fail with [`EmlError::UnsupportedCharset`].
pub fn charset_transcode(label: &str, data: &[u8]) -> Result<Vec<u8>> {
    let label = label.trim().trim_matches('"');
    if label.is_empty() || label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8")
    {
        return Ok(data.to_vec());
    }

    let encoding = encoding_rs::Encoding::for_label(label.as_bytes())
        .filter(|enc| *enc != encoding_rs::REPLACEMENT)
        .ok_or_else(|| EmlError::UnsupportedCharset(label.to_string()))?;

    let (decoded, _) = encoding.decode_without_bom_handling(data);
    Ok(decoded.into_owned().into_bytes())
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
            decoded.into_owned()
        }
    }
}

/// Decode base64, ignoring embedded whitespace and line breaks.
pub fn decode_base64(data: &[u8]) -> Result<Vec<u8>> {
    let cleaned: Vec<u8> = data
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(cleaned)?)
}

/// Decode quoted-printable (RFC 2045 §6.7).
///
/// Soft line breaks are removed, hard ones kept, and malformed escapes are
/// copied through literally. Never fails.
pub fn decode_quoted_printable(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut lines = data.split(|&b| b == b'\n').peekable();
    while let Some(line) = lines.next() {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        // Transport padding at line end is not content.
        let line = trim_trailing_wsp(line);
        let (line, soft_break) = match line.strip_suffix(b"=") {
            Some(rest) => (rest, true),
            None => (line, false),
        };

        let mut i = 0;
        while i < line.len() {
            if line[i] == b'=' {
                if let Some(byte) = line.get(i + 1..i + 3).and_then(hex_byte) {
                    out.push(byte);
                    i += 3;
                    continue;
                }
            }
            out.push(line[i]);
            i += 1;
        }

        if !soft_break && lines.peek().is_some() {
            out.extend_from_slice(b"\r\n");
        }
    }
    out
}

fn hex_byte(pair: &[u8]) -> Option<u8> {
    let s = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(s, 16).ok()
}

fn trim_trailing_wsp(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(0, |i| i + 1);
    &line[..end]
}
