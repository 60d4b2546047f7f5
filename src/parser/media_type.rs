//! Content-Type and Content-Disposition values.

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::percent_decode_str;

use crate::error::{EmlError, Result};
use crate::parser::decode::charset_transcode;

/// A parsed `type/subtype; param=value` media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// Lower-case main type (`text`, `multipart`, ...).
    pub main_type: String,
    /// Lower-case subtype (`plain`, `mixed`, ...).
    pub sub_type: String,
    /// Parameters keyed by lower-case name, RFC 2231 sections already joined.
    pub parameters: BTreeMap<String, String>,
}

impl MediaType {
    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    pub fn is_multipart(&self) -> bool {
        self.main_type == "multipart"
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset").filter(|c| !c.is_empty())
    }

    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary").filter(|b| !b.is_empty())
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        for (key, value) in &self.parameters {
            if value.is_empty() || !value.bytes().all(is_token_char) {
                write!(f, "; {key}=\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))?;
            } else {
                write!(f, "; {key}={value}")?;
            }
        }
        Ok(())
    }
}

/// A parsed Content-Disposition value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Lower-case disposition type (`attachment`, `inline`, ...). May be empty.
    pub kind: String,
    pub parameters: BTreeMap<String, String>,
}

impl ContentDisposition {
    pub fn is_attachment(&self) -> bool {
        self.kind == "attachment"
    }

    pub fn filename(&self) -> Option<&str> {
        self.parameters
            .get("filename")
            .map(String::as_str)
            .filter(|f| !f.trim().is_empty())
    }
}

/// Parse a Content-Type value.
///
/// Fails with [`EmlError::InvalidMediaType`] when the `type/subtype` pair is
/// missing or contains non-token characters. Malformed parameters are skipped.
pub fn parse_media_type(value: &str) -> Result<MediaType> {
    let value = value.trim();
    let (type_part, params) = value.split_once(';').unwrap_or((value, ""));
    let (main, sub) = type_part
        .split_once('/')
        .ok_or_else(|| EmlError::InvalidMediaType(format!("missing '/' in '{value}'")))?;
    let (main, sub) = (main.trim(), sub.trim());
    if !is_token(main) || !is_token(sub) {
        return Err(EmlError::InvalidMediaType(format!(
            "'{type_part}' is not a type/subtype pair"
        )));
    }

    Ok(MediaType {
        main_type: main.to_ascii_lowercase(),
        sub_type: sub.to_ascii_lowercase(),
        parameters: parse_parameters(params),
    })
}

/// Parse a Content-Disposition value. Never fails.
pub fn parse_content_disposition(value: &str) -> ContentDisposition {
    let (kind, params) = value.split_once(';').unwrap_or((value, ""));
    ContentDisposition {
        kind: kind.trim().to_ascii_lowercase(),
        parameters: parse_parameters(params),
    }
}

/// Parse a `; name=value; name="value"` list into a map.
///
/// RFC 2231 continuations (`name*0`, `name*1`) are joined in section order
/// and extended values (`name*=charset'lang'%XX`) are decoded. An extended
/// parameter takes precedence over a plain one of the same name.
pub fn parse_parameters(input: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut sections: BTreeMap<String, Vec<Section>> = BTreeMap::new();

    for (name, value) in raw_parameters(input) {
        match split_section(&name) {
            Some((base, index, encoded)) => sections.entry(base).or_default().push(Section {
                index,
                encoded,
                value,
            }),
            None => {
                params.insert(name, value);
            }
        }
    }

    for (base, mut parts) in sections {
        parts.sort_by_key(|s| s.index);
        params.insert(base, join_sections(&parts));
    }
    params
}

struct Section {
    index: u32,
    encoded: bool,
    value: String,
}

/// Lex parameters into `(lower-case name, value)` pairs, unquoting values.
fn raw_parameters(input: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| *c == ';' || c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && *c != ';') {
            name.push(c);
        }
        if chars.next_if_eq(&'=').is_none() {
            // `; flag` without a value
            continue;
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
            while chars.next_if(|c| *c != ';').is_some() {}
        } else {
            while let Some(c) = chars.next_if(|c| *c != ';') {
                value.push(c);
            }
            value = value.trim_end().to_string();
        }

        let name = name.trim().to_ascii_lowercase();
        if is_token(&name) {
            out.push((name, value));
        }
    }
    out
}

/// Split `name*N*` into `(name, N, encoded)`. Plain names yield `None`.
fn split_section(name: &str) -> Option<(String, u32, bool)> {
    let (stem, encoded) = match name.strip_suffix('*') {
        Some(stem) => (stem, true),
        None => (name, false),
    };
    match stem.rsplit_once('*') {
        Some((base, index)) if !base.is_empty() => {
            index.parse().ok().map(|i| (base.to_string(), i, encoded))
        }
        None if encoded && !stem.is_empty() => Some((stem.to_string(), 0, true)),
        _ => None,
    }
}

fn join_sections(parts: &[Section]) -> String {
    let mut charset: Option<&str> = None;
    let mut bytes = Vec::new();

    for (i, part) in parts.iter().enumerate() {
        if !part.encoded {
            bytes.extend_from_slice(part.value.as_bytes());
            continue;
        }
        let mut text = part.value.as_str();
        if i == 0 {
            let mut pieces = text.splitn(3, '\'');
            if let (Some(cs), Some(_lang), Some(rest)) = (pieces.next(), pieces.next(), pieces.next())
            {
                charset = Some(cs).filter(|cs| !cs.is_empty());
                text = rest;
            }
        }
        bytes.extend(percent_decode_str(text));
    }

    let decoded = match charset {
        Some(cs) => charset_transcode(cs, &bytes).unwrap_or_else(|_| bytes.clone()),
        None => bytes,
    };
    String::from_utf8_lossy(&decoded).into_owned()
}

/// RFC 2045 token character.
fn is_token_char(c: u8) -> bool {
    matches!(c,
        b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z' |
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'{' | b'|' | b'}' | b'~'
    )
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}
