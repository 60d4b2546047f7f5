//! Recursive MIME body walker.
//!
//! Flattens a (possibly nested) multipart body into its leaf parts in
//! document order. Whether a part is split further is decided from its media
//! type alone: only `multipart/*` with a boundary is descended into.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{EmlError, Result};
use crate::model::part::{HeaderMap, Part};
use crate::parser::decode::decode_header_bytes;
use crate::parser::media_type::{parse_media_type, MediaType};
use crate::parser::raw;

/// Nesting limit used by [`parse_body`].
pub const DEFAULT_MAX_DEPTH: usize = 16;

const DEFAULT_CHARSET: &str = "UTF-8";

/// Split `body` into leaf parts according to `content_type`.
///
/// A non-multipart body comes back as one part with an empty header map.
/// Fails with [`EmlError::InvalidMediaType`] for an unparsable content type,
/// [`EmlError::MissingBoundary`] for `multipart/*` without a boundary and
/// [`EmlError::Multipart`] when no delimiter line is found.
pub fn parse_body(content_type: &str, body: &[u8]) -> Result<Vec<Part>> {
    MultipartWalker::new(DEFAULT_MAX_DEPTH).walk(content_type, body, HeaderMap::new())
}

/// Body walker that collects non-fatal problems of nested parts.
#[derive(Debug)]
pub struct MultipartWalker {
    max_depth: usize,
    warnings: Vec<EmlError>,
}

enum Kind {
    Leaf,
    Multipart(String),
    MultipartWithoutBoundary,
}

impl MultipartWalker {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            warnings: Vec::new(),
        }
    }

    /// Walk a message body.
    ///
    /// `headers` are attached to the single part produced for a
    /// non-multipart body; they are ignored otherwise.
    pub fn walk(
        &mut self,
        content_type: &str,
        body: &[u8],
        headers: HeaderMap,
    ) -> Result<Vec<Part>> {
        let media_type = parse_media_type(content_type)?;
        if !media_type.is_multipart() {
            return Ok(vec![leaf(content_type, Some(&media_type), body, headers)]);
        }
        let boundary = media_type.boundary().ok_or(EmlError::MissingBoundary)?;

        let mut parts = Vec::new();
        self.collect(boundary, body, 1, &mut parts)?;
        Ok(parts)
    }

    /// Problems found in nested parts that did not stop the walk.
    pub fn into_warnings(self) -> Vec<EmlError> {
        self.warnings
    }

    fn collect(
        &mut self,
        boundary: &str,
        body: &[u8],
        depth: usize,
        out: &mut Vec<Part>,
    ) -> Result<()> {
        for chunk in split_parts(body, boundary)? {
            let part = raw::parse_part(chunk);
            let headers = header_map(&part);
            let content_type = headers.get("Content-Type").unwrap_or("").to_string();
            let media_type = parse_media_type(&content_type).ok();

            match classify(media_type.as_ref()) {
                Kind::Leaf => out.push(leaf(&content_type, media_type.as_ref(), part.body, headers)),
                Kind::Multipart(inner) if depth < self.max_depth => {
                    let mut nested = Vec::new();
                    match self.collect(&inner, part.body, depth + 1, &mut nested) {
                        Ok(()) => out.extend(nested),
                        Err(e) => {
                            warn!(boundary = %inner, error = %e, "Keeping unsplittable multipart as leaf");
                            self.warnings.push(e);
                            out.push(leaf(&content_type, media_type.as_ref(), part.body, headers));
                        }
                    }
                }
                Kind::Multipart(_) => {
                    warn!(depth, "Multipart nesting too deep, keeping part as leaf");
                    self.warnings.push(EmlError::NestingTooDeep(self.max_depth));
                    out.push(leaf(&content_type, media_type.as_ref(), part.body, headers));
                }
                Kind::MultipartWithoutBoundary => {
                    warn!(content_type = %content_type, "Nested multipart without boundary");
                    self.warnings.push(EmlError::MissingBoundary);
                    out.push(leaf(&content_type, media_type.as_ref(), part.body, headers));
                }
            }
        }
        Ok(())
    }
}

fn classify(media_type: Option<&MediaType>) -> Kind {
    match media_type {
        Some(mt) if mt.is_multipart() => match mt.boundary() {
            Some(boundary) => Kind::Multipart(boundary.to_string()),
            None => Kind::MultipartWithoutBoundary,
        },
        _ => Kind::Leaf,
    }
}

/// Build a leaf part. A part without Content-Type is `text/plain`.
fn leaf(content_type: &str, media_type: Option<&MediaType>, data: &[u8], headers: HeaderMap) -> Part {
    let declared = content_type.trim();
    let media = match media_type {
        Some(mt) => mt.essence(),
        None if declared.is_empty() => "text/plain".to_string(),
        None => declared.to_string(),
    };
    let charset = media_type
        .and_then(MediaType::charset)
        .map(str::to_string)
        .or_else(|| charset_from_pattern(declared))
        .unwrap_or_else(|| DEFAULT_CHARSET.to_string());

    Part {
        media_type: media,
        charset,
        raw_data: data.to_vec(),
        headers,
    }
}

/// Last-resort charset lookup for Content-Type values that did not parse.
fn charset_from_pattern(content_type: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)charset\s*=\s*"?([^";\s]+)"#).expect("valid charset pattern")
    });
    pattern
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn header_map(part: &raw::RawMessage<'_>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for header in &part.headers {
        headers.add(
            &decode_header_bytes(header.key),
            decode_header_bytes(&header.value).trim(),
        );
    }
    headers
}

/// Slice `body` into the raw parts between `--boundary` delimiter lines.
///
/// The preamble and epilogue are dropped, and so is the line break that
/// precedes each delimiter. Without a close delimiter the last part runs to
/// the end of the body.
fn split_parts<'a>(body: &'a [u8], boundary: &str) -> Result<Vec<&'a [u8]>> {
    let dash_boundary = format!("--{boundary}");
    let dash_boundary = dash_boundary.as_bytes();

    let mut parts = Vec::new();
    let mut current: Option<usize> = None;
    let mut closed = false;
    let mut pos = 0;

    while pos < body.len() {
        let line_end = body[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(body.len(), |i| pos + i);
        let next = (line_end + 1).min(body.len());
        let line = &body[pos..line_end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        if let Some(rest) = line.strip_prefix(dash_boundary) {
            let (is_close, padding) = match rest.strip_prefix(b"--") {
                Some(after) => (true, after),
                None => (false, rest),
            };
            if padding.iter().all(|&b| b == b' ' || b == b'\t') {
                if let Some(start) = current.take() {
                    parts.push(&body[start..part_end(body, start, pos)]);
                }
                if is_close {
                    closed = true;
                    break;
                }
                current = Some(next);
            }
        }
        pos = next;
    }

    match current {
        Some(start) => {
            debug!(boundary, "Multipart body without close delimiter");
            parts.push(&body[start..]);
        }
        None if parts.is_empty() && !closed => {
            return Err(EmlError::Multipart(format!(
                "no delimiter line for boundary '{boundary}'"
            )));
        }
        None => {}
    }
    Ok(parts)
}

/// End of a part whose following delimiter line starts at `delimiter`.
fn part_end(body: &[u8], start: usize, delimiter: usize) -> usize {
    let end = if body[..delimiter].ends_with(b"\r\n") {
        delimiter - 2
    } else if body[..delimiter].ends_with(b"\n") {
        delimiter - 1
    } else {
        delimiter
    };
    end.max(start)
}
