//! Message assembler: the entry point for parsing `.eml` data.

use std::path::Path;

use tracing::{debug, warn};

use crate::config::ParseOptions;
use crate::error::{EmlError, Result};
use crate::model::message::Message;
use crate::model::part::HeaderMap;
use crate::parser::content::decode_parts;
use crate::parser::decode::decode_header_bytes;
use crate::parser::header::resolve_headers;
use crate::parser::multipart::MultipartWalker;
use crate::parser::raw::{parse_raw, RawHeader};

/// A parsed message plus the non-fatal problems met on the way.
#[derive(Debug)]
pub struct Parsed {
    pub message: Message,
    /// Issues that did not stop the parse, in the order they were found.
    pub warnings: Vec<EmlError>,
}

impl Parsed {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Parse one message from memory.
///
/// Fails when the header/body separator is missing, or on a malformed
/// address header unless `options.ignore_header_errors` is set. Body
/// problems never fail the parse; they end up in [`Parsed::warnings`].
pub fn parse(data: &[u8], options: &ParseOptions) -> Result<Parsed> {
    let data = skip_from_line(data);
    let raw = parse_raw(data)?;

    let mut message = Message {
        raw_headers: raw.header_block.to_vec(),
        body: raw.body.to_vec(),
        ..Message::default()
    };
    let mut warnings = Vec::new();
    resolve_headers(&raw.headers, &mut message, options, &mut warnings)?;

    if message.content_type.is_empty() {
        message.text = raw.body.to_vec();
        return Ok(Parsed { message, warnings });
    }

    let mut walker = MultipartWalker::new(options.max_depth);
    let walked = walker.walk(&message.content_type, raw.body, content_headers(&raw.headers));
    warnings.extend(walker.into_warnings());

    match walked {
        Err(e) => {
            warn!(content_type = %message.content_type, error = %e, "Falling back to raw body");
            warnings.push(e);
            message.text = raw.body.to_vec();
        }
        Ok(parts) if parts.is_empty() => {
            message.text = raw.body.to_vec();
        }
        Ok(parts) => {
            message.content_type = parts[0].media_type.clone();
            message.text = parts[0].raw_data.clone();

            let content = decode_parts(&parts, options, &mut warnings);
            if let Some(text) = content.text {
                message.text = text;
            }
            if let Some(html) = content.html {
                message.html = html;
            }
            message.attachments = content.attachments;
            message.parts = parts;
        }
    }

    debug!(
        parts = message.parts.len(),
        attachments = message.attachments.len(),
        warnings = warnings.len(),
        "Parsed message"
    );
    Ok(Parsed { message, warnings })
}

/// Parse a single `.eml` file.
pub fn parse_eml(path: impl AsRef<Path>, options: &ParseOptions) -> Result<Parsed> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EmlError::FileNotFound(path.to_path_buf())
        } else {
            EmlError::io(path, e)
        }
    })?;
    parse(&data, options)
}

/// The message's own `Content-*` headers, handed to a non-multipart body.
fn content_headers(headers: &[RawHeader<'_>]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for header in headers {
        let key = decode_header_bytes(header.key);
        if key.to_ascii_lowercase().starts_with("content-") {
            map.add(&key, decode_header_bytes(&header.value).trim());
        }
    }
    map
}

/// Skip a UTF-8 BOM and the `From ` separator line of mbox exports.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    match data.iter().position(|&b| b == b'\n') {
        Some(pos) if is_mbox_separator(&data[..pos]) => &data[pos + 1..],
        _ => data,
    }
}

/// `From sender date`, as opposed to a `From :` header with space before the colon.
fn is_mbox_separator(line: &[u8]) -> bool {
    line.strip_prefix(b"From ").is_some_and(|rest| {
        let rest = rest.trim_ascii_start();
        !rest.is_empty() && !rest.starts_with(b":")
    })
}
