//! Per-part decoding: text bodies and attachments.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::config::ParseOptions;
use crate::error::{EmlError, Result};
use crate::model::attachment::Attachment;
use crate::model::part::Part;
use crate::parser::decode::{charset_transcode, TransferEncoding};
use crate::parser::encoded_word::decode_encoded_words;
use crate::parser::media_type::{parse_content_disposition, parse_media_type};

/// What the leaf parts of a message decode to.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DecodedContent {
    /// Last `text/plain` part, UTF-8 unless transcoding failed.
    pub text: Option<Vec<u8>>,
    /// Last `text/html` part, same caveat as `text`.
    pub html: Option<Vec<u8>>,
    pub attachments: Vec<Attachment>,
}

/// Decode every part in order.
///
/// Nothing here is fatal: each failure keeps the undecoded bytes (or skips
/// the attachment when it has no filename) and is pushed onto `warnings`.
pub fn decode_parts(
    parts: &[Part],
    options: &ParseOptions,
    warnings: &mut Vec<EmlError>,
) -> DecodedContent {
    let mut content = DecodedContent::default();

    for part in parts {
        if part.is_plain_text() {
            content.text = Some(decode_text(part, options, warnings));
        } else if part.is_html() {
            content.html = Some(decode_text(part, options, warnings));
        } else if part.is_attachment() {
            match decode_attachment(part, warnings) {
                Ok(attachment) => content.attachments.push(attachment),
                Err(e) => {
                    warn!(media_type = %part.media_type, error = %e, "Skipping attachment");
                    warnings.push(e);
                }
            }
        }
    }
    content
}

/// Transfer-decode (optionally) and transcode a text part to UTF-8.
pub fn decode_text(part: &Part, options: &ParseOptions, warnings: &mut Vec<EmlError>) -> Vec<u8> {
    let data = if options.decode_text_transfer_encoding {
        transfer_decode(part, warnings)
    } else {
        part.raw_data.clone()
    };

    match charset_transcode(&part.charset, &data) {
        Ok(utf8) => utf8,
        Err(e) => {
            warn!(charset = %part.charset, error = %e, "Keeping text part undecoded");
            warnings.push(e);
            data
        }
    }
}

/// Build an attachment from a part marked `Content-Disposition: attachment`.
///
/// Fails with [`EmlError::MissingFilename`] when no filename can be found.
pub fn decode_attachment(part: &Part, warnings: &mut Vec<EmlError>) -> Result<Attachment> {
    let raw_name = attachment_filename(part).ok_or(EmlError::MissingFilename)?;
    let filename = match decode_encoded_words(&raw_name) {
        Ok(name) => name,
        Err(e) => {
            debug!(filename = %raw_name, error = %e, "Keeping raw attachment filename");
            warnings.push(e);
            raw_name
        }
    };

    Ok(Attachment {
        filename,
        content_type: part.media_type.clone(),
        data: transfer_decode(part, warnings),
    })
}

/// Reverse the part's Content-Transfer-Encoding, keeping the raw bytes when
/// base64 decoding fails.
fn transfer_decode(part: &Part, warnings: &mut Vec<EmlError>) -> Vec<u8> {
    let encoding = TransferEncoding::parse(
        part.headers
            .get("Content-Transfer-Encoding")
            .unwrap_or_default(),
    );
    match encoding.decode(&part.raw_data) {
        Ok(data) => data,
        Err(e) => {
            warn!(encoding = %encoding, error = %e, "Keeping part data undecoded");
            warnings.push(e);
            part.raw_data.clone()
        }
    }
}

/// Find the filename of an attachment part.
///
/// Tries a plain `name="..."` match on Content-Disposition first, then the
/// parsed `filename` parameter (unquoted or RFC 2231), then the Content-Type
/// `name` parameter.
fn attachment_filename(part: &Part) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r#"(?msi)name="(.*?)""#).expect("valid filename pattern"));

    let disposition = part.headers.get("Content-Disposition").unwrap_or_default();
    if let Some(name) = pattern
        .captures(disposition)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| !name.trim().is_empty())
    {
        return Some(name.to_string());
    }

    if let Some(name) = parse_content_disposition(disposition).filename() {
        return Some(name.to_string());
    }

    part.headers
        .get("Content-Type")
        .and_then(|ct| parse_media_type(ct).ok())
        .and_then(|mt| mt.parameter("name").map(str::to_string))
        .filter(|name| !name.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::part::HeaderMap;

    fn part(media_type: &str, charset: &str, data: &[u8], headers: &[(&str, &str)]) -> Part {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.add(k, *v);
        }
        Part {
            media_type: media_type.into(),
            charset: charset.into(),
            raw_data: data.to_vec(),
            headers: map,
        }
    }

    #[test]
    fn test_text_transcoded() {
        let parts = [part("text/plain", "iso-8859-1", b"caf\xe9", &[])];
        let mut warnings = Vec::new();
        let content = decode_parts(&parts, &ParseOptions::default(), &mut warnings);
        assert_eq!(content.text.as_deref(), Some("café".as_bytes()));
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_unknown_charset_keeps_raw() {
        let parts = [part("text/plain", "x-unknown", b"raw \xff", &[])];
        let mut warnings = Vec::new();
        let content = decode_parts(&parts, &ParseOptions::default(), &mut warnings);
        assert_eq!(content.text.as_deref(), Some(&b"raw \xff"[..]));
        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], EmlError::UnsupportedCharset(_)));
    }

    #[test]
    fn test_quoted_printable_text() {
        let parts = [part(
            "text/html",
            "utf-8",
            b"<p>caf=C3=A9=\r\n!</p>",
            &[("Content-Transfer-Encoding", "quoted-printable")],
        )];
        let mut warnings = Vec::new();
        let content = decode_parts(&parts, &ParseOptions::default(), &mut warnings);
        assert_eq!(content.html.as_deref(), Some("<p>café!</p>".as_bytes()));

        let options = ParseOptions {
            decode_text_transfer_encoding: false,
            ..ParseOptions::default()
        };
        let content = decode_parts(&parts, &options, &mut warnings);
        assert_eq!(content.html.as_deref(), Some(&b"<p>caf=C3=A9=\r\n!</p>"[..]));
    }

    #[test]
    fn test_last_text_part_wins() {
        let parts = [
            part("text/plain", "utf-8", b"first", &[]),
            part("text/plain", "utf-8", b"second", &[]),
        ];
        let content = decode_parts(&parts, &ParseOptions::default(), &mut Vec::new());
        assert_eq!(content.text.as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn test_base64_attachment() {
        let parts = [part(
            "application/pdf",
            "UTF-8",
            b"JVBERi0xLjQK\r\n",
            &[
                ("Content-Disposition", "attachment; filename=\"report.pdf\""),
                ("Content-Transfer-Encoding", "base64"),
            ],
        )];
        let content = decode_parts(&parts, &ParseOptions::default(), &mut Vec::new());
        assert_eq!(content.attachments.len(), 1);
        let att = &content.attachments[0];
        assert_eq!(att.filename, "report.pdf");
        assert_eq!(att.content_type, "application/pdf");
        assert_eq!(att.data, b"%PDF-1.4\n");
    }

    #[test]
    fn test_quoted_printable_attachment() {
        let parts = [part(
            "application/octet-stream",
            "UTF-8",
            b"caf=C3=A9=\r\nbar",
            &[
                ("Content-Disposition", "attachment; filename=\"notes.txt\""),
                ("Content-Transfer-Encoding", "quoted-printable"),
            ],
        )];
        let mut warnings = Vec::new();
        let content = decode_parts(&parts, &ParseOptions::default(), &mut warnings);
        assert_eq!(content.attachments.len(), 1);
        let att = &content.attachments[0];
        assert_eq!(att.filename, "notes.txt");
        assert_eq!(att.data, "caf\u{e9}bar".as_bytes());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_invalid_base64_keeps_raw() {
        let parts = [part(
            "application/octet-stream",
            "UTF-8",
            b"@@@",
            &[
                ("Content-Disposition", "attachment; filename=\"x.bin\""),
                ("Content-Transfer-Encoding", "base64"),
            ],
        )];
        let mut warnings = Vec::new();
        let content = decode_parts(&parts, &ParseOptions::default(), &mut warnings);
        assert_eq!(content.attachments[0].data, b"@@@");
        assert!(matches!(warnings[0], EmlError::InvalidBase64(_)));
    }

    #[test]
    fn test_missing_filename_skips_attachment() {
        let parts = [part(
            "application/octet-stream",
            "UTF-8",
            b"data",
            &[("Content-Disposition", "attachment")],
        )];
        let mut warnings = Vec::new();
        let content = decode_parts(&parts, &ParseOptions::default(), &mut warnings);
        assert!(content.attachments.is_empty());
        assert!(matches!(warnings[0], EmlError::MissingFilename));
    }

    #[test]
    fn test_filename_fallbacks() {
        let unquoted = part(
            "image/png",
            "UTF-8",
            b"",
            &[("Content-Disposition", "attachment; filename=logo.png")],
        );
        assert_eq!(attachment_filename(&unquoted).as_deref(), Some("logo.png"));

        let extended = part(
            "text/csv",
            "UTF-8",
            b"",
            &[(
                "Content-Disposition",
                "attachment; filename*=UTF-8''%E2%82%AC.csv",
            )],
        );
        assert_eq!(attachment_filename(&extended).as_deref(), Some("€.csv"));

        let from_type = part(
            "application/zip",
            "UTF-8",
            b"",
            &[
                ("Content-Disposition", "attachment"),
                ("Content-Type", "application/zip; name=bundle.zip"),
            ],
        );
        assert_eq!(attachment_filename(&from_type).as_deref(), Some("bundle.zip"));
    }

    #[test]
    fn test_encoded_filename() {
        let parts = [part(
            "application/pdf",
            "UTF-8",
            b"",
            &[(
                "Content-Disposition",
                "attachment; filename=\"=?UTF-8?Q?r=C3=A9sum=C3=A9.pdf?=\"",
            )],
        )];
        let content = decode_parts(&parts, &ParseOptions::default(), &mut Vec::new());
        assert_eq!(content.attachments[0].filename, "résumé.pdf");
    }

    #[test]
    fn test_inline_non_text_ignored() {
        let parts = [part(
            "image/png",
            "UTF-8",
            b"png",
            &[("Content-Disposition", "inline; filename=\"a.png\"")],
        )];
        let content = decode_parts(&parts, &ParseOptions::default(), &mut Vec::new());
        assert_eq!(content, DecodedContent::default());
    }
}
