//! Header semantic resolver: routes raw headers to typed [`Message`] fields.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::ParseOptions;
use crate::error::{EmlError, Result};
use crate::model::address::Address;
use crate::model::message::{Header, Message};
use crate::parser::address::{parse_address_list, parse_single_address};
use crate::parser::date::parse_date;
use crate::parser::decode::decode_header_bytes;
use crate::parser::encoded_word::decode_encoded_words;
use crate::parser::raw::RawHeader;

/// Length of [`Message::id`].
const SHORT_ID_LEN: usize = 20;

/// Fill the header fields of `message` from `headers`, in order.
///
/// Encoded-word and date problems are pushed onto `warnings`. An address
/// that does not parse aborts with [`EmlError::HeaderDecode`], unless
/// `options.ignore_header_errors` is set, in which case it becomes a warning
/// and the header is skipped.
pub fn resolve_headers(
    headers: &[RawHeader<'_>],
    message: &mut Message,
    options: &ParseOptions,
    warnings: &mut Vec<EmlError>,
) -> Result<()> {
    for raw in headers {
        let key = decode_header_bytes(raw.key);
        let value = decode_header_bytes(&raw.value);
        let decoded = match decode_encoded_words(&value) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(header = %key, error = %e, "Keeping undecoded header value");
                warnings.push(EmlError::header(&key, e));
                value.clone()
            }
        };
        message.full_headers.push(Header {
            key: key.clone(),
            value: decoded.clone(),
        });

        match key.to_ascii_lowercase().as_str() {
            "content-type" => message.content_type = value.trim().to_string(),
            "message-id" => {
                message.message_id = strip_id(&value).to_string();
                message.id = short_id(&message.message_id);
            }
            "in-reply-to" => message.in_reply_to.extend(split_ids(&value)),
            "references" => message.references.extend(split_ids(&value)),
            "date" => {
                message.date = parse_date(&value);
                if message.date.is_none() {
                    debug!(date = %value, "Unparsable Date header");
                    warnings.push(EmlError::InvalidDate(value.trim().to_string()));
                }
            }
            "from" => extend_addresses(&key, &value, &mut message.from, options, warnings)?,
            "reply-to" => extend_addresses(&key, &value, &mut message.reply_to, options, warnings)?,
            "to" => extend_addresses(&key, &value, &mut message.to, options, warnings)?,
            "cc" => extend_addresses(&key, &value, &mut message.cc, options, warnings)?,
            "bcc" => extend_addresses(&key, &value, &mut message.bcc, options, warnings)?,
            "sender" => match parse_single_address(&value) {
                Ok(address) => message.sender = Some(address),
                Err(e) => header_failure(&key, e, options, warnings)?,
            },
            "subject" => message.subject = decoded,
            "comments" => message.comments.push(value),
            "keywords" => message.keywords.extend(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string),
            ),
            _ => message.opt_headers.push(Header {
                key,
                value: decoded,
            }),
        }
    }

    if message.sender.is_none() {
        message.sender = message.from.first().cloned();
    }
    Ok(())
}

fn extend_addresses(
    key: &str,
    value: &str,
    field: &mut Vec<Address>,
    options: &ParseOptions,
    warnings: &mut Vec<EmlError>,
) -> Result<()> {
    match parse_address_list(value) {
        Ok(list) => {
            field.extend(list);
            Ok(())
        }
        Err(e) => header_failure(key, e, options, warnings),
    }
}

/// Fatal unless header errors are ignored.
fn header_failure(
    key: &str,
    error: EmlError,
    options: &ParseOptions,
    warnings: &mut Vec<EmlError>,
) -> Result<()> {
    let error = EmlError::header(key, error);
    if options.ignore_header_errors {
        warn!(header = key, error = %error, "Ignoring header error");
        warnings.push(error);
        Ok(())
    } else {
        Err(error)
    }
}

/// `" <abc@x> "` → `"abc@x"`
fn strip_id(value: &str) -> &str {
    value.trim_matches(|c: char| c == '<' || c == '>' || c.is_whitespace())
}

/// Whitespace-separated message ids with their angle brackets removed.
fn split_ids(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split_whitespace()
        .map(|id| id.trim_matches(|c| c == '<' || c == '>' || c == ' ').to_string())
        .filter(|id| !id.is_empty())
}

/// Short stable identifier derived from a Message-ID.
pub fn short_id(message_id: &str) -> String {
    if message_id.is_empty() {
        return String::new();
    }
    let digest = Sha256::digest(message_id.as_bytes());
    let mut encoded = URL_SAFE.encode(digest);
    encoded.truncate(SHORT_ID_LEN);
    encoded
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;

    fn raw<'a>(key: &'a str, value: &'a str) -> RawHeader<'a> {
        RawHeader {
            key: key.as_bytes(),
            value: Cow::Borrowed(value.as_bytes()),
        }
    }

    fn resolve(headers: &[RawHeader<'_>], options: &ParseOptions) -> (Result<()>, Message, Vec<EmlError>) {
        let mut message = Message::default();
        let mut warnings = Vec::new();
        let result = resolve_headers(headers, &mut message, options, &mut warnings);
        (result, message, warnings)
    }

    #[test]
    fn test_typed_fields() {
        let headers = [
            raw("Message-ID", " <abc@example.com> "),
            raw("Subject", "=?UTF-8?Q?Caf=C3=A9?= menu"),
            raw("Date", "Thu, 04 Jan 2024 10:00:00 +0000"),
            raw("From", "Alice <alice@x.com>"),
            raw("To", "bob@y.com, carol@z.com"),
            raw("In-Reply-To", "<p1@x>"),
            raw("References", "<r1@x>\t<r2@x>"),
            raw("Keywords", "work, urgent ,"),
            raw("Comments", "first"),
            raw("Content-Type", "text/plain; charset=utf-8"),
            raw("X-Mailer", "test"),
        ];
        let (result, msg, warnings) = resolve(&headers, &ParseOptions::default());
        result.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(msg.message_id, "abc@example.com");
        assert_eq!(msg.id.len(), 20);
        assert_eq!(msg.subject, "Café menu");
        assert_eq!(
            msg.date.map(|d| d.to_rfc3339()).as_deref(),
            Some("2024-01-04T10:00:00+00:00")
        );
        assert_eq!(msg.from.len(), 1);
        assert_eq!(msg.to.len(), 2);
        assert_eq!(msg.in_reply_to, vec!["p1@x"]);
        assert_eq!(msg.references, vec!["r1@x", "r2@x"]);
        assert_eq!(msg.keywords, vec!["work", "urgent"]);
        assert_eq!(msg.comments, vec!["first"]);
        assert_eq!(msg.content_type, "text/plain; charset=utf-8");
        assert_eq!(msg.full_headers.len(), headers.len());
        assert_eq!(msg.full_headers[1].value, "Café menu");
        assert_eq!(
            msg.opt_headers,
            vec![Header {
                key: "X-Mailer".into(),
                value: "test".into()
            }]
        );
    }

    #[test]
    fn test_sender_falls_back_to_first_from() {
        let headers = [raw("From", "a@x.com, b@x.com")];
        let (_, msg, _) = resolve(&headers, &ParseOptions::default());
        assert_eq!(
            msg.sender.map(|s| s.to_string()).as_deref(),
            Some("a@x.com")
        );
    }

    #[test]
    fn test_explicit_sender_kept() {
        let headers = [raw("From", "a@x.com"), raw("Sender", "s@x.com")];
        let (_, msg, _) = resolve(&headers, &ParseOptions::default());
        assert_eq!(msg.sender.map(|s| s.to_string()).as_deref(), Some("s@x.com"));
    }

    #[test]
    fn test_duplicate_headers() {
        let headers = [
            raw("To", "a@x.com"),
            raw("To", "b@x.com"),
            raw("Subject", "one"),
            raw("Subject", "two"),
        ];
        let (_, msg, _) = resolve(&headers, &ParseOptions::default());
        assert_eq!(msg.to.len(), 2);
        assert_eq!(msg.subject, "two");
    }

    #[test]
    fn test_bad_address_is_fatal() {
        let headers = [raw("To", "not an address"), raw("Subject", "s")];
        let (result, _, _) = resolve(&headers, &ParseOptions::default());
        match result {
            Err(EmlError::HeaderDecode { header, .. }) => assert_eq!(header, "To"),
            other => panic!("expected header error, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_address_ignored() {
        let options = ParseOptions {
            ignore_header_errors: true,
            ..ParseOptions::default()
        };
        let headers = [
            raw("To", "not an address"),
            raw("Sender", "\"unterminated"),
            raw("Subject", "still here"),
        ];
        let (result, msg, warnings) = resolve(&headers, &options);
        result.unwrap();
        assert_eq!(msg.subject, "still here");
        assert!(msg.to.is_empty());
        assert_eq!(warnings.len(), 2);
        assert!(warnings
            .iter()
            .all(|w| matches!(w, EmlError::HeaderDecode { .. })));
    }

    #[test]
    fn test_unparsable_date_is_warning() {
        let headers = [raw("Date", "yesterday-ish")];
        let (result, msg, warnings) = resolve(&headers, &ParseOptions::default());
        result.unwrap();
        assert!(msg.date.is_none());
        assert!(matches!(warnings.as_slice(), [EmlError::InvalidDate(_)]));
    }

    #[test]
    fn test_bad_encoded_word_falls_back() {
        let headers = [raw("Subject", "=?x-nope?Q?abc?=")];
        let (result, msg, warnings) = resolve(&headers, &ParseOptions::default());
        result.unwrap();
        assert_eq!(msg.subject, "=?x-nope?Q?abc?=");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_latin1_header_bytes() {
        let headers = [RawHeader {
            key: b"Subject",
            value: Cow::Borrowed(b"Gr\xfc\xdfe"),
        }];
        let (_, msg, _) = resolve(&headers, &ParseOptions::default());
        assert_eq!(msg.subject, "Grüße");
    }

    #[test]
    fn test_short_id_stable() {
        assert_eq!(short_id("abc@example.com"), short_id("abc@example.com"));
        assert_ne!(short_id("abc@example.com"), short_id("abd@example.com"));
        assert!(short_id("").is_empty());
        assert!(short_id("x")
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
