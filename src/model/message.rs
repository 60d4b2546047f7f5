//! The assembled message record.

use std::borrow::Cow;

use chrono::{DateTime, Utc};

use super::address::Address;
use super::attachment::Attachment;
use super::part::Part;

/// A header with its value decoded (RFC 2047 encoded words resolved).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// A fully parsed message.
///
/// Built once per parse call and never mutated by the library afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    /// Original header block, without the separating blank line.
    pub raw_headers: Vec<u8>,
    /// Raw body bytes, exactly as they followed the separator.
    pub body: Vec<u8>,

    /// Every header, in original order.
    pub full_headers: Vec<Header>,
    /// Headers that are not mapped to a typed field.
    pub opt_headers: Vec<Header>,

    /// `Message-ID` without angle brackets.
    pub message_id: String,
    /// Short stable identifier derived from the Message-ID.
    pub id: String,
    /// `None` when the Date header is missing or unparsable.
    pub date: Option<DateTime<Utc>>,
    /// Explicit `Sender`, or the first `From` entry.
    pub sender: Option<Address>,
    pub from: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub subject: String,
    /// Raw top-level Content-Type, replaced by the first part's media type
    /// once the body has been walked.
    pub content_type: String,
    pub comments: Vec<String>,
    pub keywords: Vec<String>,
    pub in_reply_to: Vec<String>,
    pub references: Vec<String>,

    /// Plain-text body. Not guaranteed to be UTF-8: fallback paths store
    /// undecoded bytes.
    pub text: Vec<u8>,
    /// HTML body, same caveat as `text`.
    pub html: Vec<u8>,
    pub attachments: Vec<Attachment>,
    /// Leaf parts in document order.
    pub parts: Vec<Part>,
}

impl Message {
    /// First decoded value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.full_headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All decoded values of a header, in order.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.full_headers
            .iter()
            .filter(|h| h.key.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .collect()
    }

    /// `text` as UTF-8, invalid sequences replaced.
    pub fn text_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.text)
    }

    /// `html` as UTF-8, invalid sequences replaced.
    pub fn html_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.html)
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup() {
        let msg = Message {
            full_headers: vec![
                Header {
                    key: "Received".into(),
                    value: "a".into(),
                },
                Header {
                    key: "received".into(),
                    value: "b".into(),
                },
            ],
            ..Message::default()
        };
        assert_eq!(msg.header("RECEIVED"), Some("a"));
        assert_eq!(msg.header_all("Received"), vec!["a", "b"]);
        assert_eq!(msg.header("Subject"), None);
    }

    #[test]
    fn test_text_lossy() {
        let msg = Message {
            text: b"caf\xe9".to_vec(),
            ..Message::default()
        };
        assert_eq!(msg.text_lossy(), "caf\u{fffd}");
    }
}
