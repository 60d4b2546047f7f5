//! Leaf MIME parts and their headers.

use std::collections::BTreeMap;

/// Part headers keyed by canonical MIME name (`content-type` → `Content-Type`).
///
/// Values keep their original order per key. Lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: BTreeMap<String, Vec<String>>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under the canonical form of `name`.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .entry(canonical_name(name))
            .or_default()
            .push(value.into());
    }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&canonical_name(name))
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// All values for `name`, in order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.entries
            .get(&canonical_name(name))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&canonical_name(name))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct header names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate `(name, values)` in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Canonical MIME header name: each `-`-separated word capitalized.
pub fn canonical_name(name: &str) -> String {
    name.trim()
        .split('-')
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// A leaf MIME body part. Multipart containers never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Lower-case `type/subtype`, or the raw Content-Type value when it
    /// could not be parsed.
    pub media_type: String,
    /// Declared charset, `UTF-8` when none was declared.
    pub charset: String,
    /// Part content exactly as it appeared in the message (still
    /// transfer-encoded).
    pub raw_data: Vec<u8>,
    pub headers: HeaderMap,
}

impl Part {
    /// Whether the media type names `text/plain`.
    pub fn is_plain_text(&self) -> bool {
        self.media_type.to_ascii_lowercase().contains("text/plain")
    }

    /// Whether the media type names `text/html`.
    pub fn is_html(&self) -> bool {
        self.media_type.to_ascii_lowercase().contains("text/html")
    }

    /// Whether the Content-Disposition marks this part as an attachment.
    pub fn is_attachment(&self) -> bool {
        self.headers
            .get("Content-Disposition")
            .is_some_and(|cd| cd.to_ascii_lowercase().contains("attachment"))
    }
}
