//! Extracted attachments.

/// An attachment whose transfer encoding has been reversed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Filename from `Content-Disposition`, RFC 2047 encoded words resolved.
    pub filename: String,

    /// Media type of the part it came from (e.g. `"application/pdf"`).
    pub content_type: String,

    /// Decoded content. Holds the still-encoded bytes if decoding failed.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Decoded size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
