//! Centralized error types for emlparse.
//!
//! The same enum serves both error classes of a parse: a fatal failure is
//! returned as `Err`, while non-fatal issues are collected into
//! [`Parsed::warnings`](crate::parser::eml::Parsed::warnings).

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the emlparse library.
#[derive(Error, Debug)]
pub enum EmlError {
    /// The input ended before the blank line separating headers from body.
    #[error("Unexpected end of input: no header/body separator found")]
    UnexpectedEndOfInput,

    /// A typed header could not be interpreted.
    #[error("Cannot decode '{header}' header: {source}")]
    HeaderDecode {
        header: String,
        #[source]
        source: Box<EmlError>,
    },

    /// The address lexer met a byte sequence it cannot tokenize.
    #[error("Address lexing failed at offset {offset}: {reason}")]
    AddressLex { offset: usize, reason: String },

    /// The address tokens do not form a mailbox, group or list.
    #[error("Address grammar error: {0}")]
    AddressGrammar(String),

    /// A Content-Type value is not a `type/subtype` media type.
    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),

    /// A `multipart/*` media type has no `boundary` parameter.
    #[error("Multipart body declared without a boundary parameter")]
    MissingBoundary,

    /// The multipart body could not be split.
    #[error("Malformed multipart body: {0}")]
    Multipart(String),

    /// Multipart nesting is deeper than the configured limit.
    #[error("Multipart nesting exceeds the maximum depth of {0}")]
    NestingTooDeep(usize),

    /// The character encoding is not supported.
    #[error("Unsupported charset: {0}")]
    UnsupportedCharset(String),

    /// An RFC 2047 encoded word could not be decoded.
    #[error("Malformed encoded word: {0}")]
    MalformedEncodedWord(String),

    /// Base64 content could not be decoded.
    #[error("Invalid base64 content: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// An attachment part carries no usable filename.
    #[error("Attachment without filename in Content-Disposition")]
    MissingFilename,

    /// The Date header could not be parsed.
    #[error("Unparsable date: {0}")]
    InvalidDate(String),

    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("EML file not found: {0}")]
    FileNotFound(PathBuf),
}

/// Convenience alias for `Result<T, EmlError>`.
pub type Result<T> = std::result::Result<T, EmlError>;

impl EmlError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a sub-parser failure with the name of the header it came from.
    pub fn header(header: impl Into<String>, source: EmlError) -> Self {
        Self::HeaderDecode {
            header: header.into(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_error_keeps_source() {
        let err = EmlError::header("To", EmlError::AddressGrammar("missing '@'".into()));
        assert_eq!(
            err.to_string(),
            "Cannot decode 'To' header: Address grammar error: missing '@'"
        );
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("Address grammar error: missing '@'"));
    }

    #[test]
    fn test_io_helper() {
        let err = EmlError::io(
            "/tmp/x.eml",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("/tmp/x.eml"));
    }
}
