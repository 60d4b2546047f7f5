//! `emlparse`: a tolerant parser for `.eml` email messages.
//!
//! This crate turns raw RFC 5322 / MIME bytes into a typed [`Message`]:
//! resolved headers, address lists, dates, decoded text and HTML bodies,
//! and extracted attachments. Malformed input degrades into
//! [`Parsed::warnings`] instead of failing wherever possible.

pub mod config;
pub mod error;
pub mod export;
pub mod model;
pub mod parser;

pub use config::ParseOptions;
pub use error::{EmlError, Result};
pub use model::message::Message;
pub use parser::eml::{parse, parse_eml, Parsed};
