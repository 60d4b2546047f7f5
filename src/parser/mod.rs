//! Email parsing pipeline: raw tokenizing, header resolution, MIME walking
//! and content decoding.

pub mod address;
pub mod content;
pub mod date;
pub mod decode;
pub mod eml;
pub mod encoded_word;
pub mod header;
pub mod media_type;
pub mod multipart;
pub mod raw;
