//! Core data model types for messages, addresses, parts and attachments.

pub mod address;
pub mod attachment;
pub mod message;
pub mod part;
