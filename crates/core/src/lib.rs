//! Core types for APDU (Application Protocol Data Unit) operations
//!
//! This crate provides the foundational types for talking to contactless smart
//! cards according to ISO/IEC 7816-4:
//!
//! - [`Command`]: a logical command and its short APDU byte encoding
//! - [`Response`] and [`StatusWord`]: response parsing and status descriptions
//! - [`CardTransport`]: the raw byte exchange, including RF field control
//!
//! Secure messaging and protocol logic live in the crates built on top of this one.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod response;
pub mod transport;

pub use command::{Command, CommandError};
pub use response::error::ResponseError;
pub use response::status::StatusWord;
pub use response::Response;
pub use transport::{CardTransport, FieldMode, TransportError};
#[cfg(any(test, feature = "mock"))]
pub use transport::MockTransport;
