//! Transport traits for APDU communication with cards
//!
//! A transport moves raw APDU bytes to and from a contactless card. It also
//! owns the RF field: callers say per exchange whether the field must be
//! (re)activated first and whether it stays on afterwards.

pub mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
#[cfg(any(test, feature = "mock"))]
pub use mock::MockTransport;
use tracing::{debug, trace};

/// Field handling requested for a single exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMode {
    /// Power the field up before sending (after a prior drop, this forces the
    /// card back to its initial state)
    pub activate: bool,
    /// Leave the field on once the response is received
    pub keep_on: bool,
}

impl FieldMode {
    /// Leave the field as it is and keep it on afterwards
    pub const KEEP: Self = Self::new(false, true);

    /// Create a new field mode
    pub const fn new(activate: bool, keep_on: bool) -> Self {
        Self { activate, keep_on }
    }

    /// Activate the field and keep it on afterwards
    pub const fn activate() -> Self {
        Self::new(true, true)
    }
}

impl Default for FieldMode {
    fn default() -> Self {
        Self::KEEP
    }
}

/// Trait for contactless card transports
///
/// A transport is responsible for sending and receiving raw APDU bytes.
/// It has no knowledge of command structure, secure channels, or protocol details.
pub trait CardTransport: Send + fmt::Debug {
    /// Send raw APDU bytes to the card and return the raw response bytes
    fn transmit_raw(&mut self, command: &[u8], field: FieldMode) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), ?field, "Transmitting raw command");
        let result = self.do_transmit_raw(command, field);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of `transmit_raw`
    ///
    /// This is the method that concrete implementations should override.
    fn do_transmit_raw(&mut self, command: &[u8], field: FieldMode) -> Result<Bytes, TransportError>;

    /// Switch the RF field off
    ///
    /// The next exchange with `FieldMode::activate` powers it up again.
    fn drop_field(&mut self) -> Result<(), TransportError>;

    /// Check if the transport currently reaches a card
    fn is_connected(&self) -> bool;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn do_transmit_raw(&mut self, command: &[u8], field: FieldMode) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command, field)
    }

    fn drop_field(&mut self) -> Result<(), TransportError> {
        (**self).drop_field()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
