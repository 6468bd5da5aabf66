//! Scripted transport for exercising channels without a reader

use std::collections::VecDeque;

use bytes::Bytes;

use super::{CardTransport, FieldMode, TransportError};

/// Scripted in-memory transport
///
/// Returns queued responses in order and records every command, its field
/// mode and every field drop.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Responses (or errors) to return, in order
    pub responses: VecDeque<Result<Bytes, TransportError>>,
    /// Commands that were sent
    pub commands: Vec<Bytes>,
    /// Field mode of each sent command
    pub field_modes: Vec<FieldMode>,
    /// Number of `drop_field` calls
    pub field_drops: usize,
    /// Error returned by the next `drop_field` call
    pub field_error: Option<TransportError>,
    /// Whether the transport is connected
    pub connected: bool,
}

impl MockTransport {
    /// Create a new mock transport with the given responses
    pub fn new<I, B>(responses: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            responses: responses.into_iter().map(|r| Ok(r.into())).collect(),
            connected: true,
            ..Default::default()
        }
    }

    /// Queue a transport failure
    pub fn push_error(&mut self, error: TransportError) {
        self.responses.push_back(Err(error));
    }

    /// Total number of transport invocations (exchanges and field drops)
    pub fn invocations(&self) -> usize {
        self.commands.len() + self.field_drops
    }
}

impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8], field: FieldMode) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::Connection);
        }

        self.commands.push(Bytes::copy_from_slice(command));
        self.field_modes.push(field);

        self.responses
            .pop_front()
            .unwrap_or(Err(TransportError::Transmission))
    }

    fn drop_field(&mut self) -> Result<(), TransportError> {
        self.field_drops += 1;
        self.field_error.take().map_or(Ok(()), Err)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
