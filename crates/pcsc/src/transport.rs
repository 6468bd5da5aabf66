//! PC/SC transport implementation

use std::{ffi::CString, fmt};

use bytes::Bytes;
use cipurse_apdu_core::{CardTransport, FieldMode, TransportError};
use pcsc::{Card, Context, Disposition};
use tracing::{debug, warn};

use crate::{config::PcscConfig, error::PcscError};

/// Short APDU response: 256 data bytes and the status word
const RESPONSE_BUFFER_SIZE: usize = 258;

/// Transport implementation using PC/SC
///
/// Contactless readers power the RF field together with the card, so
/// dropping the field maps to disconnecting with [`Disposition::UnpowerCard`].
/// The next exchange reconnects, which powers the field up again.
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader_name: String,
    /// Configuration
    config: PcscConfig,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransport {
    /// Create a new PC/SC transport for the specified reader
    pub(crate) fn new(context: Context, reader_name: &str, config: PcscConfig) -> Self {
        let mut transport = Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
            config,
        };

        // A missing card is not fatal here; the first exchange retries
        if let Err(e) = transport.connect_card() {
            debug!(reader = %transport.reader_name, error = %e, "No card connected yet");
        }

        transport
    }

    /// Try to connect to the card
    fn connect_card(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }

        let reader_cstr = CString::new(self.reader_name.clone())
            .map_err(|_| PcscError::ReaderNotFound(self.reader_name.clone()))?;

        match self.context.connect(
            &reader_cstr,
            self.config.share_mode.into(),
            self.config.protocols,
        ) {
            Ok(card) => {
                debug!(reader = %self.reader_name, "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard) => Err(PcscError::NoCard(self.reader_name.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Disconnect from the card with the given disposition.
    ///
    /// On failure the card handle is kept so the connection stays usable.
    fn disconnect(&mut self, disposition: Disposition) -> Result<(), PcscError> {
        let Some(card) = self.card.take() else {
            return Ok(());
        };
        card.disconnect(disposition).map_err(|(card, e)| {
            self.card = Some(card);
            PcscError::FieldReset(e)
        })
    }

    /// Get the ATR of the current card
    pub fn atr(&self) -> Result<Vec<u8>, PcscError> {
        self.card.as_ref().map_or_else(
            || Err(PcscError::NoCard(self.reader_name.clone())),
            |card| {
                card.get_attribute_owned(pcsc::Attribute::AtrString)
                    .map_err(Into::into)
            },
        )
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Check if the transport is connected to a card
    pub const fn has_card(&self) -> bool {
        self.card.is_some()
    }

    /// Transmit a command to the card
    fn transmit_command(&mut self, command: &[u8], retry: bool) -> Result<Bytes, PcscError> {
        self.connect_card()?;

        let Some(card) = self.card.as_mut() else {
            return Err(PcscError::NoCard(self.reader_name.clone()));
        };

        let mut response_buffer = [0u8; RESPONSE_BUFFER_SIZE];
        match card.transmit(command, &mut response_buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e) => {
                // If card was reset or removed, clear our reference
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    self.card = None;

                    if retry && self.config.auto_reconnect && e == pcsc::Error::ResetCard {
                        debug!(reader = %self.reader_name, "Card was reset, reconnecting");
                        return self.transmit_command(command, false);
                    }
                }

                Err(e.into())
            }
        }
    }
}

impl CardTransport for PcscTransport {
    fn do_transmit_raw(&mut self, command: &[u8], field: FieldMode) -> Result<Bytes, TransportError> {
        let result = self.transmit_command(command, true);
        if !field.keep_on {
            // A failed power-down does not discard the response
            if let Err(e) = self.disconnect(Disposition::UnpowerCard) {
                warn!(reader = %self.reader_name, error = %e, "Failed to power down after exchange");
            }
        }
        result.map_err(TransportError::from)
    }

    fn drop_field(&mut self) -> Result<(), TransportError> {
        debug!(reader = %self.reader_name, "Powering down card");
        self.disconnect(Disposition::UnpowerCard).map_err(|e| {
            warn!(reader = %self.reader_name, error = %e, "Field reset failed");
            TransportError::from(e)
        })
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect(Disposition::LeaveCard) {
            warn!(reader = %self.reader_name, error = %e, "Failed to release card");
        }
    }
}
