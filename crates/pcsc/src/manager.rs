//! Reader discovery and connection

use pcsc::{Context, Scope};
use tracing::debug;

use crate::{config::PcscConfig, error::PcscError, reader::PcscReader, transport::PcscTransport};

/// Manager for PC/SC device operations
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    /// PC/SC context
    context: Context,
}

impl PcscDeviceManager {
    /// Create a new PC/SC device manager
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let readers = self.context.list_readers_owned()?;
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut result = Vec::with_capacity(readers.len());
        for reader_name in readers {
            let mut reader_states = vec![pcsc::ReaderState::new(
                reader_name.as_c_str(),
                pcsc::State::UNAWARE,
            )];

            match self.context.get_status_change(None, &mut reader_states) {
                Ok(()) => result.push(PcscReader::from_reader_state(&reader_states[0])),
                Err(e) => {
                    // Without a status the reader is reported empty
                    debug!(reader = ?reader_name, error = %e, "Failed to query reader status");
                    result.push(PcscReader::new(
                        reader_name.to_string_lossy().into_owned(),
                        false,
                        None,
                    ));
                }
            }
        }

        Ok(result)
    }

    /// Open a connection to a specific reader
    pub fn open_reader(&self, reader_name: &str) -> PcscTransport {
        self.open_reader_with_config(reader_name, PcscConfig::default())
    }

    /// Open a connection to a specific reader with custom configuration
    pub fn open_reader_with_config(&self, reader_name: &str, config: PcscConfig) -> PcscTransport {
        PcscTransport::new(self.context.clone(), reader_name, config)
    }

    /// Open the first reader that currently holds a card
    pub fn open_first_card(&self, config: PcscConfig) -> Result<PcscTransport, PcscError> {
        let readers = self.list_readers()?;
        let reader = readers
            .iter()
            .find(|reader| reader.has_card())
            .ok_or_else(|| PcscError::NoCard("no reader with a card".to_string()))?;
        Ok(self.open_reader_with_config(reader.name(), config))
    }
}
