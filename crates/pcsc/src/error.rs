//! Error types for PC/SC transport

use cipurse_apdu_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),

    /// Unpowering the card to reset the field failed
    #[error("Failed to unpower card: {0}")]
    FieldReset(pcsc::Error),
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::Pcsc(pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard)
            | PcscError::NoCard(_) => Self::NoCard,
            PcscError::Pcsc(pcsc::Error::Timeout) => Self::Timeout,
            PcscError::Pcsc(
                pcsc::Error::ResetCard | pcsc::Error::UnpoweredCard | pcsc::Error::UnresponsiveCard,
            ) => Self::Transmission,
            PcscError::NoReadersAvailable | PcscError::ReaderNotFound(_) => Self::Connection,
            PcscError::FieldReset(_) => Self::Field,
            PcscError::Pcsc(e) => Self::other(e.to_string()),
        }
    }
}
