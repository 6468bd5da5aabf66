use cipurse_apdu_core::{CommandError, ResponseError, StatusWord, TransportError};

/// Result type for CIPURSE operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for CIPURSE operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Command data exceeds what a single exchange may carry
    #[error("Command data too long: {length} bytes (maximum {max})")]
    CommandTooLong {
        /// Actual data length
        length: usize,
        /// Largest accepted data length
        max: usize,
    },

    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// APDU encoding errors
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Response shorter than a status word
    #[error("Response too short: {0} bytes")]
    ResponseTooShort(usize),

    /// Secure messaging integrity failure
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// Response payload has an unexpected length
    #[error("{operation}: expected {expected} bytes, got {actual}")]
    ProtocolShape {
        /// Operation that received the payload
        operation: &'static str,
        /// Expected payload length
        expected: usize,
        /// Received payload length
        actual: usize,
    },

    /// Card reported an error status
    #[error("Card returned {status}: {description}")]
    Card {
        /// Status word returned by the card
        status: StatusWord,
        /// Human readable description of the status word
        description: &'static str,
    },

    /// Mutual authentication failed
    #[error(transparent)]
    Authentication(#[from] AuthFailure),

    /// A secured level was requested without session keys
    #[error("Secure session not established")]
    SessionRequired,

    /// Malformed file or response contents
    #[error("Invalid data: {0}")]
    InvalidData(&'static str),
}

impl From<ResponseError> for Error {
    fn from(error: ResponseError) -> Self {
        match error {
            ResponseError::Incomplete(length) => Self::ResponseTooShort(length),
            ResponseError::Parse(message) => Self::InvalidData(message),
        }
    }
}

/// Secure messaging integrity errors
///
/// Any of these clears the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    /// Protected response is too short to carry a MAC
    #[error("Protected response of {0} bytes carries no MAC")]
    MissingMac(usize),

    /// Response MAC does not verify
    #[error("Response MAC mismatch")]
    MacMismatch,

    /// Decrypted payload is not correctly padded or not block aligned
    #[error("Invalid padding in encrypted response")]
    Padding,
}

/// Reasons a mutual authentication can fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    /// Card rejected GET CHALLENGE
    #[error("Card rejected GET CHALLENGE with {0}")]
    ChallengeRejected(StatusWord),

    /// Card rejected the host cryptogram (6988)
    #[error("Wrong key")]
    WrongKey,

    /// Card does not know the referenced key (6A88)
    #[error("Wrong key number")]
    WrongKeyIndex,

    /// Card returned some other error status
    #[error("Card error {status}: {description}")]
    CardError {
        /// Status word returned by the card
        status: StatusWord,
        /// Human readable description of the status word
        description: &'static str,
    },

    /// Card confirmation has the wrong length
    #[error("Card confirmation is {0} bytes, expected 16")]
    ConfirmationShape(usize),

    /// Card confirmation does not match the expected cryptogram
    #[error("Card confirmation mismatch")]
    ConfirmationMismatch,
}

impl AuthFailure {
    /// Classify a MUTUAL AUTHENTICATE error status
    pub fn from_status(status: StatusWord) -> Self {
        use crate::constants::status::{WRONG_KEY, WRONG_KEY_INDEX};

        match status {
            WRONG_KEY => Self::WrongKey,
            WRONG_KEY_INDEX => Self::WrongKeyIndex,
            status => Self::CardError {
                status,
                description: status.description(),
            },
        }
    }
}
