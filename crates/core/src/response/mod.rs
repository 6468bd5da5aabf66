//! APDU response definitions
//!
//! This module provides types for working with APDU responses
//! according to ISO/IEC 7816-4.

pub mod error;
pub mod status;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use error::ResponseError;
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response payload data (may be empty)
    payload: Bytes,
    /// Status word
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: impl Into<Bytes>, status: StatusWord) -> Self {
        Self {
            payload: payload.into(),
            status,
        }
    }

    /// Create a success response
    pub fn success(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, status::common::SUCCESS)
    }

    /// Create a response carrying only a status word
    pub fn status_only(status: StatusWord) -> Self {
        Self::new(Bytes::new(), status)
    }

    /// Split raw response bytes into payload and status word
    ///
    /// The payload is a zero-copy slice of `data`.
    pub fn from_bytes(data: &Bytes) -> Result<Self, ResponseError> {
        let len = data.len();
        if len < 2 {
            return Err(ResponseError::Incomplete(len));
        }

        let status = StatusWord::new(data[len - 2], data[len - 1]);
        let payload = data.slice(..len - 2);

        trace!(
            sw = %status,
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self { payload, status })
    }

    /// Get the response payload
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the response, returning its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Get the status word
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the response indicates success
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Encode as raw bytes: `payload ‖ SW1 SW2`
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 2);
        buf.put_slice(&self.payload);
        buf.put_slice(&self.status.to_bytes());
        buf.freeze()
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = ResponseError;

    fn try_from(data: &[u8]) -> Result<Self, ResponseError> {
        Self::from_bytes(&Bytes::copy_from_slice(data))
    }
}

impl TryFrom<Bytes> for Response {
    type Error = ResponseError;

    fn try_from(data: Bytes) -> Result<Self, ResponseError> {
        Self::from_bytes(&data)
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        response.to_bytes()
    }
}
