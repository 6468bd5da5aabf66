//! APDU command definitions
//!
//! This module provides the [`Command`] type, a logical ISO/IEC 7816-4 command
//! (header, optional data and optional expected length), together with its
//! short-form byte encoding.

pub mod error;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

pub use error::CommandError;

/// Maximum number of data bytes a short APDU can carry in its Lc field
pub const MAX_SHORT_DATA: usize = 255;

/// Largest expected length a short APDU can request (encoded as `00`)
pub const MAX_SHORT_LE: u16 = 256;

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Command data (optional)
    pub data: Option<Bytes>,
    /// Expected response length, `1..=256` (optional)
    pub le: Option<u16>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Set the expected length field
    ///
    /// An expected length of `0` requests the maximum (256 bytes), matching the
    /// short APDU convention where the Le byte `00` means 256.
    pub const fn with_le(mut self, le: u16) -> Self {
        self.le = Some(if le == 0 { MAX_SHORT_LE } else { le });
        self
    }

    /// Command class (CLA)
    pub const fn class(&self) -> u8 {
        self.cla
    }

    /// Instruction code (INS)
    pub const fn instruction(&self) -> u8 {
        self.ins
    }

    /// First parameter (P1)
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    /// Second parameter (P2)
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    /// Command payload data, `None` when absent or empty
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref().filter(|data| !data.is_empty())
    }

    /// Length of the data field
    pub fn data_len(&self) -> usize {
        self.data().map_or(0, <[u8]>::len)
    }

    /// Expected response length, if requested
    pub const fn expected_length(&self) -> Option<u16> {
        self.le
    }

    /// The four header bytes: CLA, INS, P1, P2
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Calculate length of the serialized short APDU
    pub fn command_length(&self) -> usize {
        let mut length = 4;
        if let Some(data) = self.data() {
            length += 1 + data.len();
        }
        if self.le.is_some() {
            length += 1;
        }
        length
    }

    /// Encode as a short APDU: `CLA INS P1 P2 [Lc data] [Le]`
    ///
    /// Extended lengths are not produced; data longer than 255 bytes or an
    /// expected length outside `1..=256` is rejected.
    pub fn encode(&self) -> Result<Bytes, CommandError> {
        let data_len = self.data_len();
        if data_len > MAX_SHORT_DATA {
            return Err(CommandError::data_too_long(data_len, MAX_SHORT_DATA));
        }
        if let Some(le) = self.le {
            if le == 0 || le > MAX_SHORT_LE {
                return Err(CommandError::InvalidExpectedLength(le));
            }
        }

        let mut buffer = BytesMut::with_capacity(self.command_length());
        buffer.put_slice(&self.header());

        if let Some(data) = self.data() {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        // 256 wraps to the 00 byte
        if let Some(le) = self.le {
            buffer.put_u8(le as u8);
        }

        trace!(apdu = %hex::encode(&buffer), "Encoded command");
        Ok(buffer.freeze())
    }

    /// Parse a command from its short APDU encoding
    pub fn from_bytes(data: &[u8]) -> Result<Self, CommandError> {
        if data.len() < 4 {
            return Err(CommandError::InvalidLength(data.len()));
        }

        let mut command = Self::new(data[0], data[1], data[2], data[3]);
        let body = &data[4..];

        match body.len() {
            0 => {}
            // Only Le present, no data
            1 => command = command.with_le(body[0] as u16),
            _ => {
                let lc = body[0] as usize;
                if lc == 0 {
                    return Err(CommandError::parse("extended length APDUs are not supported"));
                }
                let rest = &body[1..];
                if rest.len() == lc {
                    command.data = Some(Bytes::copy_from_slice(rest));
                } else if rest.len() == lc + 1 {
                    command.data = Some(Bytes::copy_from_slice(&rest[..lc]));
                    command = command.with_le(rest[lc] as u16);
                } else {
                    return Err(CommandError::InvalidLength(data.len()));
                }
            }
        }

        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_command_serialization() {
        let cmd = Command::new(0x00, 0xA4, 0x04, 0x00)
            .with_data(hex!("4144204631").to_vec())
            .with_le(0);

        assert_eq!(cmd.encode().unwrap().as_ref(), hex!("00a4040005414420463100"));
    }

    #[test]
    fn test_command_length() {
        let cmd = Command::new(0x00, 0xB0, 0x00, 0x00);
        assert_eq!(cmd.command_length(), 4);

        let cmd = Command::new(0x00, 0x84, 0x00, 0x00).with_le(0x16);
        assert_eq!(cmd.command_length(), 5);
        assert_eq!(cmd.encode().unwrap().as_ref(), hex!("0084000016"));

        let cmd = Command::new(0x00, 0xA4, 0x00, 0x00).with_data(vec![0x2F, 0xF7]);
        assert_eq!(cmd.command_length(), 7);
    }

    #[test]
    fn test_empty_data_is_omitted() {
        let cmd = Command::new(0x00, 0xB0, 0x00, 0x00)
            .with_data(Bytes::new())
            .with_le(0);

        assert_eq!(cmd.data(), None);
        assert_eq!(cmd.encode().unwrap().as_ref(), hex!("00b0000000"));
    }

    #[test]
    fn test_encode_rejects_oversized_fields() {
        let cmd = Command::new(0x00, 0xD6, 0x00, 0x00).with_data(vec![0u8; 256]);
        assert!(matches!(
            cmd.encode(),
            Err(CommandError::DataTooLong(256, MAX_SHORT_DATA))
        ));

        let cmd = Command::new(0x00, 0xB0, 0x00, 0x00).with_le(257);
        assert!(matches!(
            cmd.encode(),
            Err(CommandError::InvalidExpectedLength(257))
        ));
    }

    #[test]
    fn test_command_from_bytes() {
        let cmd = Command::from_bytes(&hex!("00a40400")).unwrap();
        assert_eq!(cmd, Command::new(0x00, 0xA4, 0x04, 0x00));

        let cmd = Command::from_bytes(&hex!("00a4000002 2ff7")).unwrap();
        assert_eq!(cmd.data(), Some(hex!("2ff7").as_ref()));
        assert!(cmd.le.is_none());

        let cmd = Command::from_bytes(&hex!("00a4000002 2ff7 00")).unwrap();
        assert_eq!(cmd.data(), Some(hex!("2ff7").as_ref()));
        assert_eq!(cmd.le, Some(256));

        let cmd = Command::from_bytes(&hex!("00b0000000")).unwrap();
        assert!(cmd.data.is_none());
        assert_eq!(cmd.le, Some(256));

        assert!(Command::from_bytes(&hex!("00b000")).is_err());
        assert!(Command::from_bytes(&hex!("00a4000005 2ff7")).is_err());
    }

    #[test]
    fn test_encode_then_parse_preserves_command() {
        let cmd = Command::new(0x00, 0x82, 0x00, 0x01)
            .with_data(vec![0x5A; 38])
            .with_le(0x10);

        let parsed = Command::from_bytes(&cmd.encode().unwrap()).unwrap();
        assert_eq!(parsed, cmd);
    }
}
