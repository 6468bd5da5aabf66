//! Decoded card data structures

use std::fmt;

use crate::{Error, Result};

/// Contents of the CIPURSE info file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoFile {
    /// CIPURSE version implemented by the card
    pub version: u8,
    /// Revision of that version
    pub revision: u8,
}

impl InfoFile {
    /// Parse the info file; trailing bytes are ignored
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data {
            [version, revision, ..] => Ok(Self {
                version: *version,
                revision: *revision,
            }),
            _ => Err(Error::InvalidData("info file shorter than 2 bytes")),
        }
    }
}

impl TryFrom<&[u8]> for InfoFile {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::parse(data)
    }
}

impl fmt::Display for InfoFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CIPURSE version {} revision {}", self.version, self.revision)
    }
}
