//! Constants used by the CIPURSE secure channel
//!
//! Instruction codes, parameter values, lengths and the status words the
//! authentication protocol gives a meaning to.

/// CIPURSE application identifier ("AD F1")
pub const CIPURSE_AID: &[u8] = b"AD F1";

/// Command classes
pub mod cla {
    /// ISO 7816 interindustry class
    pub const ISO7816: u8 = 0x00;
    /// Class bit set on secure messaging frames
    pub const SECURE_MESSAGING: u8 = 0x04;
}

/// Instruction codes
pub mod ins {
    /// SELECT (application by name or file by identifier)
    pub const SELECT: u8 = 0xA4;
    /// GET CHALLENGE
    pub const GET_CHALLENGE: u8 = 0x84;
    /// MUTUAL AUTHENTICATE
    pub const MUTUAL_AUTHENTICATE: u8 = 0x82;
    /// READ BINARY
    pub const READ_BINARY: u8 = 0xB0;
}

/// Parameter values for SELECT (P1)
pub mod select_p1 {
    /// Select by elementary file identifier
    pub const BY_FILE_ID: u8 = 0x00;
    /// Select by DF name
    pub const BY_NAME: u8 = 0x04;
}

/// Status words with a protocol-level meaning
pub mod status {
    use cipurse_apdu_core::StatusWord;

    /// Success
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);
    /// MUTUAL AUTHENTICATE rejected the host cryptogram
    pub const WRONG_KEY: StatusWord = StatusWord::new(0x69, 0x88);
    /// MUTUAL AUTHENTICATE referenced a key the card does not hold
    pub const WRONG_KEY_INDEX: StatusWord = StatusWord::new(0x6A, 0x88);
}

/// Length of a 16-byte random (`RP`, `RQ`)
pub const RANDOM_LEN: usize = 16;

/// Length of a 6-byte random (`rP`, `rQ`)
pub const SMALL_RANDOM_LEN: usize = 6;

/// Length of a challenge: 16-byte random followed by 6-byte random
pub const CHALLENGE_LEN: usize = RANDOM_LEN + SMALL_RANDOM_LEN;

/// Length of the MUTUAL AUTHENTICATE parameters (`cP || RQ || rQ`)
pub const AUTH_PARAMS_LEN: usize = 16 + CHALLENGE_LEN;

/// Length of the card confirmation (`cT`)
pub const CONFIRMATION_LEN: usize = 16;

/// Length of a long-term or session key
pub const KEY_LEN: usize = 16;

/// Length of a secure messaging MAC
pub const MAC_LEN: usize = 8;

/// Largest command data accepted for a single exchange
pub const MAX_COMMAND_DATA: usize = 228;
