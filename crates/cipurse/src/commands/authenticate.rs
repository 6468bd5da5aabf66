//! GET CHALLENGE and MUTUAL AUTHENTICATE commands

use cipurse_apdu_core::Command;

use crate::constants::{AUTH_PARAMS_LEN, CHALLENGE_LEN, CONFIRMATION_LEN, cla, ins};

/// GET CHALLENGE, asking for the card's 22-byte random (`RP || rP`)
pub fn get_challenge() -> Command {
    Command::new(cla::ISO7816, ins::GET_CHALLENGE, 0x00, 0x00).with_le(CHALLENGE_LEN as u16)
}

/// MUTUAL AUTHENTICATE with the host parameters `cP || RQ || rQ`
pub fn mutual_authenticate(key_index: u8, params: &[u8; AUTH_PARAMS_LEN]) -> Command {
    Command::new(cla::ISO7816, ins::MUTUAL_AUTHENTICATE, 0x00, key_index)
        .with_data(params.to_vec())
        .with_le(CONFIRMATION_LEN as u16)
}
