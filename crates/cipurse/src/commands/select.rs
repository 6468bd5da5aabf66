//! SELECT command
//!
//! Selects the CIPURSE application by name or an elementary file by its
//! identifier.

use cipurse_apdu_core::Command;

use crate::constants::{CIPURSE_AID, cla, ins, select_p1};

/// SELECT the CIPURSE application (`00 A4 04 00 05 "AD F1" 00`)
pub fn select_application() -> Command {
    Command::new(cla::ISO7816, ins::SELECT, select_p1::BY_NAME, 0x00)
        .with_data(CIPURSE_AID)
        .with_le(0)
}

/// SELECT an elementary file by its two-byte identifier
pub fn select_file(file_id: u16) -> Command {
    Command::new(cla::ISO7816, ins::SELECT, select_p1::BY_FILE_ID, 0x00)
        .with_data(file_id.to_be_bytes().to_vec())
        .with_le(0)
}
