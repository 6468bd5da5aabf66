//! READ BINARY command

use cipurse_apdu_core::Command;

use crate::constants::{cla, ins};

/// READ BINARY from the currently selected file.
///
/// The offset is carried in 15 bits: bit 8 of P1 would select a file by
/// short identifier, so it is always cleared.
pub fn read_binary(offset: u16) -> Command {
    let p1 = ((offset >> 8) & 0x7F) as u8;
    let p2 = (offset & 0xFF) as u8;
    Command::new(cla::ISO7816, ins::READ_BINARY, p1, p2).with_le(0)
}
