//! Command builders for the CIPURSE operations the host issues
//!
//! Each builder returns a plain [`Command`](cipurse_apdu_core::Command);
//! protection is applied later by the channel according to the session's
//! security levels.

mod authenticate;
mod read_binary;
mod select;

pub use authenticate::{get_challenge, mutual_authenticate};
pub use read_binary::read_binary;
pub use select::{select_application, select_file};
