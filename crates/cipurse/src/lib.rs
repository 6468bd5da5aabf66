//! Host side of the CIPURSE secure channel
//!
//! [`CipurseChannel`] drives a contactless card through a
//! [`CardTransport`](cipurse_apdu_core::CardTransport): it selects the
//! CIPURSE application, runs the mutual authentication handshake and
//! protects subsequent commands with a MAC or with encryption according to
//! the session's [`SecurityLevel`]s.
//!
//! ```no_run
//! use cipurse::{CipurseChannel, SecurityLevel};
//! use cipurse_apdu_core::{CardTransport, FieldMode};
//!
//! fn read_info<T: CardTransport>(transport: T, key: &[u8; 16]) -> cipurse::Result<()> {
//!     let mut channel = CipurseChannel::new(transport);
//!     channel.select(FieldMode::activate())?.into_result()?;
//!     channel.authenticate(1, key)?;
//!     channel.set_security_levels(SecurityLevel::Encrypted, SecurityLevel::Encrypted);
//!     channel.select_file(0x2FF7)?.into_result()?;
//!     let info = cipurse::InfoFile::parse(&channel.read_binary(0)?.into_result()?)?;
//!     println!("{info}");
//!     Ok(())
//! }
//! ```

mod auth;
mod channel;
pub mod commands;
mod config;
pub mod constants;
mod context;
pub mod crypto;
mod error;
pub mod secure_messaging;
mod types;

#[cfg(test)]
mod test_support;

pub use channel::{CipurseChannel, Outcome, SharedChannel};
pub use config::{ChannelConfig, DEFAULT_FIELD_SETTLE_DELAY};
pub use context::{SecurityLevel, SessionContext, SessionKeys};
pub use error::{AuthFailure, Error, IntegrityError, Result};
pub use types::InfoFile;
