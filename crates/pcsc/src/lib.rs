//! PC/SC transport for CIPURSE cards
//!
//! This crate implements the `CardTransport` trait from `cipurse-apdu-core`
//! on top of the PC/SC API. Dropping the RF field is mapped to powering the
//! card down; the next exchange reconnects and powers it up again.
//!
//! # Examples
//!
//! ```no_run
//! use cipurse_apdu_core::FieldMode;
//! use cipurse_transport_pcsc::{PcscConfig, PcscDeviceManager};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = PcscDeviceManager::new()?;
//! let transport = manager.open_first_card(PcscConfig::default())?;
//!
//! let mut channel = cipurse::CipurseChannel::new(transport);
//! let outcome = channel.select(FieldMode::activate())?;
//! println!("SELECT: {outcome:?}");
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

mod config;
mod error;
mod manager;
mod reader;
mod transport;

pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
