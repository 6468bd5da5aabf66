//! Authenticate to a CIPURSE card and read its info file
//!
//! Usage: `read_info [KEY_HEX] [KEY_INDEX]`
//!
//! Without arguments the default test key `73 73 .. 73` with index 1 is used.
//! Set `RUST_LOG=debug` to see every APDU.

use cipurse::{ChannelConfig, CipurseChannel, InfoFile, SecurityLevel};
use cipurse_apdu_core::FieldMode;
use cipurse_transport_pcsc::{PcscConfig, PcscDeviceManager};
use tracing_subscriber::EnvFilter;

const INFO_FILE_ID: u16 = 0x2FF7;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let key: [u8; 16] = match args.next() {
        Some(key) => hex::decode(key)?
            .try_into()
            .map_err(|_| "key must be 16 bytes")?,
        None => [0x73; 16],
    };
    let key_index: u8 = args.next().map(|i| i.parse()).transpose()?.unwrap_or(1);

    let manager = PcscDeviceManager::new()?;
    let transport = manager.open_first_card(PcscConfig::default())?;
    println!("Using reader: {}", transport.reader_name());

    let mut channel =
        CipurseChannel::with_config(transport, ChannelConfig::default().with_apdu_logging(true));

    let fci = channel.select(FieldMode::activate())?.into_result()?;
    println!("Selected CIPURSE application, FCI: {}", hex::encode_upper(&fci));

    channel.authenticate(key_index, &key)?;
    println!("Authenticated with key {key_index}");

    channel.set_security_levels(SecurityLevel::Encrypted, SecurityLevel::Encrypted);
    channel.select_file(INFO_FILE_ID)?.into_result()?;
    let data = channel.read_binary(0)?.into_result()?;
    println!("{}", InfoFile::parse(&data)?);

    Ok(())
}
