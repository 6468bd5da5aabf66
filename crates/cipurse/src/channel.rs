//! CIPURSE channel
//!
//! [`CipurseChannel`] owns a card transport and the session context. Every
//! exchange goes through the secure messaging codec, so callers issue
//! logical commands and receive classified [`Outcome`]s.

use std::{sync::Arc, thread};

use bytes::Bytes;
use cipurse_apdu_core::{CardTransport, Command, FieldMode, Response, StatusWord};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::{
    Error, Result,
    commands,
    config::ChannelConfig,
    constants::AUTH_PARAMS_LEN,
    context::{SecurityLevel, SessionContext},
    secure_messaging,
};

/// Channel shared between threads
pub type SharedChannel<T> = Arc<Mutex<CipurseChannel<T>>>;

/// Classified result of an exchange the card answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Status 9000
    Success(Bytes),
    /// Status 61XX: the card holds more data for a GET RESPONSE
    ChainedMore {
        /// Data returned with this response
        payload: Bytes,
        /// Number of bytes still available; `61 00` counts as 256
        remaining: u16,
    },
    /// Any other status
    CardError {
        /// Status word returned by the card
        status: StatusWord,
        /// Human readable description of the status word
        description: &'static str,
    },
}

impl Outcome {
    /// Whether the card reported success
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Response data, if the card returned any
    pub const fn payload(&self) -> Option<&Bytes> {
        match self {
            Self::Success(payload) | Self::ChainedMore { payload, .. } => Some(payload),
            Self::CardError { .. } => None,
        }
    }

    /// Status word the outcome was classified from
    pub const fn status(&self) -> StatusWord {
        match self {
            Self::Success(_) => StatusWord::new(0x90, 0x00),
            Self::ChainedMore { remaining, .. } => StatusWord::new(0x61, (*remaining & 0xFF) as u8),
            Self::CardError { status, .. } => *status,
        }
    }

    /// Convert a card error into [`Error::Card`], keeping the data otherwise
    pub fn into_result(self) -> Result<Bytes> {
        match self {
            Self::Success(payload) | Self::ChainedMore { payload, .. } => Ok(payload),
            Self::CardError {
                status,
                description,
            } => Err(Error::Card {
                status,
                description,
            }),
        }
    }
}

impl From<Response> for Outcome {
    fn from(response: Response) -> Self {
        let status = response.status();
        if status.is_success() {
            Self::Success(response.into_payload())
        } else if let Some(remaining) = status.remaining_bytes() {
            Self::ChainedMore {
                payload: response.into_payload(),
                remaining,
            }
        } else {
            Self::CardError {
                status,
                description: status.description(),
            }
        }
    }
}

/// Host side of a CIPURSE session over a card transport
#[derive(Debug)]
pub struct CipurseChannel<T: CardTransport> {
    pub(crate) transport: T,
    pub(crate) context: SessionContext,
    config: ChannelConfig,
}

impl<T: CardTransport> CipurseChannel<T> {
    /// Create a channel with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ChannelConfig::default())
    }

    /// Create a channel with a custom configuration
    pub fn with_config(transport: T, config: ChannelConfig) -> Self {
        Self {
            transport,
            context: SessionContext::new(),
            config,
        }
    }

    /// Wrap the channel for use from several threads
    pub fn into_shared(self) -> SharedChannel<T> {
        Arc::new(Mutex::new(self))
    }

    /// Current session context
    pub const fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Channel configuration
    pub const fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Underlying transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the channel and return its transport
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Drop the current session and all of its key material
    pub fn clear_session(&mut self) {
        self.context.clear();
    }

    /// Change the protection of both directions without re-authenticating.
    ///
    /// Without an authenticated session both levels stay `Plain`.
    pub fn set_security_levels(&mut self, request: SecurityLevel, response: SecurityLevel) {
        self.context.set_security_levels(request, response);
    }

    /// Send a logical command and classify the card's answer.
    ///
    /// Oversized commands are rejected before the transport is touched.
    /// When `field.activate` is set the field is dropped first and the
    /// configured settle delay is observed.
    pub fn exchange(&mut self, field: FieldMode, command: &Command) -> Result<Outcome> {
        let length = command.data_len();
        let max = self.config.max_command_data;
        if length > max {
            warn!(length, max, "Command data too long");
            return Err(Error::CommandTooLong { length, max });
        }

        if field.activate {
            debug!("Dropping field before exchange");
            self.transport.drop_field()?;
            if !self.config.field_settle_delay.is_zero() {
                thread::sleep(self.config.field_settle_delay);
            }
        }

        // A frame that fails to encode or transmit leaves the counter as it was
        let checkpoint = self.context.ssc();
        let raw = match self.send(command, field) {
            Ok(raw) => raw,
            Err(e) => {
                self.context.restore_ssc(checkpoint);
                return Err(e);
            }
        };

        let response = secure_messaging::decode_response(&mut self.context, &raw)?;
        let outcome = Outcome::from(response);
        match &outcome {
            Outcome::Success(_) => {}
            Outcome::ChainedMore { remaining, .. } => {
                debug!(remaining, "Card has more data available");
            }
            Outcome::CardError {
                status,
                description,
            } => {
                warn!(
                    ins = command.instruction(),
                    %status,
                    description,
                    "Card returned error status"
                );
            }
        }

        Ok(outcome)
    }

    fn send(&mut self, command: &Command, field: FieldMode) -> Result<Bytes> {
        let wrapped = secure_messaging::encode_request(&mut self.context, command)?;
        let bytes = wrapped.encode()?;
        self.log_apdu(">>>>", &bytes);

        let raw = self.transport.transmit_raw(&bytes, field)?;
        self.log_apdu("<<<<", &raw);
        Ok(raw)
    }

    fn log_apdu(&self, direction: &str, bytes: &[u8]) {
        if self.config.log_apdus {
            debug!(apdu = %hex::encode(bytes), "{direction}");
        } else {
            trace!(apdu = %hex::encode(bytes), "{direction}");
        }
    }

    /// SELECT the CIPURSE application, clearing any existing session first
    pub fn select(&mut self, field: FieldMode) -> Result<Outcome> {
        self.context.clear();
        self.exchange(field, &commands::select_application())
    }

    /// GET CHALLENGE
    pub fn challenge(&mut self) -> Result<Outcome> {
        self.exchange(FieldMode::KEEP, &commands::get_challenge())
    }

    /// MUTUAL AUTHENTICATE with prepared parameters
    pub fn mutual_authenticate(
        &mut self,
        key_index: u8,
        params: &[u8; AUTH_PARAMS_LEN],
    ) -> Result<Outcome> {
        self.exchange(FieldMode::KEEP, &commands::mutual_authenticate(key_index, params))
    }

    /// SELECT an elementary file
    pub fn select_file(&mut self, file_id: u16) -> Result<Outcome> {
        self.exchange(FieldMode::KEEP, &commands::select_file(file_id))
    }

    /// READ BINARY from the selected file
    pub fn read_binary(&mut self, offset: u16) -> Result<Outcome> {
        self.exchange(FieldMode::KEEP, &commands::read_binary(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        IntegrityError,
        test_support::{INFO_FILE_ID, SimulatedCard, TEST_KEY, TEST_KEY_INDEX, init_tracing},
        types::InfoFile,
    };
    use cipurse_apdu_core::{MockTransport, TransportError};
    use hex_literal::hex;
    use std::time::Duration;

    fn quick() -> ChannelConfig {
        ChannelConfig::default().with_field_settle_delay(Duration::ZERO)
    }

    fn mock_channel<I: IntoIterator<Item = Vec<u8>>>(responses: I) -> CipurseChannel<MockTransport> {
        CipurseChannel::with_config(MockTransport::new(responses), quick())
    }

    fn authenticated_card() -> CipurseChannel<SimulatedCard> {
        let mut channel = CipurseChannel::with_config(SimulatedCard::new(), quick());
        assert!(channel.select(FieldMode::activate()).unwrap().is_success());
        channel.authenticate(TEST_KEY_INDEX, &TEST_KEY).unwrap();
        channel
    }

    #[test]
    fn test_select_returns_fci() {
        init_tracing();
        let mut channel = mock_channel([hex!("6F0784054144204631 9000").to_vec()]);
        let outcome = channel.select(FieldMode::activate()).unwrap();

        assert_eq!(
            outcome,
            Outcome::Success(Bytes::from_static(&hex!("6F0784054144204631")))
        );
        let transport = channel.transport();
        assert_eq!(transport.field_drops, 1);
        assert_eq!(transport.commands[0].as_ref(), hex!("00A4040005414420463100"));
        assert_eq!(transport.field_modes[0], FieldMode::activate());
    }

    #[test]
    fn test_select_clears_session() {
        let mut channel = authenticated_card();
        assert!(channel.context().is_authenticated());
        channel.select(FieldMode::KEEP).unwrap();
        assert!(channel.context().is_cleared());
    }

    #[test]
    fn test_oversized_command_never_reaches_transport() {
        let mut channel = mock_channel([hex!("9000").to_vec()]);
        let command = Command::new(0x00, 0xD6, 0x00, 0x00).with_data(vec![0u8; 229]);

        assert_eq!(
            channel.exchange(FieldMode::activate(), &command),
            Err(Error::CommandTooLong {
                length: 229,
                max: 228
            })
        );
        assert_eq!(channel.transport().invocations(), 0);
    }

    #[test]
    fn test_largest_command_is_sent() {
        let mut channel = mock_channel([hex!("9000").to_vec()]);
        let command = Command::new(0x00, 0xD6, 0x00, 0x00).with_data(vec![0u8; 228]);
        assert!(channel.exchange(FieldMode::KEEP, &command).unwrap().is_success());
        assert_eq!(channel.transport().commands[0].len(), 5 + 228);
    }

    #[test]
    fn test_transport_error_is_propagated() {
        let mut transport = MockTransport::default();
        transport.connected = true;
        transport.push_error(TransportError::Timeout);
        let mut channel = CipurseChannel::with_config(transport, quick());

        assert_eq!(
            channel.read_binary(0),
            Err(Error::Transport(TransportError::Timeout))
        );
    }

    #[test]
    fn test_short_response() {
        let mut channel = mock_channel([vec![0x90]]);
        assert_eq!(channel.read_binary(0), Err(Error::ResponseTooShort(1)));
    }

    #[test]
    fn test_chained_response_is_reported() {
        let mut channel = mock_channel([hex!("01026110").to_vec()]);
        let outcome = channel.read_binary(0).unwrap();
        assert_eq!(
            outcome,
            Outcome::ChainedMore {
                payload: Bytes::from_static(&hex!("0102")),
                remaining: 0x10
            }
        );
        assert_eq!(outcome.status(), StatusWord::new(0x61, 0x10));
        // Nothing is fetched automatically
        assert_eq!(channel.transport().commands.len(), 1);
    }

    #[test]
    fn test_chained_full_block() {
        let mut channel = mock_channel([hex!("6100").to_vec()]);
        let outcome = channel.read_binary(0).unwrap();
        assert_eq!(
            outcome,
            Outcome::ChainedMore {
                payload: Bytes::new(),
                remaining: 256
            }
        );
        assert_eq!(outcome.status(), StatusWord::new(0x61, 0x00));
    }

    #[test]
    fn test_transport_failure_keeps_session() {
        let mut channel = authenticated_card();
        let ssc = channel.context().ssc();
        channel.transport_mut().fail_next = Some(TransportError::Timeout);

        assert_eq!(
            channel.select_file(INFO_FILE_ID),
            Err(Error::Transport(TransportError::Timeout))
        );
        assert_eq!(channel.context().ssc(), ssc);
        assert!(channel.context().is_authenticated());

        // The card never saw the lost frame, so both counters still agree
        assert!(channel.select_file(INFO_FILE_ID).unwrap().is_success());
        let data = channel.read_binary(0).unwrap().into_result().unwrap();
        assert_eq!(data.as_ref(), [0x02, 0x01]);
        assert!(channel.transport().has_session());
    }

    #[test]
    fn test_failed_field_reset_sends_nothing() {
        let mut transport = MockTransport::new([hex!("9000").to_vec()]);
        transport.field_error = Some(TransportError::Field);
        let mut channel = CipurseChannel::with_config(transport, quick());

        assert_eq!(
            channel.select(FieldMode::activate()),
            Err(Error::Transport(TransportError::Field))
        );
        assert!(channel.transport().commands.is_empty());
    }

    #[test]
    fn test_card_error_outcome() {
        let mut channel = mock_channel([hex!("6A82").to_vec()]);
        let outcome = channel.select_file(0x1234).unwrap();
        assert_eq!(
            outcome,
            Outcome::CardError {
                status: StatusWord::new(0x6A, 0x82),
                description: StatusWord::new(0x6A, 0x82).description(),
            }
        );
        assert!(matches!(outcome.into_result(), Err(Error::Card { .. })));
    }

    #[test]
    fn test_read_binary_keeps_p1_in_range() {
        let mut channel = mock_channel([hex!("9000").to_vec()]);
        channel.read_binary(0xFFFF).unwrap();
        assert_eq!(channel.transport().commands[0].as_ref(), hex!("00B07FFF00"));
    }

    #[test]
    fn test_plain_session_reads_file() {
        let mut channel = CipurseChannel::with_config(SimulatedCard::new(), quick());
        channel.select(FieldMode::activate()).unwrap();
        assert!(channel.select_file(INFO_FILE_ID).unwrap().is_success());
        let data = channel.read_binary(0).unwrap().into_result().unwrap();
        assert_eq!(
            InfoFile::parse(&data).unwrap(),
            InfoFile {
                version: 2,
                revision: 1
            }
        );
    }

    #[test]
    fn test_maced_session_reads_file() {
        init_tracing();
        let mut channel = authenticated_card();
        assert!(channel.select_file(0x1001).unwrap().is_success());
        let data = channel.read_binary(0x0100).unwrap().into_result().unwrap();

        assert_eq!(data.len(), 256);
        assert_eq!(data[0], 0x00);
        assert_eq!(data[255], 0xFF);
        assert!(channel.context().is_authenticated());
        assert!(channel.transport().has_session());
        // Every frame on the wire carried the secure messaging class bit
        assert!(channel.context().ssc() >= 4);
    }

    #[test]
    fn test_encrypted_session_reads_file() {
        let mut channel = authenticated_card();
        channel.set_security_levels(SecurityLevel::Encrypted, SecurityLevel::Encrypted);
        assert!(channel.select_file(0x1001).unwrap().is_success());
        let data = channel.read_binary(0x0200).unwrap().into_result().unwrap();

        // 600-byte file read from offset 512
        assert_eq!(data.len(), 88);
        assert_eq!(data[0], 0x00);
        let received = &channel.transport().received;
        assert_eq!(received.last().unwrap(), &commands::read_binary(0x0200));
    }

    #[test]
    fn test_secured_card_error_clears_session() {
        let mut channel = authenticated_card();
        // Nothing selected yet: the card answers with a bare status word
        let outcome = channel.read_binary(0).unwrap();
        assert_eq!(outcome.status(), StatusWord::new(0x69, 0x86));
        assert!(channel.context().is_cleared());
    }

    #[test]
    fn test_tampered_response_clears_session() {
        let mut channel = authenticated_card();
        channel.transport_mut().tamper_responses = true;
        assert_eq!(
            channel.select_file(INFO_FILE_ID),
            Err(Error::Integrity(IntegrityError::MacMismatch))
        );
        assert!(channel.context().is_cleared());
    }

    #[test]
    fn test_clear_session() {
        let mut channel = authenticated_card();
        channel.clear_session();
        assert!(channel.context().is_cleared());

        channel.set_security_levels(SecurityLevel::Maced, SecurityLevel::Maced);
        assert_eq!(channel.context().request_level(), SecurityLevel::Plain);
    }

    #[test]
    fn test_shared_channel() {
        let shared = authenticated_card().into_shared();
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let mut channel = shared.lock();
                channel.select_file(INFO_FILE_ID).unwrap().is_success()
            })
        };
        assert!(worker.join().unwrap());

        let mut channel = shared.lock();
        let data = channel.read_binary(0).unwrap().into_result().unwrap();
        assert_eq!(data.as_ref(), [0x02, 0x01]);
    }

    #[test]
    fn test_apdu_logging_config() {
        let mut channel = CipurseChannel::with_config(
            MockTransport::new([hex!("9000").to_vec()]),
            quick().with_apdu_logging(true),
        );
        assert!(channel.config().log_apdus);
        assert!(channel.read_binary(0).unwrap().is_success());
    }
}
