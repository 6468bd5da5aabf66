//! In-memory CIPURSE card used by the unit tests

use bytes::{BufMut, Bytes, BytesMut};
use cipurse_apdu_core::{
    CardTransport, Command, FieldMode, StatusWord, TransportError, response::status::common,
};
use rand::RngCore;

use crate::{
    constants::{
        AUTH_PARAMS_LEN, CHALLENGE_LEN, CIPURSE_AID, MAC_LEN, cla, ins, select_p1,
        status,
    },
    context::{SecurityLevel, SessionContext, split_challenge},
    crypto::{self, AesKey},
    secure_messaging::parse_smi,
};

pub(crate) const TEST_KEY: AesKey = [0x73; 16];
pub(crate) const TEST_KEY_INDEX: u8 = 1;
pub(crate) const INFO_FILE_ID: u16 = 0x2FF7;

const CARD_CHALLENGE: [u8; CHALLENGE_LEN] = [
    0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0x00, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF,
    0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6,
];
const HOST_CHALLENGE: [u8; CHALLENGE_LEN] = [
    0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F, 0x10,
    0xB1, 0xB2, 0xB3, 0xB4, 0xB5, 0xB6,
];

/// Install a test subscriber once; repeated calls are harmless
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Context that went through key derivation with fixed challenges
pub(crate) fn authenticated_context() -> SessionContext {
    let mut ctx = SessionContext::new();
    ctx.set_key(TEST_KEY_INDEX, &TEST_KEY);
    ctx.set_card_challenge(&CARD_CHALLENGE);
    ctx.set_host_challenge(&HOST_CHALLENGE);
    ctx.derive_session().unwrap();
    ctx.mark_authenticated().unwrap();
    ctx
}

/// Card-side mirror of an authenticated host context
pub(crate) fn card_session_for(ctx: &SessionContext) -> CardSession {
    let keys = ctx.session_keys().unwrap();
    CardSession {
        mac: *keys.mac(),
        enc: *keys.enc(),
        ssc: ctx.ssc(),
    }
}

/// Card side of a secure session
#[derive(Debug, Clone)]
pub(crate) struct CardSession {
    pub(crate) mac: AesKey,
    pub(crate) enc: AesKey,
    pub(crate) ssc: u64,
}

impl CardSession {
    /// Verify and unwrap a protected command, returning the inner command
    /// and the level the host asked the answer to be protected with.
    pub(crate) fn unwrap_command(&mut self, command: &Command) -> Option<(Command, SecurityLevel)> {
        let data = command.data()?;
        if data.len() < 1 + MAC_LEN {
            return None;
        }
        let (request, response, le_present) = parse_smi(data[0])?;
        let body = &data[1..data.len() - MAC_LEN];
        let mac = &data[data.len() - MAC_LEN..];

        self.ssc += 1;
        let header = [command.class(), command.instruction(), command.p1(), command.p2()];
        if !crypto::verify_mac(&self.mac, self.ssc, &[&header[..], &data[..1], body], mac) {
            return None;
        }

        let (payload, le) = if le_present {
            let (payload, le) = body.split_at(body.len().checked_sub(1)?);
            (payload, Some(le[0]))
        } else {
            (body, None)
        };
        let payload = match request {
            SecurityLevel::Encrypted if !payload.is_empty() => {
                crypto::decrypt_data(&self.enc, self.ssc, payload)?
            }
            _ => payload.to_vec(),
        };

        let mut inner = Command::new(
            command.class() & !cla::SECURE_MESSAGING,
            command.instruction(),
            command.p1(),
            command.p2(),
        );
        if !payload.is_empty() {
            inner = inner.with_data(payload);
        }
        if let Some(le) = le {
            inner = inner.with_le(u16::from(le));
        }
        Some((inner, response))
    }

    /// Protect a response at the given level
    pub(crate) fn wrap(&mut self, level: SecurityLevel, payload: &[u8], status: StatusWord) -> Bytes {
        let mut out = BytesMut::new();
        if !level.is_secured() {
            out.put_slice(payload);
            out.put_slice(&status.to_bytes());
            return out.freeze();
        }

        self.ssc += 1;
        let body = match level {
            SecurityLevel::Encrypted if !payload.is_empty() => {
                crypto::encrypt_data(&self.enc, self.ssc, payload)
            }
            _ => payload.to_vec(),
        };
        let mac = crypto::calculate_mac(&self.mac, self.ssc, &[&body[..], &status.to_bytes()[..]]);
        out.put_slice(&body);
        out.put_slice(&mac);
        out.put_slice(&status.to_bytes());
        out.freeze()
    }
}

/// Simulated contactless card holding one key and a few transparent files
#[derive(Debug)]
pub(crate) struct SimulatedCard {
    pub(crate) key_index: u8,
    pub(crate) key: AesKey,
    pub(crate) fci: Vec<u8>,
    pub(crate) files: Vec<(u16, Vec<u8>)>,
    /// Number of challenge bytes actually returned
    pub(crate) challenge_len: usize,
    /// Flip a bit in every protected response
    pub(crate) tamper_responses: bool,
    /// Link failure returned instead of the next exchange
    pub(crate) fail_next: Option<TransportError>,
    /// Unwrapped commands in the order they were processed
    pub(crate) received: Vec<Command>,
    pub(crate) exchanges: usize,
    pub(crate) field_drops: usize,
    challenge: Option<[u8; CHALLENGE_LEN]>,
    session: Option<CardSession>,
    selected_file: Option<u16>,
}

impl Default for SimulatedCard {
    fn default() -> Self {
        Self {
            key_index: TEST_KEY_INDEX,
            key: TEST_KEY,
            fci: vec![0x6F, 0x07, 0x84, 0x05, b'A', b'D', b' ', b'F', b'1'],
            files: vec![
                (INFO_FILE_ID, vec![0x02, 0x01]),
                (0x1001, (0..=255u8).cycle().take(600).collect()),
            ],
            challenge_len: CHALLENGE_LEN,
            tamper_responses: false,
            fail_next: None,
            received: Vec::new(),
            exchanges: 0,
            field_drops: 0,
            challenge: None,
            session: None,
            selected_file: None,
        }
    }
}

impl SimulatedCard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn has_session(&self) -> bool {
        self.session.is_some()
    }

    fn reset(&mut self) {
        self.challenge = None;
        self.session = None;
        self.selected_file = None;
    }

    fn process(&mut self, command: &Command) -> (Vec<u8>, StatusWord) {
        self.received.push(command.clone());
        let data = command.data().unwrap_or_default();

        match (command.instruction(), command.p1()) {
            (ins::SELECT, select_p1::BY_NAME) => {
                if data != CIPURSE_AID {
                    return (Vec::new(), common::FILE_NOT_FOUND);
                }
                self.reset();
                (self.fci.clone(), status::SUCCESS)
            }
            (ins::SELECT, select_p1::BY_FILE_ID) => {
                let Ok(id) = <[u8; 2]>::try_from(data) else {
                    return (Vec::new(), common::WRONG_LENGTH);
                };
                let id = u16::from_be_bytes(id);
                if self.files.iter().any(|(file, _)| *file == id) {
                    self.selected_file = Some(id);
                    (Vec::new(), status::SUCCESS)
                } else {
                    (Vec::new(), common::FILE_NOT_FOUND)
                }
            }
            (ins::GET_CHALLENGE, _) => {
                let mut challenge = [0u8; CHALLENGE_LEN];
                rand::rng().fill_bytes(&mut challenge);
                self.challenge = Some(challenge);
                let len = self.challenge_len;
                let mut out = challenge.to_vec();
                out.resize(len, 0xEE);
                (out, status::SUCCESS)
            }
            (ins::MUTUAL_AUTHENTICATE, _) => self.mutual_authenticate(command.p2(), data),
            (ins::READ_BINARY, _) => {
                let Some(file) = self.selected_file else {
                    return (Vec::new(), StatusWord::new(0x69, 0x86));
                };
                let contents = self
                    .files
                    .iter()
                    .find(|(id, _)| *id == file)
                    .map(|(_, contents)| contents.as_slice())
                    .unwrap_or_default();
                let offset = (usize::from(command.p1() & 0x7F) << 8) | usize::from(command.p2());
                if offset > contents.len() {
                    return (Vec::new(), StatusWord::new(0x6B, 0x00));
                }
                let le = usize::from(command.expected_length().unwrap_or(256));
                let end = contents.len().min(offset + le);
                (contents[offset..end].to_vec(), status::SUCCESS)
            }
            _ => (Vec::new(), common::INVALID_INSTRUCTION),
        }
    }

    fn mutual_authenticate(&mut self, key_index: u8, data: &[u8]) -> (Vec<u8>, StatusWord) {
        if key_index != self.key_index {
            return (Vec::new(), status::WRONG_KEY_INDEX);
        }
        if data.len() != AUTH_PARAMS_LEN {
            return (Vec::new(), common::WRONG_LENGTH);
        }
        let Some(challenge) = self.challenge.take() else {
            return (Vec::new(), StatusWord::new(0x69, 0x85));
        };

        let (card_random, card_small) = split_challenge(&challenge);
        let mut host = [0u8; CHALLENGE_LEN];
        host.copy_from_slice(&data[16..]);
        let (host_random, host_small) = split_challenge(&host);

        let k0 = crypto::derive_k0(&self.key, &card_small, &host_small);
        if !crypto::cryptograms_match(&crypto::host_cryptogram(&k0, &card_random), &data[..16]) {
            return (Vec::new(), status::WRONG_KEY);
        }

        self.session = Some(CardSession {
            mac: crypto::derive_mac_key(&k0, &card_random, &host_random),
            enc: k0,
            ssc: 0,
        });
        (crypto::card_cryptogram(&k0, &host_random).to_vec(), status::SUCCESS)
    }
}

impl CardTransport for SimulatedCard {
    fn do_transmit_raw(&mut self, raw: &[u8], _field: FieldMode) -> Result<Bytes, TransportError> {
        self.exchanges += 1;
        if let Some(error) = self.fail_next.take() {
            return Err(error);
        }
        let command = Command::from_bytes(raw).map_err(|_| TransportError::Transmission)?;

        if command.class() & cla::SECURE_MESSAGING == 0 {
            let (payload, status) = self.process(&command);
            let mut out = BytesMut::from(payload.as_slice());
            out.put_slice(&status.to_bytes());
            return Ok(out.freeze());
        }

        let bare = |status: StatusWord| Bytes::copy_from_slice(&status.to_bytes());
        let Some(mut session) = self.session.take() else {
            return Ok(bare(common::SM_DATA_INCORRECT));
        };
        let Some((inner, level)) = session.unwrap_command(&command) else {
            return Ok(bare(common::SM_DATA_INCORRECT));
        };

        let (payload, status) = self.process(&inner);
        if !status.is_success() {
            // Errors end the secure session
            return Ok(bare(status));
        }

        let mut out = session.wrap(level, &payload, status).to_vec();
        if self.tamper_responses && level.is_secured() {
            out[0] ^= 0x01;
        }
        self.session = Some(session);
        Ok(out.into())
    }

    fn drop_field(&mut self) -> Result<(), TransportError> {
        self.field_drops += 1;
        self.reset();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
