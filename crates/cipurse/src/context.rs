//! Session context for the CIPURSE secure channel
//!
//! The context holds everything the secure messaging codec needs: the
//! security levels of both directions, the long-term key used for the
//! pending or current authentication, both challenges, the derived session
//! keys and the send sequence counter.

use std::fmt;

use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    Error, Result,
    constants::{CHALLENGE_LEN, RANDOM_LEN},
    crypto::{self, AesBlock, AesKey, Random, SmallRandom},
};

/// Protection applied to one direction of the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SecurityLevel {
    /// No protection
    #[default]
    Plain,
    /// Integrity protection with a truncated CBC-MAC
    Maced,
    /// Confidentiality and integrity protection
    Encrypted,
}

impl SecurityLevel {
    /// Whether this level protects the frame
    pub const fn is_secured(self) -> bool {
        !matches!(self, Self::Plain)
    }

    /// Two-bit encoding used in the secure messaging indicator
    pub const fn bits(self) -> u8 {
        match self {
            Self::Plain => 0b00,
            Self::Maced => 0b01,
            Self::Encrypted => 0b10,
        }
    }

    /// Decode the two-bit encoding
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Self::Plain),
            0b01 => Some(Self::Maced),
            0b10 => Some(Self::Encrypted),
            _ => None,
        }
    }
}

/// Session keys derived by a successful authentication
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    mac: AesKey,
    enc: AesKey,
}

impl SessionKeys {
    pub(crate) const fn new(mac: AesKey, enc: AesKey) -> Self {
        Self { mac, enc }
    }

    /// MAC key (`k1`)
    pub const fn mac(&self) -> &AesKey {
        &self.mac
    }

    /// Encryption key (`k0`)
    pub const fn enc(&self) -> &AesKey {
        &self.enc
    }

    /// Whether both keys are all zero
    pub fn is_zero(&self) -> bool {
        self.mac.iter().chain(self.enc.iter()).all(|b| *b == 0)
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys").finish_non_exhaustive()
    }
}

/// Cryptograms produced by [`SessionContext::derive_session`]
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Cryptograms {
    /// Host cryptogram sent to the card (`cP`)
    pub(crate) host: AesBlock,
    /// Confirmation the card must return (`cT`)
    pub(crate) card: AesBlock,
}

/// Split a 22-byte challenge into its 16-byte and 6-byte randoms
pub(crate) fn split_challenge(challenge: &[u8; CHALLENGE_LEN]) -> (Random, SmallRandom) {
    let mut big = [0u8; RANDOM_LEN];
    let mut small = [0u8; CHALLENGE_LEN - RANDOM_LEN];
    big.copy_from_slice(&challenge[..RANDOM_LEN]);
    small.copy_from_slice(&challenge[RANDOM_LEN..]);
    (big, small)
}

/// State of one CIPURSE session
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SessionContext {
    #[zeroize(skip)]
    request_level: SecurityLevel,
    #[zeroize(skip)]
    response_level: SecurityLevel,
    key_index: u8,
    key: Option<AesKey>,
    host_challenge: Option<[u8; CHALLENGE_LEN]>,
    card_challenge: Option<[u8; CHALLENGE_LEN]>,
    session_keys: Option<SessionKeys>,
    ssc: u64,
    authenticated: bool,
}

impl SessionContext {
    /// Create a cleared context
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the key for a pending authentication, discarding any prior session
    pub fn set_key(&mut self, key_index: u8, key: &AesKey) {
        self.clear();
        self.key_index = key_index;
        self.key = Some(*key);
    }

    /// Store the card challenge (`RP || rP`)
    pub fn set_card_challenge(&mut self, challenge: &[u8; CHALLENGE_LEN]) {
        self.card_challenge = Some(*challenge);
    }

    /// Store the host challenge (`RQ || rQ`)
    pub fn set_host_challenge(&mut self, challenge: &[u8; CHALLENGE_LEN]) {
        self.host_challenge = Some(*challenge);
    }

    /// Change the security levels of both directions.
    ///
    /// An unauthenticated context cannot protect frames, so secured levels
    /// fall back to `Plain` with a warning.
    pub fn set_security_levels(&mut self, request: SecurityLevel, response: SecurityLevel) {
        if !self.authenticated && (request.is_secured() || response.is_secured()) {
            warn!(
                ?request,
                ?response,
                "Secure channel not established, falling back to plain"
            );
            self.request_level = SecurityLevel::Plain;
            self.response_level = SecurityLevel::Plain;
            return;
        }

        debug!(?request, ?response, "Setting security levels");
        self.request_level = request;
        self.response_level = response;
    }

    /// Derive the session keys from the key and both challenges.
    ///
    /// Nothing is written to the context unless every value could be
    /// computed. The context stays unauthenticated until
    /// [`Self::mark_authenticated`] is called.
    pub(crate) fn derive_session(&mut self) -> Result<Cryptograms> {
        let key = self.key.as_ref().ok_or(Error::InvalidData("no key set"))?;
        let card = self
            .card_challenge
            .as_ref()
            .ok_or(Error::InvalidData("no card challenge"))?;
        let host = self
            .host_challenge
            .as_ref()
            .ok_or(Error::InvalidData("no host challenge"))?;

        let (card_random, card_small) = split_challenge(card);
        let (host_random, host_small) = split_challenge(host);

        let mut k0 = crypto::derive_k0(key, &card_small, &host_small);
        let cryptograms = Cryptograms {
            host: crypto::host_cryptogram(&k0, &card_random),
            card: crypto::card_cryptogram(&k0, &host_random),
        };
        let keys = SessionKeys::new(crypto::derive_mac_key(&k0, &card_random, &host_random), k0);
        k0.zeroize();

        self.session_keys = Some(keys);
        self.ssc = 0;
        Ok(cryptograms)
    }

    /// Mark the session as authenticated and protect both directions with a MAC
    pub(crate) fn mark_authenticated(&mut self) -> Result<()> {
        if self.session_keys.is_none() {
            return Err(Error::SessionRequired);
        }
        self.authenticated = true;
        self.request_level = SecurityLevel::Maced;
        self.response_level = SecurityLevel::Maced;
        Ok(())
    }

    /// Zeroize all key material and return to the unauthenticated state
    pub fn clear(&mut self) {
        if self.authenticated {
            debug!("Clearing authenticated session");
        }
        self.zeroize();
        self.request_level = SecurityLevel::Plain;
        self.response_level = SecurityLevel::Plain;
        self.key = None;
        self.host_challenge = None;
        self.card_challenge = None;
        self.session_keys = None;
    }

    /// Whether the context holds no session state
    pub fn is_cleared(&self) -> bool {
        !self.authenticated
            && self.key.is_none()
            && self.session_keys.is_none()
            && self.host_challenge.is_none()
            && self.card_challenge.is_none()
            && self.ssc == 0
            && !self.request_level.is_secured()
            && !self.response_level.is_secured()
    }

    /// Advance the send sequence counter and return its new value
    pub(crate) fn next_ssc(&mut self) -> u64 {
        self.ssc = self.ssc.wrapping_add(1);
        self.ssc
    }

    /// Roll the counter back to a value read before a frame that never
    /// reached the card
    pub(crate) const fn restore_ssc(&mut self, ssc: u64) {
        self.ssc = ssc;
    }

    /// Request security level
    pub const fn request_level(&self) -> SecurityLevel {
        self.request_level
    }

    /// Response security level
    pub const fn response_level(&self) -> SecurityLevel {
        self.response_level
    }

    /// Index of the key used for the session
    pub const fn key_index(&self) -> u8 {
        self.key_index
    }

    /// Whether mutual authentication succeeded
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Session keys, present once the session has been derived
    pub const fn session_keys(&self) -> Option<&SessionKeys> {
        self.session_keys.as_ref()
    }

    /// Current send sequence counter
    pub const fn ssc(&self) -> u64 {
        self.ssc
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("request_level", &self.request_level)
            .field("response_level", &self.response_level)
            .field("key_index", &self.key_index)
            .field("authenticated", &self.authenticated)
            .field("ssc", &self.ssc)
            .finish_non_exhaustive()
    }
}
