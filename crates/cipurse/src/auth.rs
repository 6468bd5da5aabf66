//! Mutual authentication
//!
//! The handshake is driven as a small state machine:
//!
//! ```text
//! Idle -> ChallengeRequested -> ChallengeReceived -> AuthenticationSent -> Authenticated
//!   \____________________\___________________\___________________\____-> Failed
//! ```
//!
//! The session being negotiated lives in a pending context and only
//! replaces the channel's context once the card's confirmation verifies.
//! Any failure clears the channel's context.

use std::{fmt, mem};

use cipurse_apdu_core::CardTransport;
use rand::RngCore;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    AuthFailure, Error, Result,
    channel::{CipurseChannel, Outcome},
    constants::{AUTH_PARAMS_LEN, CHALLENGE_LEN, CONFIRMATION_LEN},
    context::SessionContext,
    crypto::{self, AesKey},
};

/// Values exchanged during one mutual authentication
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub(crate) struct AuthenticationExchange {
    card_challenge: [u8; CHALLENGE_LEN],
    host_challenge: [u8; CHALLENGE_LEN],
    parameters: [u8; AUTH_PARAMS_LEN],
    card_confirmation: [u8; CONFIRMATION_LEN],
    expected_confirmation: [u8; CONFIRMATION_LEN],
}

impl AuthenticationExchange {
    fn new(card_challenge: [u8; CHALLENGE_LEN]) -> Self {
        Self {
            card_challenge,
            host_challenge: [0; CHALLENGE_LEN],
            parameters: [0; AUTH_PARAMS_LEN],
            card_confirmation: [0; CONFIRMATION_LEN],
            expected_confirmation: [0; CONFIRMATION_LEN],
        }
    }
}

impl fmt::Debug for AuthenticationExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationExchange")
            .finish_non_exhaustive()
    }
}

/// State of the mutual authentication handshake
#[derive(Debug, Default)]
pub(crate) enum AuthState {
    /// Nothing sent yet
    #[default]
    Idle,
    /// GET CHALLENGE answered, response not yet checked
    ChallengeRequested(Outcome),
    /// Card challenge stored
    ChallengeReceived(AuthenticationExchange),
    /// MUTUAL AUTHENTICATE answered, response not yet checked
    AuthenticationSent {
        /// Exchange values so far
        exchange: AuthenticationExchange,
        /// Card's answer
        outcome: Outcome,
    },
    /// Card confirmation verified
    Authenticated,
    /// Handshake aborted
    Failed(Error),
}

impl AuthState {
    /// Short name used in logs
    pub(crate) const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ChallengeRequested(_) => "challenge-requested",
            Self::ChallengeReceived(_) => "challenge-received",
            Self::AuthenticationSent { .. } => "authentication-sent",
            Self::Authenticated => "authenticated",
            Self::Failed(_) => "failed",
        }
    }

    /// Whether no further transition is possible
    pub(crate) const fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Failed(_))
    }
}

/// One handshake in progress
struct Handshake {
    pending: SessionContext,
    state: AuthState,
}

impl Handshake {
    fn new(key_index: u8, key: &AesKey) -> Self {
        let mut pending = SessionContext::new();
        pending.set_key(key_index, key);
        Self {
            pending,
            state: AuthState::Idle,
        }
    }

    /// Perform a single transition
    fn step<T: CardTransport>(&mut self, channel: &mut CipurseChannel<T>) {
        let from = self.state.name();
        let next = match mem::take(&mut self.state) {
            AuthState::Idle => match channel.challenge() {
                Ok(outcome) => AuthState::ChallengeRequested(outcome),
                Err(e) => AuthState::Failed(e),
            },
            AuthState::ChallengeRequested(outcome) => self.receive_challenge(outcome),
            AuthState::ChallengeReceived(exchange) => self.send_authentication(channel, exchange),
            AuthState::AuthenticationSent { exchange, outcome } => {
                self.verify_confirmation(exchange, outcome)
            }
            terminal => terminal,
        };
        debug!(from, to = next.name(), "Authentication state transition");
        self.state = next;
    }

    fn receive_challenge(&mut self, outcome: Outcome) -> AuthState {
        match outcome {
            Outcome::Success(payload) => match <[u8; CHALLENGE_LEN]>::try_from(payload.as_ref()) {
                Ok(challenge) => AuthState::ChallengeReceived(AuthenticationExchange::new(challenge)),
                Err(_) => AuthState::Failed(Error::ProtocolShape {
                    operation: "GET CHALLENGE",
                    expected: CHALLENGE_LEN,
                    actual: payload.len(),
                }),
            },
            Outcome::ChainedMore { payload, .. } => AuthState::Failed(Error::ProtocolShape {
                operation: "GET CHALLENGE",
                expected: CHALLENGE_LEN,
                actual: payload.len(),
            }),
            Outcome::CardError { status, .. } => {
                AuthState::Failed(AuthFailure::ChallengeRejected(status).into())
            }
        }
    }

    fn send_authentication<T: CardTransport>(
        &mut self,
        channel: &mut CipurseChannel<T>,
        mut exchange: AuthenticationExchange,
    ) -> AuthState {
        self.pending.set_card_challenge(&exchange.card_challenge);
        rand::rng().fill_bytes(&mut exchange.host_challenge);
        self.pending.set_host_challenge(&exchange.host_challenge);

        let cryptograms = match self.pending.derive_session() {
            Ok(cryptograms) => cryptograms,
            Err(e) => return AuthState::Failed(e),
        };
        exchange.parameters[..16].copy_from_slice(&cryptograms.host);
        exchange.parameters[16..].copy_from_slice(&exchange.host_challenge);
        exchange.expected_confirmation = cryptograms.card;

        match channel.mutual_authenticate(self.pending.key_index(), &exchange.parameters) {
            Ok(outcome) => AuthState::AuthenticationSent { exchange, outcome },
            Err(e) => AuthState::Failed(e),
        }
    }

    fn verify_confirmation(
        &mut self,
        mut exchange: AuthenticationExchange,
        outcome: Outcome,
    ) -> AuthState {
        let payload = match outcome {
            Outcome::Success(payload) => payload,
            chained @ Outcome::ChainedMore { .. } => {
                return AuthState::Failed(AuthFailure::from_status(chained.status()).into());
            }
            Outcome::CardError { status, .. } => {
                return AuthState::Failed(AuthFailure::from_status(status).into());
            }
        };

        if payload.len() != CONFIRMATION_LEN {
            return AuthState::Failed(AuthFailure::ConfirmationShape(payload.len()).into());
        }
        exchange.card_confirmation.copy_from_slice(&payload);

        if !crypto::cryptograms_match(&exchange.expected_confirmation, &exchange.card_confirmation) {
            return AuthState::Failed(AuthFailure::ConfirmationMismatch.into());
        }

        match self.pending.mark_authenticated() {
            Ok(()) => AuthState::Authenticated,
            Err(e) => AuthState::Failed(e),
        }
    }
}

impl<T: CardTransport> CipurseChannel<T> {
    /// Run the mutual authentication handshake with the given key.
    ///
    /// The current session is discarded first. On success both directions
    /// are protected with a MAC; on failure the context is left cleared.
    /// The handshake is never retried.
    pub fn authenticate(&mut self, key_index: u8, key: &AesKey) -> Result<()> {
        debug!(key_index, "Starting mutual authentication");
        self.context.clear();

        let mut handshake = Handshake::new(key_index, key);
        while !handshake.state.is_terminal() {
            handshake.step(self);
        }

        match mem::take(&mut handshake.state) {
            AuthState::Authenticated => {
                self.context = mem::take(&mut handshake.pending);
                debug!(key_index, "Mutual authentication succeeded");
                Ok(())
            }
            AuthState::Failed(e) => {
                warn!(key_index, error = %e, "Mutual authentication failed");
                self.context.clear();
                Err(e)
            }
            // The loop only exits on a terminal state
            _ => {
                self.context.clear();
                Err(Error::SessionRequired)
            }
        }
    }
}
