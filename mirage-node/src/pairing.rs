//! Pairing: the two-round key exchange that establishes the shared key.
//!
//! ```text
//! Idle -> KeyInitiateSent -> PeerKeyReceived -> AwaitingUserConfirmation
//!      -> KeyFinalizeSent -> Paired
//! ```
//!
//! Any failure lands in `Failed`. Between the rounds the user has to press
//! the camera's shutter key; the camera only accepts the finalize request
//! after that, so the handshake always waits out the confirmation delay.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use mirage_keys::{
    KeyStore, PeerKey, SharedKey, load_or_generate_identity, store_peer_key, store_shared_key,
};

use crate::catalog::{KeyExchange, key_exchange};
use crate::session::Session;
use crate::transport::{Transport, TransportKind};
use crate::Error;

pub const DEFAULT_CONFIRMATION_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    KeyInitiateSent,
    PeerKeyReceived,
    AwaitingUserConfirmation,
    KeyFinalizeSent,
    Paired,
    Failed,
}

impl fmt::Display for PairingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::KeyInitiateSent => "key exchange initiate",
            Self::PeerKeyReceived => "peer key received",
            Self::AwaitingUserConfirmation => "awaiting user confirmation",
            Self::KeyFinalizeSent => "key exchange finalize",
            Self::Paired => "paired",
            Self::Failed => "failed",
        })
    }
}

type Observer = Box<dyn Fn(PairingState) + Send + Sync>;

pub struct PairingHandshake {
    store: Arc<dyn KeyStore>,
    me: String,
    peer: String,
    confirmation_delay: Duration,
    state: PairingState,
    observer: Option<Observer>,
}

impl PairingHandshake {
    /// `me` names the local identity files, `peer` the camera's.
    pub fn new(store: Arc<dyn KeyStore>, me: impl Into<String>, peer: impl Into<String>) -> Self {
        Self {
            store,
            me: me.into(),
            peer: peer.into(),
            confirmation_delay: DEFAULT_CONFIRMATION_DELAY,
            state: PairingState::Idle,
            observer: None,
        }
    }

    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// Called on every state change
    pub fn on_transition(mut self, observer: impl Fn(PairingState) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn confirmation_delay(&self) -> Duration {
        self.confirmation_delay
    }

    /// Run the whole exchange. On success the shared key is stored and
    /// installed on `session`. A failed run can simply be run again.
    pub async fn run<T: Transport>(&mut self, session: &mut Session<T>) -> Result<SharedKey, Error> {
        if self.state != PairingState::Idle {
            tracing::debug!(from = %self.state, "restarting pairing");
            self.state = PairingState::Idle;
        }

        match self.exchange(session).await {
            Ok(key) => Ok(key),
            Err(e) => {
                tracing::warn!(error = %e, "pairing failed");
                self.advance(PairingState::Failed);
                Err(e)
            }
        }
    }

    async fn exchange<T: Transport>(&mut self, session: &mut Session<T>) -> Result<SharedKey, Error> {
        if session.transport().kind() != TransportKind::Ble {
            return Err(self.fail("pairing needs a BLE transport"));
        }
        let crypto = Arc::clone(session.crypto());

        let local = load_or_generate_identity(&*self.store, &*crypto, &self.me)
            .map_err(|e| self.fail_with("cannot load local identity", e.into()))?;

        let initiate = key_exchange(KeyExchange::Initiate, &local.public, &local.salt);
        self.advance(PairingState::KeyInitiateSent);
        let reply = session
            .send_with(&initiate, false)
            .await
            .map_err(|e| self.fail_with("no answer to key exchange", e))?;
        if !reply.is_ok() {
            return Err(self.fail("key exchange rejected"));
        }
        let peer = reply
            .key_exchange_response
            .filter(|k| !k.public_key.is_empty() && !k.salt.is_empty())
            .map(|k| PeerKey { public: k.public_key, salt: k.salt })
            .ok_or_else(|| self.fail("camera sent no public key"))?;
        store_peer_key(&*self.store, &self.peer, &peer)
            .map_err(|e| self.fail_with("cannot store camera key", e.into()))?;
        self.advance(PairingState::PeerKeyReceived);

        self.advance(PairingState::AwaitingUserConfirmation);
        tracing::info!(delay = ?self.confirmation_delay, "press the shutter key on the camera");
        tokio::time::sleep(self.confirmation_delay).await;

        let finalize = key_exchange(KeyExchange::Finalize, &local.public, &local.salt);
        self.advance(PairingState::KeyFinalizeSent);
        let reply = session
            .send_with(&finalize, false)
            .await
            .map_err(|e| self.fail_with("no answer to key exchange finalize", e))?;
        if !reply.is_ok() {
            return Err(self.fail("key exchange finalize rejected"));
        }

        let key = crypto
            .derive_shared_key(&local.private, &peer.public, &local.salt, &peer.salt)
            .map_err(|e| self.fail_with("cannot derive shared key", e.into()))?;
        store_shared_key(&*self.store, &self.me, &self.peer, &key)
            .map_err(|e| self.fail_with("cannot store shared key", e.into()))?;

        session.set_shared_key(key.clone());
        self.advance(PairingState::Paired);
        Ok(key)
    }

    fn advance(&mut self, next: PairingState) {
        tracing::info!(from = %self.state, to = %next, "pairing");
        self.state = next;
        if let Some(observer) = &self.observer {
            observer(next);
        }
    }

    fn fail(&self, reason: &str) -> Error {
        Error::HandshakeFailed {
            step: self.state,
            reason: reason.to_string(),
            source: None,
        }
    }

    fn fail_with(&self, reason: &str, source: Error) -> Error {
        Error::HandshakeFailed {
            step: self.state,
            reason: format!("{reason}: {source}"),
            source: Some(Box::new(source)),
        }
    }
}

impl fmt::Debug for PairingHandshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingHandshake")
            .field("me", &self.me)
            .field("peer", &self.peer)
            .field("state", &self.state)
            .finish()
    }
}
