//! Mirage key material
//!
//! Key pair generation, shared-key derivation, payload encryption and the
//! on-disk key files that carry a pairing from one session to the next.

mod error;
mod provider;
mod store;

pub use error::{CryptoError, KeyStoreError};
pub use provider::{
    CryptoProvider, KeyPair, NONCE_LEN, P256Provider, SALT_LEN, SHARED_KEY_LEN, SharedKey,
};
pub use store::{
    FileKeyStore, KeyStore, MemoryKeyStore, PeerKey, load_or_generate_identity, load_peer_key,
    load_shared_key, shared_key_name, store_peer_key, store_shared_key,
};
