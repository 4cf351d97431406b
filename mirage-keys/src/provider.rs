//! Key agreement and payload encryption
//!
//! The camera pairs using ECDH over NIST P-256. The shared key is
//! `HKDF-SHA256(ikm = ECDH secret, salt = local_salt XOR peer_salt,
//! info = "ENCRYPTION")`. BLE payloads are sealed with AES-GCM as
//! `nonce || ciphertext || tag`.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use hkdf::Hkdf;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::CryptoError;

pub const SALT_LEN: usize = 32;
pub const SHARED_KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const KEY_INFO: &[u8] = b"ENCRYPTION";

/// An asymmetric key pair plus the salt sent alongside the public key
#[derive(Clone)]
pub struct KeyPair {
    pub private: Zeroizing<Vec<u8>>,
    pub public: Vec<u8>,
    pub salt: Vec<u8>,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("private", &"<redacted>")
            .field("public", &self.public.len())
            .field("salt", &self.salt.len())
            .finish()
    }
}

/// Symmetric key established by pairing
#[derive(Clone, PartialEq, Eq)]
pub struct SharedKey(Zeroizing<Vec<u8>>);

impl SharedKey {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedKey(<{} bytes>)", self.0.len())
    }
}

/// Cryptographic capabilities the protocol layer relies on
pub trait CryptoProvider: Send + Sync {
    fn generate_key_pair(&self) -> Result<KeyPair, CryptoError>;

    fn derive_shared_key(
        &self,
        local_private: &[u8],
        peer_public: &[u8],
        local_salt: &[u8],
        peer_salt: &[u8],
    ) -> Result<SharedKey, CryptoError>;

    fn encrypt(&self, key: &SharedKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, key: &SharedKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// P-256 ECDH, HKDF-SHA256 and AES-GCM
#[derive(Debug, Default, Clone, Copy)]
pub struct P256Provider;

impl P256Provider {
    pub fn new() -> Self {
        Self
    }
}

fn xor_salts(local: &[u8], peer: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if local.len() != peer.len() {
        return Err(CryptoError::SaltMismatch {
            local: local.len(),
            peer: peer.len(),
        });
    }
    Ok(local.iter().zip(peer).map(|(a, b)| a ^ b).collect())
}

enum Cipher {
    Aes128(Box<Aes128Gcm>),
    Aes256(Box<Aes256Gcm>),
}

impl Cipher {
    fn for_key(key: &SharedKey) -> Result<Self, CryptoError> {
        let bytes = key.as_bytes();
        match bytes.len() {
            16 => Aes128Gcm::new_from_slice(bytes)
                .map(|c| Self::Aes128(Box::new(c)))
                .map_err(|_| CryptoError::KeyLength(16)),
            32 => Aes256Gcm::new_from_slice(bytes)
                .map(|c| Self::Aes256(Box::new(c)))
                .map_err(|_| CryptoError::KeyLength(32)),
            n => Err(CryptoError::KeyLength(n)),
        }
    }

    fn encrypt(&self, nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.encrypt(nonce, plaintext),
            Self::Aes256(c) => c.encrypt(nonce, plaintext),
        }
        .map_err(|_| CryptoError::Encrypt)
    }

    fn decrypt(&self, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = Nonce::from_slice(nonce);
        match self {
            Self::Aes128(c) => c.decrypt(nonce, ciphertext),
            Self::Aes256(c) => c.decrypt(nonce, ciphertext),
        }
        .map_err(|_| CryptoError::Decrypt)
    }
}

impl CryptoProvider for P256Provider {
    fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false).as_bytes().to_vec();

        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        Ok(KeyPair {
            private: Zeroizing::new(secret.to_bytes().to_vec()),
            public,
            salt,
        })
    }

    fn derive_shared_key(
        &self,
        local_private: &[u8],
        peer_public: &[u8],
        local_salt: &[u8],
        peer_salt: &[u8],
    ) -> Result<SharedKey, CryptoError> {
        let secret =
            SecretKey::from_slice(local_private).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let peer =
            PublicKey::from_sec1_bytes(peer_public).map_err(|_| CryptoError::InvalidPublicKey)?;
        let salt = xor_salts(local_salt, peer_salt)?;

        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());
        let hk = Hkdf::<Sha256>::new(Some(&salt), shared.raw_secret_bytes());

        let mut okm = Zeroizing::new(vec![0u8; SHARED_KEY_LEN]);
        hk.expand(KEY_INFO, okm.as_mut_slice())
            .map_err(|_| CryptoError::KeyDerivation)?;

        Ok(SharedKey(okm))
    }

    fn encrypt(&self, key: &SharedKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Cipher::for_key(key)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let sealed = cipher.encrypt(&nonce, plaintext)?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, key: &SharedKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let cipher = Cipher::for_key(key)?;
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptoError::Decrypt);
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        cipher.decrypt(nonce, sealed)
    }
}
