#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("invalid peer public key")]
    InvalidPublicKey,
    #[error("salt length mismatch: local {local} bytes, peer {peer} bytes")]
    SaltMismatch { local: usize, peer: usize },
    #[error("key derivation failed")]
    KeyDerivation,
    #[error("unsupported shared key length: {0} bytes")]
    KeyLength(usize),
    #[error("encryption failed")]
    Encrypt,
    #[error("decryption failed")]
    Decrypt,
}

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("invalid key file name: {0:?}")]
    InvalidName(String),
    #[error("failed to access key file {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
