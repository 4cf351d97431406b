//! Key storage - raw byte files named after the identity they belong to
//!
//! | file                 | contents                     |
//! |----------------------|------------------------------|
//! | `<name>.key`         | private key (local identity) |
//! | `<name>.pub`         | public key                   |
//! | `<name>.salt`        | salt                         |
//! | `<me>_<peer>.skey`   | shared key after pairing     |

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zeroize::Zeroizing;

use crate::{CryptoProvider, KeyPair, KeyStoreError, SharedKey};

/// Read/write bytes by name
pub trait KeyStore: Send + Sync {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, KeyStoreError>;

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), KeyStoreError>;
}

fn check_name(name: &str) -> Result<(), KeyStoreError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(KeyStoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Key files in a single directory
#[derive(Debug, Clone)]
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

impl KeyStore for FileKeyStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        check_name(name)?;
        match fs::read(self.path_of(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(KeyStoreError::Io { name: name.to_string(), source }),
        }
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        check_name(name)?;
        let io_err = |source| KeyStoreError::Io { name: name.to_string(), source };
        fs::create_dir_all(&self.dir).map_err(io_err)?;
        fs::write(self.path_of(name), bytes).map_err(io_err)
    }
}

/// In-process store, mostly for tests
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        // A panic while holding the lock cannot leave the map half-written
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyStore for MemoryKeyStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, KeyStoreError> {
        check_name(name)?;
        Ok(self.lock().get(name).cloned())
    }

    fn write(&self, name: &str, bytes: &[u8]) -> Result<(), KeyStoreError> {
        check_name(name)?;
        self.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}

/// Public half of the camera's key exchange reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerKey {
    pub public: Vec<u8>,
    pub salt: Vec<u8>,
}

pub fn shared_key_name(me: &str, peer: &str) -> String {
    format!("{me}_{peer}.skey")
}

/// Load the local identity, or generate and persist a new one when any of
/// its three files is missing.
pub fn load_or_generate_identity(
    store: &dyn KeyStore,
    crypto: &dyn CryptoProvider,
    name: &str,
) -> Result<KeyPair, KeyStoreError> {
    let private = store.read(&format!("{name}.key"))?;
    let public = store.read(&format!("{name}.pub"))?;
    let salt = store.read(&format!("{name}.salt"))?;

    if let (Some(private), Some(public), Some(salt)) = (private, public, salt) {
        tracing::debug!(identity = name, "loaded identity");
        return Ok(KeyPair { private: Zeroizing::new(private), public, salt });
    }

    let pair = crypto.generate_key_pair()?;
    store.write(&format!("{name}.key"), &pair.private)?;
    store.write(&format!("{name}.pub"), &pair.public)?;
    store.write(&format!("{name}.salt"), &pair.salt)?;
    tracing::info!(identity = name, "generated new identity");

    Ok(pair)
}

pub fn store_peer_key(store: &dyn KeyStore, name: &str, key: &PeerKey) -> Result<(), KeyStoreError> {
    store.write(&format!("{name}.pub"), &key.public)?;
    store.write(&format!("{name}.salt"), &key.salt)
}

pub fn load_peer_key(store: &dyn KeyStore, name: &str) -> Result<Option<PeerKey>, KeyStoreError> {
    let public = store.read(&format!("{name}.pub"))?;
    let salt = store.read(&format!("{name}.salt"))?;
    Ok(match (public, salt) {
        (Some(public), Some(salt)) => Some(PeerKey { public, salt }),
        _ => None,
    })
}

pub fn store_shared_key(
    store: &dyn KeyStore,
    me: &str,
    peer: &str,
    key: &SharedKey,
) -> Result<(), KeyStoreError> {
    store.write(&shared_key_name(me, peer), key.as_bytes())
}

/// Only the `.skey` file counts as a completed pairing.
pub fn load_shared_key(
    store: &dyn KeyStore,
    me: &str,
    peer: &str,
) -> Result<Option<SharedKey>, KeyStoreError> {
    Ok(store
        .read(&shared_key_name(me, peer))?
        .filter(|bytes| !bytes.is_empty())
        .map(SharedKey::new))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::P256Provider;

    #[test]
    fn identity_is_generated_once() {
        let store = MemoryKeyStore::new();
        let crypto = P256Provider::new();

        let first = load_or_generate_identity(&store, &crypto, "me").unwrap();
        assert_eq!(store.names(), vec!["me.key", "me.pub", "me.salt"]);

        let second = load_or_generate_identity(&store, &crypto, "me").unwrap();
        assert_eq!(first.public, second.public);
        assert_eq!(first.salt, second.salt);
        assert_eq!(*first.private, *second.private);
    }

    #[test]
    fn partial_identity_is_regenerated() {
        let store = MemoryKeyStore::new();
        let crypto = P256Provider::new();
        store.write("me.pub", b"stale").unwrap();

        let pair = load_or_generate_identity(&store, &crypto, "me").unwrap();
        assert_ne!(pair.public, b"stale".to_vec());
        assert_eq!(store.read("me.pub").unwrap(), Some(pair.public));
    }

    #[test]
    fn peer_key_without_shared_key_is_not_a_pairing() {
        let store = MemoryKeyStore::new();
        let peer = PeerKey { public: vec![4; 65], salt: vec![1; 32] };
        store_peer_key(&store, "cam", &peer).unwrap();

        assert_eq!(load_peer_key(&store, "cam").unwrap(), Some(peer));
        assert!(load_shared_key(&store, "me", "cam").unwrap().is_none());
    }

    #[test]
    fn shared_key_file_name() {
        let store = MemoryKeyStore::new();
        store_shared_key(&store, "me", "cam", &SharedKey::new(vec![9; 32])).unwrap();
        assert!(store.contains("me_cam.skey"));
        assert_eq!(load_shared_key(&store, "me", "cam").unwrap().unwrap().as_bytes(), &[9; 32]);
    }

    #[test]
    fn names_with_separators_are_rejected() {
        let store = MemoryKeyStore::new();
        assert!(matches!(store.read("../etc/passwd"), Err(KeyStoreError::InvalidName(_))));
        assert!(matches!(store.write("", b"x"), Err(KeyStoreError::InvalidName(_))));
    }

    #[test]
    fn file_store_reads_what_it_wrote() {
        let dir = std::env::temp_dir().join(format!("mirage-keys-test-{}", std::process::id()));
        let store = FileKeyStore::new(&dir);

        assert_eq!(store.read("cam.pub").unwrap(), None);
        store.write("cam.pub", &[1, 2, 3]).unwrap();
        assert_eq!(store.read("cam.pub").unwrap(), Some(vec![1, 2, 3]));

        let _ = fs::remove_dir_all(&dir);
    }
}
