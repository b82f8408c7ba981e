#![forbid(unsafe_code)]

use std::fmt;
use std::sync::RwLock;

use generic_array::{GenericArray, typenum::U64};
use rand::RngCore;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

/// Error type for key access operations.
#[derive(Debug, Error)]
pub enum KeyAccessError {
    /// Lock was poisoned (a thread panicked while holding it)
    #[error("Key lock was poisoned")]
    LockPoisoned,

    /// The key material was wiped with [`MasterKey::destroy`].
    #[error("Key material has been destroyed")]
    Destroyed,
}

struct KeyPair {
    aes: Zeroizing<[u8; 32]>,
    mac: Zeroizing<[u8; 32]>,
}

/// Master key pair for vault operations.
///
/// Holds the 256-bit AES encryption key and the 256-bit MAC key. Both are
/// zeroed when the key is dropped or explicitly [destroyed](Self::destroy),
/// e.g. when a vault session is locked while tasks still hold an `Arc` to it.
///
/// Access to key material is provided through scoped methods; the raw bytes
/// never escape the callback.
///
/// # Thread Safety
///
/// `MasterKey` is `Send + Sync` and meant to be shared as `Arc<MasterKey>`.
pub struct MasterKey {
    keys: RwLock<Option<KeyPair>>,
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("keys", &"[REDACTED]")
            .finish()
    }
}

impl MasterKey {
    /// Generate a new random master key pair using a cryptographically secure RNG.
    pub fn random() -> Self {
        let mut aes_key = Zeroizing::new([0u8; 32]);
        let mut mac_key = Zeroizing::new([0u8; 32]);
        rand::rng().fill_bytes(aes_key.as_mut());
        rand::rng().fill_bytes(mac_key.as_mut());
        Self::new(*aes_key, *mac_key)
    }

    /// Create a new master key pair from raw key material.
    ///
    /// The caller is responsible for zeroing the original arrays if they
    /// contain sensitive data.
    pub fn new(aes_key: [u8; 32], mac_key: [u8; 32]) -> Self {
        MasterKey {
            keys: RwLock::new(Some(KeyPair {
                aes: Zeroizing::new(aes_key),
                mac: Zeroizing::new(mac_key),
            })),
        }
    }

    /// Wipe the key material. Every later access fails with
    /// [`KeyAccessError::Destroyed`].
    pub fn destroy(&self) {
        if let Ok(mut keys) = self.keys.write() {
            // Zeroizing wipes both halves on drop.
            keys.take();
        }
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.keys.read().map_or(true, |keys| keys.is_none())
    }

    fn with_pair<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&KeyPair) -> R,
    {
        let guard = self.keys.read().map_err(|_| KeyAccessError::LockPoisoned)?;
        let pair = guard.as_ref().ok_or(KeyAccessError::Destroyed)?;
        Ok(f(pair))
    }

    /// Execute a function with access to just the AES encryption key.
    ///
    /// # Example
    ///
    /// ```
    /// # use oxcloud_core::crypto::MasterKey;
    /// # use aes_gcm::{Aes256Gcm, Key, KeyInit};
    /// let master_key = MasterKey::random();
    ///
    /// let cipher = master_key.with_aes_key(|key_bytes| {
    ///     let key: &Key<Aes256Gcm> = key_bytes.into();
    ///     Aes256Gcm::new(key)
    /// }).unwrap();
    /// ```
    pub fn with_aes_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&[u8; 32]) -> R,
    {
        self.with_pair(|pair| f(&pair.aes))
    }

    /// Execute a function with access to both keys in AES-SIV order (MAC || AES).
    ///
    /// The 64-byte combined key is zeroed after the callback completes.
    pub fn with_siv_key<F, R>(&self, f: F) -> Result<R, KeyAccessError>
    where
        F: FnOnce(&GenericArray<u8, U64>) -> R,
    {
        // GenericArray doesn't implement DefaultIsZeroes
        struct ZeroizeOnDrop(GenericArray<u8, U64>);

        impl Drop for ZeroizeOnDrop {
            fn drop(&mut self) {
                self.0.zeroize();
            }
        }

        self.with_pair(|pair| {
            let mut key = ZeroizeOnDrop(GenericArray::<u8, U64>::default());
            // Note: SIV uses MAC key first, then AES key
            key.0[..32].copy_from_slice(pair.mac.as_ref());
            key.0[32..].copy_from_slice(pair.aes.as_ref());
            f(&key.0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_access() {
        let key = MasterKey::new([1u8; 32], [2u8; 32]);
        let sum: u32 = key
            .with_aes_key(|k| k.iter().map(|b| u32::from(*b)).sum())
            .unwrap();
        assert_eq!(sum, 32);
    }

    #[test]
    fn test_siv_key_ordering() {
        let key = MasterKey::new([0xAA; 32], [0xBB; 32]);
        key.with_siv_key(|k| {
            assert!(k[..32].iter().all(|b| *b == 0xBB), "MAC key comes first");
            assert!(k[32..].iter().all(|b| *b == 0xAA), "AES key comes second");
        })
        .unwrap();
    }

    #[test]
    fn test_destroy_revokes_access() {
        let key = MasterKey::random();
        assert!(!key.is_destroyed());
        key.destroy();
        assert!(key.is_destroyed());
        assert!(matches!(key.with_aes_key(|_| ()), Err(KeyAccessError::Destroyed)));
    }

    #[test]
    fn test_debug_redacts() {
        let key = MasterKey::new([7u8; 32], [7u8; 32]);
        assert!(!format!("{key:?}").contains('7'));
    }
}
