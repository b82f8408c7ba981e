use std::sync::Arc;

use tracing::trace;

use super::keys::MasterKey;
use super::{CryptoError, Cryptor, content, names};
use crate::path::DirectoryId;

/// Cryptomator SIV_GCM cryptor: AES-SIV for names and directory digests,
/// chunked AES-GCM for file content.
#[derive(Debug, Clone)]
pub struct VaultCryptor {
    master_key: Arc<MasterKey>,
}

impl VaultCryptor {
    pub fn new(master_key: Arc<MasterKey>) -> Self {
        VaultCryptor { master_key }
    }

    /// The shared master key (for locking the session with [`MasterKey::destroy`]).
    pub fn master_key(&self) -> &Arc<MasterKey> {
        &self.master_key
    }
}

impl Cryptor for VaultCryptor {
    fn encrypt_dir_id(&self, dir_id: &DirectoryId) -> Result<String, CryptoError> {
        let digest = names::hash_dir_id(dir_id.as_bytes(), &self.master_key)?;
        trace!(dir_id = %dir_id, digest = %digest, "Hashed directory ID");
        Ok(digest)
    }

    fn encrypt_file_name(
        &self,
        cleartext_name: &str,
        parent_dir_id: &DirectoryId,
    ) -> Result<String, CryptoError> {
        names::encrypt_filename(cleartext_name, parent_dir_id.as_bytes(), &self.master_key)
    }

    fn decrypt_file_name(
        &self,
        ciphertext_name: &str,
        parent_dir_id: &DirectoryId,
    ) -> Result<String, CryptoError> {
        names::decrypt_filename(ciphertext_name, parent_dir_id.as_bytes(), &self.master_key)
    }

    fn encrypt_content(&self, cleartext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        content::encrypt_content(cleartext, &self.master_key)
    }

    fn decrypt_content(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        content::decrypt_content(ciphertext, &self.master_key)
    }

    fn cleartext_size(&self, ciphertext_size: u64) -> Option<u64> {
        content::cleartext_size(ciphertext_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_bound_to_parent() {
        let cryptor = VaultCryptor::new(Arc::new(MasterKey::random()));
        let parent = DirectoryId::generate();
        let encrypted = cryptor.encrypt_file_name("notes.md", &parent).unwrap();
        assert_eq!(cryptor.decrypt_file_name(&encrypted, &parent).unwrap(), "notes.md");
        assert!(cryptor.decrypt_file_name(&encrypted, &DirectoryId::root()).is_err());
    }

    #[test]
    fn test_destroyed_key_fails_cleanly() {
        let cryptor = VaultCryptor::new(Arc::new(MasterKey::random()));
        cryptor.master_key().destroy();
        assert!(matches!(
            cryptor.encrypt_dir_id(&DirectoryId::root()),
            Err(CryptoError::KeyAccess(_))
        ));
    }
}
