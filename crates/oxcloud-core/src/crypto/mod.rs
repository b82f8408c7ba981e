//! Cryptographic capability consumed by the vault layer.
//!
//! The vault never touches key material. Everything it needs from the crypto
//! layer goes through the [`Cryptor`] trait; [`VaultCryptor`] is the
//! Cryptomator SIV_GCM implementation.

pub mod content;
pub mod cryptor;
pub mod keys;
pub mod names;

use thiserror::Error;

use crate::path::DirectoryId;

/// Errors that can occur during cryptographic operations.
///
/// # Security Classification
///
/// Some errors indicate potential **adversarial tampering**. They are marked
/// with `[INTEGRITY VIOLATION]` and reported by
/// [`is_integrity_violation`](Self::is_integrity_violation).
#[derive(Error, Debug)]
pub enum CryptoError {
    // =========================================================================
    // INTEGRITY VIOLATIONS - Potential adversarial tampering
    // =========================================================================
    /// Authenticated decryption failed.
    ///
    /// **[INTEGRITY VIOLATION]** The ciphertext was tampered with, the wrong
    /// key was used, or a name was decrypted against the wrong parent directory.
    #[error("[INTEGRITY VIOLATION] Authentication failed for {context}")]
    AuthenticationFailed { context: String },

    /// A ciphertext name is not valid base64url.
    ///
    /// **[INTEGRITY VIOLATION]** Vault names are always valid base64url, so this
    /// means a foreign or manipulated entry.
    #[error("[INTEGRITY VIOLATION] Invalid base64 encoding: {reason}")]
    Base64Decode { reason: String },

    // =========================================================================
    // INPUT ERRORS - Malformed or corrupted input
    // =========================================================================
    /// The ciphertext is structurally invalid (too short, truncated chunk).
    #[error("Invalid ciphertext: {reason}")]
    InvalidCiphertext { reason: String },

    /// Decrypted bytes were not valid UTF-8.
    #[error("Invalid UTF-8 after decryption: {reason}")]
    Utf8Decode { reason: String },

    // =========================================================================
    // PROGRAMMING ERRORS - Should not happen in normal operation
    // =========================================================================
    /// Encryption failed unexpectedly.
    #[error("Unexpected encryption failure: {reason}")]
    EncryptionFailed { reason: String },

    /// Key access failed due to memory protection error or lock poisoning.
    #[error("Key access failed: {0}")]
    KeyAccess(#[from] KeyAccessError),
}

impl CryptoError {
    /// Whether this error indicates tampering or a wrong key.
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            CryptoError::AuthenticationFailed { .. } | CryptoError::Base64Decode { .. }
        )
    }
}

/// Deterministic name encryption plus content encryption, as required by the
/// vault format.
///
/// Implementations must be deterministic for names and directory digests:
/// the same input always maps to the same output, otherwise paths cannot be
/// found again.
pub trait Cryptor: Send + Sync {
    /// Digest of a directory ID, used to locate the folder's storage shard.
    ///
    /// The result must be at least 32 characters; the vault uses the first 32.
    fn encrypt_dir_id(&self, dir_id: &DirectoryId) -> Result<String, CryptoError>;

    /// Encrypt a cleartext name bound to its parent directory.
    ///
    /// The result carries no extension; the vault appends `.c9r`.
    fn encrypt_file_name(
        &self,
        cleartext_name: &str,
        parent_dir_id: &DirectoryId,
    ) -> Result<String, CryptoError>;

    /// Decrypt a ciphertext name (without extension) bound to its parent directory.
    fn decrypt_file_name(
        &self,
        ciphertext_name: &str,
        parent_dir_id: &DirectoryId,
    ) -> Result<String, CryptoError>;

    /// Encrypt file content.
    fn encrypt_content(&self, cleartext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt file content.
    fn decrypt_content(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Cleartext size for a ciphertext size, if the content format allows computing it.
    fn cleartext_size(&self, _ciphertext_size: u64) -> Option<u64> {
        None
    }
}

// Re-export commonly used types
pub use cryptor::VaultCryptor;
pub use keys::{KeyAccessError, MasterKey};
