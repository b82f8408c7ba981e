//! Error types for the crate
//!
//! [`CloudProviderError`] is the single taxonomy shared by every
//! [`CloudProvider`](crate::provider::CloudProvider), raw or vault-decorated,
//! so that generic helpers such as
//! [`ensure_folder_chain`](crate::folder_chain::ensure_folder_chain) can
//! classify failures without knowing which layer produced them.

use std::io;

use thiserror::Error;

use crate::path::{CloudPath, PathError};

// Re-export error types from submodules
pub use crate::crypto::CryptoError;
pub use crate::retry::RetryError;
pub use crate::vault::config::ConfigError;

/// Errors reported by cloud providers and by the vault layer on top of them.
///
/// # Security Classification
///
/// [`CloudProviderError::AuthenticationFailed`] is an **integrity violation**:
/// a name, marker, or file failed authenticated decryption. It means tampering,
/// a wrong key, or an entry moved between directories behind our back.
#[derive(Error, Debug)]
pub enum CloudProviderError {
    /// The item (or, during resolution, one of its ancestors) does not exist.
    #[error("Item not found: {path}")]
    ItemNotFound { path: CloudPath },

    /// Creating or uploading collided with an existing item.
    #[error("Item already exists: {path}")]
    ItemAlreadyExists { path: CloudPath },

    /// The parent folder of the target does not exist.
    #[error("Parent folder does not exist for {path}")]
    ParentFolderDoesNotExist { path: CloudPath },

    /// The item exists but is a file where a folder was expected, or vice versa.
    #[error("Item type mismatch at {path}")]
    ItemTypeMismatch { path: CloudPath },

    /// **[INTEGRITY VIOLATION]** Authenticated decryption failed.
    #[error("[INTEGRITY VIOLATION] Authentication failed for {path}: {source}")]
    AuthenticationFailed {
        path: CloudPath,
        #[source]
        source: CryptoError,
    },

    /// The root has no parent.
    #[error("The root path has no parent")]
    NoParent,

    /// A folder cannot be moved below itself.
    #[error("Cannot move {from} into its own subtree at {to}")]
    MoveIntoDescendant { from: CloudPath, to: CloudPath },

    /// The continuation token was not issued by this provider or is stale.
    #[error("Invalid page token: {token}")]
    PageTokenInvalid { token: String },

    /// The ciphertext tree does not look like a vault (bad marker, bad digest).
    #[error("Invalid vault structure at {path}: {reason}")]
    InvalidVaultStructure { path: CloudPath, reason: String },

    /// A non-authentication cryptographic failure.
    #[error("Cryptographic operation failed for {path}: {source}")]
    Crypto {
        path: CloudPath,
        #[source]
        source: CryptoError,
    },

    /// Local I/O failed (scratch files, local provider).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: CloudPath,
        #[source]
        source: io::Error,
    },

    /// Any other backend-specific failure.
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CloudProviderError {
    /// Wrap a cryptographic error, keeping integrity violations distinguishable.
    pub fn from_crypto(path: &CloudPath, source: CryptoError) -> Self {
        if source.is_integrity_violation() {
            CloudProviderError::AuthenticationFailed {
                path: path.clone(),
                source,
            }
        } else {
            CloudProviderError::Crypto {
                path: path.clone(),
                source,
            }
        }
    }

    /// Wrap a local I/O error.
    pub fn io(path: &CloudPath, source: io::Error) -> Self {
        CloudProviderError::Io {
            path: path.clone(),
            source,
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, CloudProviderError::ItemNotFound { .. })
    }

    #[inline]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, CloudProviderError::ItemAlreadyExists { .. })
    }
}

impl From<PathError> for CloudProviderError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::NoParent => CloudProviderError::NoParent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_crypto_classifies_integrity_violations() {
        let path = CloudPath::new("/a");
        let auth = CloudProviderError::from_crypto(&path, CryptoError::AuthenticationFailed {
            context: "name".to_string(),
        });
        assert!(matches!(auth, CloudProviderError::AuthenticationFailed { .. }));

        let other = CloudProviderError::from_crypto(&path, CryptoError::InvalidCiphertext {
            reason: "too short".to_string(),
        });
        assert!(matches!(other, CloudProviderError::Crypto { .. }));
    }

    #[test]
    fn test_no_parent_conversion() {
        let err: CloudProviderError = PathError::NoParent.into();
        assert!(matches!(err, CloudProviderError::NoParent));
        assert_eq!(err.to_string(), "The root path has no parent");
    }
}
