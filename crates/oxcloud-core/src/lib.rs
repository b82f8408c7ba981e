//! Cryptomator-compatible vaults on top of arbitrary cloud storage.
//!
//! [`VaultProvider`] wraps any [`CloudProvider`] and is one itself: callers
//! work with cleartext paths while the backend only ever sees the encrypted
//! `d/<2>/<30>/` layout.

pub mod cache;
pub mod crypto;
pub mod error;
pub mod folder_chain;
pub mod path;
pub mod provider;
pub mod retry;
pub mod scratch;
pub mod shortening;
pub mod vault;

// Re-export commonly used types at crate root
pub use cache::{DirectoryIdCache, PrefixInvalidatingCache};
pub use error::CloudProviderError;
pub use folder_chain::ensure_folder_chain;
pub use path::{CloudPath, DirectoryId};
pub use provider::{CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider};
pub use retry::{RetryError, RetryPolicy, retry_with_backoff};
pub use scratch::ScratchSpace;
pub use vault::{FormatPolicy, VaultProvider, VaultProviderConfig};
