//! Vault-level abstractions and operations

pub mod config;
pub mod layout;
pub mod provider;

// Re-export commonly used types
pub use config::{
    CipherCombo, ConfigError, DEFAULT_SHORTENING_THRESHOLD, FormatPolicy, MarkerEncoding,
    VaultConfigClaims, VaultProviderConfig,
};
pub use layout::CiphertextLocation;
pub use provider::VaultProvider;
