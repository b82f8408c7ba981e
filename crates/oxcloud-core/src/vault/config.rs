#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::layout::{DEFAULT_DIR_MARKER, SHORTENED_NAME_MAX_LEN};

/// Default shortening threshold for filenames (in characters of the encrypted
/// name, `.c9r` included)
pub const DEFAULT_SHORTENING_THRESHOLD: usize = 220;

/// Errors raised while reading or validating vault configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported vault format {format}; supported formats are 7 and 8")]
    UnsupportedFormat { format: i32 },

    #[error("Unsupported cipher combo: {0}")]
    UnsupportedCipherCombo(String),

    #[error("Shortening threshold {threshold} is below the minimum of {minimum}")]
    ThresholdTooSmall { threshold: i64, minimum: usize },
}

/// Cipher combination used by a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherCombo {
    /// AES-SIV for filenames, AES-GCM for content
    SivGcm,
}

impl CipherCombo {
    /// Convert to configuration string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CipherCombo::SivGcm => "SIV_GCM",
        }
    }
}

impl FromStr for CipherCombo {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SIV_GCM" => Ok(CipherCombo::SivGcm),
            _ => Err(ConfigError::UnsupportedCipherCombo(s.to_owned())),
        }
    }
}

impl fmt::Display for CipherCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the content of a directory marker is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarkerEncoding {
    /// Raw directory id bytes, as every Cryptomator client writes them.
    #[default]
    Plain,
    /// The id passed through the cryptor's content encryption.
    Encrypted,
}

/// On-backend layout details that differ between vault format revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatPolicy {
    /// File inside a folder container that holds the folder's directory id.
    pub dir_marker_name: String,
    /// Whether new shards get a `dirid.c9r` recovery file.
    pub write_dir_id_backup: bool,
    pub marker_encoding: MarkerEncoding,
}

impl FormatPolicy {
    /// Vault format 8: writes `dirid.c9r` into every new shard.
    pub fn format8() -> Self {
        FormatPolicy {
            dir_marker_name: DEFAULT_DIR_MARKER.to_string(),
            write_dir_id_backup: true,
            marker_encoding: MarkerEncoding::Plain,
        }
    }

    /// Vault format 7: same layout, no recovery files.
    pub fn format7() -> Self {
        FormatPolicy {
            write_dir_id_backup: false,
            ..Self::format8()
        }
    }

    /// Policy for a numeric vault format.
    pub fn for_format(format: i32) -> Result<Self, ConfigError> {
        match format {
            8 => Ok(Self::format8()),
            7 => Ok(Self::format7()),
            _ => Err(ConfigError::UnsupportedFormat { format }),
        }
    }

    #[must_use]
    pub fn with_marker_encoding(mut self, encoding: MarkerEncoding) -> Self {
        self.marker_encoding = encoding;
        self
    }
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self::format8()
    }
}

/// Settings of a [`VaultProvider`](super::VaultProvider).
///
/// ```
/// use oxcloud_core::vault::{FormatPolicy, VaultProviderConfig};
///
/// let config = VaultProviderConfig::default()
///     .with_format(FormatPolicy::format7())
///     .with_shortening_threshold(120);
/// assert_eq!(config.shortening_threshold, 120);
/// assert!(!config.format.write_dir_id_backup);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultProviderConfig {
    pub format: FormatPolicy,
    /// Ciphertext names (including `.c9r`) longer than this are shortened.
    pub shortening_threshold: usize,
}

impl Default for VaultProviderConfig {
    fn default() -> Self {
        VaultProviderConfig {
            format: FormatPolicy::format8(),
            shortening_threshold: DEFAULT_SHORTENING_THRESHOLD,
        }
    }
}

impl VaultProviderConfig {
    #[must_use]
    pub fn with_format(mut self, format: FormatPolicy) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_shortening_threshold(mut self, threshold: usize) -> Self {
        self.shortening_threshold = threshold;
        self
    }

    /// Build a config from validated vault claims.
    pub fn from_claims(claims: &VaultConfigClaims) -> Result<Self, ConfigError> {
        claims.validate()?;
        Ok(VaultProviderConfig {
            format: FormatPolicy::for_format(claims.format)?,
            shortening_threshold: claims.shortening_threshold(),
        })
    }
}

/// Vault configuration claims, as found in the payload of `vault.cryptomator`.
///
/// Signature verification of the surrounding token is done by whoever holds
/// the master key; this type only interprets the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfigClaims {
    pub format: i32,
    #[serde(default = "default_shortening_threshold")]
    pub shortening_threshold: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    pub cipher_combo: String,
}

fn default_shortening_threshold() -> i64 {
    DEFAULT_SHORTENING_THRESHOLD as i64
}

impl VaultConfigClaims {
    /// Parse claims from a JSON payload.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the parsed cipher combination used by this vault.
    pub fn cipher_combo(&self) -> Result<CipherCombo, ConfigError> {
        self.cipher_combo.parse()
    }

    /// Returns the shortening threshold for filenames.
    pub fn shortening_threshold(&self) -> usize {
        usize::try_from(self.shortening_threshold.max(0)).unwrap_or(usize::MAX)
    }

    /// Reject formats, cipher combos and thresholds this crate cannot serve.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FormatPolicy::for_format(self.format)?;
        self.cipher_combo()?;
        // A shortened name must actually be shorter than the threshold.
        if self.shortening_threshold < SHORTENED_NAME_MAX_LEN as i64 {
            return Err(ConfigError::ThresholdTooSmall {
                threshold: self.shortening_threshold,
                minimum: SHORTENED_NAME_MAX_LEN,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_parse_camel_case() {
        let claims = VaultConfigClaims::from_json(
            r#"{"format":8,"shorteningThreshold":220,"jti":"a1b2","cipherCombo":"SIV_GCM"}"#,
        )
        .unwrap();
        assert_eq!(claims.format, 8);
        assert_eq!(claims.shortening_threshold(), 220);
        assert_eq!(claims.cipher_combo().unwrap(), CipherCombo::SivGcm);

        let config = VaultProviderConfig::from_claims(&claims).unwrap();
        assert_eq!(config, VaultProviderConfig::default());
    }

    #[test]
    fn test_claims_default_threshold() {
        let claims = VaultConfigClaims::from_json(r#"{"format":7,"cipherCombo":"SIV_GCM"}"#).unwrap();
        let config = VaultProviderConfig::from_claims(&claims).unwrap();
        assert_eq!(config.shortening_threshold, DEFAULT_SHORTENING_THRESHOLD);
        assert_eq!(config.format, FormatPolicy::format7());
    }

    #[test]
    fn test_claims_rejections() {
        let unsupported_format = VaultConfigClaims::from_json(r#"{"format":6,"cipherCombo":"SIV_GCM"}"#).unwrap();
        assert!(matches!(
            unsupported_format.validate(),
            Err(ConfigError::UnsupportedFormat { format: 6 })
        ));

        let ctrmac = VaultConfigClaims::from_json(r#"{"format":8,"cipherCombo":"SIV_CTRMAC"}"#).unwrap();
        assert!(matches!(ctrmac.validate(), Err(ConfigError::UnsupportedCipherCombo(_))));

        let tiny = VaultConfigClaims::from_json(r#"{"format":8,"shorteningThreshold":10,"cipherCombo":"SIV_GCM"}"#)
            .unwrap();
        assert!(matches!(tiny.validate(), Err(ConfigError::ThresholdTooSmall { .. })));

        assert!(matches!(VaultConfigClaims::from_json("{"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_format_policies() {
        assert!(FormatPolicy::format8().write_dir_id_backup);
        assert!(!FormatPolicy::format7().write_dir_id_backup);
        assert_eq!(FormatPolicy::format7().dir_marker_name, "dir.c9r");
        assert_eq!(
            FormatPolicy::default()
                .with_marker_encoding(MarkerEncoding::Encrypted)
                .marker_encoding,
            MarkerEncoding::Encrypted
        );
    }
}
