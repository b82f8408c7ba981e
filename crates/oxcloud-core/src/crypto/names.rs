//! Filename and directory-ID encryption (AES-SIV).

use aes_siv::{KeyInit, siv::Aes256Siv};
use base64::{Engine as _, engine::general_purpose};
use data_encoding::BASE32;
use ring::digest;
use tracing::trace;
use unicode_normalization::UnicodeNormalization;

use super::CryptoError;
use super::keys::MasterKey;

/// Hash a directory ID for use in the vault's directory structure.
///
/// 1. Encrypt the directory ID bytes with AES-SIV (no associated data)
/// 2. Hash the result with SHA-1 (20 bytes)
/// 3. Encode as uppercase Base32, which yields exactly 32 characters
///
/// The storage shard is then `d/{hash[0:2]}/{hash[2:32]}/`.
pub fn hash_dir_id(dir_id: &[u8], master_key: &MasterKey) -> Result<String, CryptoError> {
    master_key.with_siv_key(|key| {
        let mut cipher = Aes256Siv::new(key);

        let associated_data: &[&[u8]] = &[];
        let encrypted = cipher
            .encrypt(associated_data, dir_id)
            .map_err(|e| CryptoError::EncryptionFailed {
                reason: format!("directory ID hashing: {e}"),
            })?;

        let hashed = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, &encrypted);
        Ok(BASE32.encode(hashed.as_ref()))
    })?
}

/// Encrypt a filename using AES-SIV with the parent directory ID as context.
///
/// The filename is normalized to Unicode NFC first (macOS hands out NFD).
/// Returns base64url **with** padding and **without** the `.c9r` extension.
pub fn encrypt_filename(
    name: &str,
    parent_dir_id: &[u8],
    master_key: &MasterKey,
) -> Result<String, CryptoError> {
    let normalized_name: String = name.nfc().collect();

    master_key.with_siv_key(|key| {
        let mut cipher = Aes256Siv::new(key);

        let associated_data: &[&[u8]] = &[parent_dir_id];
        let encrypted = cipher
            .encrypt(associated_data, normalized_name.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed {
                reason: format!("filename encryption: {e}"),
            })?;

        Ok(general_purpose::URL_SAFE.encode(&encrypted))
    })?
}

/// Decrypt a filename using AES-SIV with the parent directory ID as context.
///
/// Accepts padded and unpadded base64url for compatibility with other
/// implementations.
pub fn decrypt_filename(
    encrypted_name: &str,
    parent_dir_id: &[u8],
    master_key: &MasterKey,
) -> Result<String, CryptoError> {
    let decoded = general_purpose::URL_SAFE
        .decode(encrypted_name.as_bytes())
        .or_else(|_| general_purpose::URL_SAFE_NO_PAD.decode(encrypted_name.as_bytes()))
        .map_err(|e| CryptoError::Base64Decode {
            reason: e.to_string(),
        })?;

    master_key.with_siv_key(|key| {
        let mut cipher = Aes256Siv::new(key);

        let associated_data: &[&[u8]] = &[parent_dir_id];
        let decrypted = cipher.decrypt(associated_data, &decoded).map_err(|_| {
            trace!(name_len = encrypted_name.len(), "SIV tag mismatch on filename");
            CryptoError::AuthenticationFailed {
                context: display_name(encrypted_name),
            }
        })?;

        String::from_utf8(decrypted).map_err(|e| CryptoError::Utf8Decode {
            reason: e.to_string(),
        })
    })?
}

/// Hash used for shortened names: Base64url (padded) of SHA-1 over the full
/// ciphertext name, including its `.c9r` extension.
pub fn shortened_name_hash(long_name: &str) -> String {
    let hash = digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, long_name.as_bytes());
    general_purpose::URL_SAFE.encode(hash.as_ref())
}

// Truncate long encrypted names for readability
fn display_name(encrypted_name: &str) -> String {
    if encrypted_name.len() > 40 {
        format!("encrypted name '{}...'", &encrypted_name[..37])
    } else {
        format!("encrypted name '{encrypted_name}'")
    }
}
