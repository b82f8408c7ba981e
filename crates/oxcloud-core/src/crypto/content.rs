//! File content encryption (AES-GCM, 32 KiB chunks).
//!
//! Layout of an encrypted file:
//!
//! ```text
//! header:  nonce (12) || AES-GCM(0xFF * 8 || content_key (32)) || tag (16)   = 68 bytes
//! chunk n: nonce (12) || AES-GCM(cleartext chunk, AAD = n as u64 BE || header nonce) || tag (16)
//! ```
//!
//! An empty file still carries one (empty) authenticated chunk.

use aead::Payload;
use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::RngCore;
use tracing::{debug, instrument, trace, warn};
use zeroize::Zeroizing;

use super::CryptoError;
use super::keys::MasterKey;

/// Size of the encrypted file header.
pub const HEADER_SIZE: usize = 68;
/// Cleartext bytes per chunk.
pub const CHUNK_PLAINTEXT_SIZE: usize = 32 * 1024;
/// Per-chunk overhead: nonce + tag.
pub const CHUNK_OVERHEAD: usize = 12 + 16;
/// Ciphertext bytes per full chunk.
pub const CHUNK_ENCRYPTED_SIZE: usize = CHUNK_PLAINTEXT_SIZE + CHUNK_OVERHEAD;

const HEADER_NONCE_SIZE: usize = 12;

/// Encrypt a complete file.
#[instrument(level = "debug", skip(content, master_key), fields(cleartext_size = content.len()))]
pub fn encrypt_content(content: &[u8], master_key: &MasterKey) -> Result<Vec<u8>, CryptoError> {
    let mut content_key = Zeroizing::new([0u8; 32]);
    rand::rng().fill_bytes(content_key.as_mut());
    let mut header_nonce = [0u8; HEADER_NONCE_SIZE];
    rand::rng().fill_bytes(&mut header_nonce);

    let header = master_key.with_aes_key(|aes_key| {
        let key: &Key<Aes256Gcm> = aes_key.into();
        let cipher = Aes256Gcm::new(key);

        let mut plaintext = Zeroizing::new(vec![0xFF; 8]);
        plaintext.extend_from_slice(content_key.as_ref());

        cipher
            .encrypt(Nonce::from_slice(&header_nonce), plaintext.as_ref())
            .map_err(|e| CryptoError::EncryptionFailed {
                reason: format!("header: {e}"),
            })
    })??;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(content_key.as_ref()));
    let chunk_count = content.len().div_ceil(CHUNK_PLAINTEXT_SIZE).max(1);
    let mut encrypted = Vec::with_capacity(HEADER_SIZE + content.len() + chunk_count * CHUNK_OVERHEAD);
    encrypted.extend_from_slice(&header_nonce);
    encrypted.extend_from_slice(&header);

    // Always process at least one chunk, even for empty content
    let chunks: Vec<&[u8]> = if content.is_empty() {
        vec![content]
    } else {
        content.chunks(CHUNK_PLAINTEXT_SIZE).collect()
    };

    for (chunk_number, chunk) in chunks.iter().enumerate() {
        let mut chunk_nonce = [0u8; 12];
        rand::rng().fill_bytes(&mut chunk_nonce);

        let aad = chunk_aad(chunk_number, &header_nonce);
        let encrypted_chunk = cipher
            .encrypt(Nonce::from_slice(&chunk_nonce), Payload { msg: chunk, aad: &aad })
            .map_err(|e| CryptoError::EncryptionFailed {
                reason: format!("chunk {chunk_number}: {e}"),
            })?;

        encrypted.extend_from_slice(&chunk_nonce);
        encrypted.extend_from_slice(&encrypted_chunk);
    }

    debug!(encrypted_size = encrypted.len(), chunk_count, "File content encrypted");
    Ok(encrypted)
}

/// Decrypt a complete file.
#[instrument(level = "debug", skip(encrypted, master_key), fields(encrypted_size = encrypted.len()))]
pub fn decrypt_content(encrypted: &[u8], master_key: &MasterKey) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < HEADER_SIZE {
        warn!(actual_size = encrypted.len(), "Ciphertext shorter than file header");
        return Err(CryptoError::InvalidCiphertext {
            reason: format!("expected at least {HEADER_SIZE} header bytes, got {}", encrypted.len()),
        });
    }

    let (header, body) = encrypted.split_at(HEADER_SIZE);
    // Even an empty file carries one chunk.
    if body.is_empty() {
        warn!("Ciphertext has a header but no content chunk");
        return Err(CryptoError::InvalidCiphertext {
            reason: "missing content chunk".to_string(),
        });
    }
    let header_nonce = &header[..HEADER_NONCE_SIZE];

    let content_key = master_key.with_aes_key(|aes_key| {
        let key: &Key<Aes256Gcm> = aes_key.into();
        let cipher = Aes256Gcm::new(key);

        let decrypted = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(header_nonce), &header[HEADER_NONCE_SIZE..])
                .map_err(|_| {
                    warn!("Header decryption failed - authentication tag mismatch");
                    CryptoError::AuthenticationFailed {
                        context: "file header".to_string(),
                    }
                })?,
        );

        if decrypted.len() != 40 {
            return Err(CryptoError::InvalidCiphertext {
                reason: format!("decrypted header has {} bytes, expected 40", decrypted.len()),
            });
        }

        let mut content_key = Zeroizing::new([0u8; 32]);
        content_key.copy_from_slice(&decrypted[8..40]);
        Ok(content_key)
    })??;

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(content_key.as_ref()));
    let mut decrypted = Vec::with_capacity(body.len());

    for (chunk_number, chunk) in body.chunks(CHUNK_ENCRYPTED_SIZE).enumerate() {
        if chunk.len() < CHUNK_OVERHEAD {
            warn!(chunk = chunk_number, actual_size = chunk.len(), "Incomplete chunk");
            return Err(CryptoError::InvalidCiphertext {
                reason: format!("chunk {chunk_number} has only {} bytes", chunk.len()),
            });
        }

        let aad = chunk_aad(chunk_number, header_nonce);
        let cleartext = cipher
            .decrypt(Nonce::from_slice(&chunk[..12]), Payload { msg: &chunk[12..], aad: &aad })
            .map_err(|_| {
                warn!(chunk = chunk_number, "Chunk decryption failed - authentication tag mismatch");
                CryptoError::AuthenticationFailed {
                    context: format!("content chunk {chunk_number}"),
                }
            })?;

        trace!(chunk = chunk_number, size = cleartext.len(), "Chunk decrypted");
        decrypted.extend_from_slice(&cleartext);
    }

    Ok(decrypted)
}

/// Cleartext size of an encrypted file of `encrypted_size` bytes.
///
/// Returns `None` when the size cannot belong to a well-formed file.
pub fn cleartext_size(encrypted_size: u64) -> Option<u64> {
    let header = HEADER_SIZE as u64;
    let full = CHUNK_ENCRYPTED_SIZE as u64;
    let overhead = CHUNK_OVERHEAD as u64;

    let body = encrypted_size.checked_sub(header).filter(|body| *body > 0)?;
    let full_chunks = body / full;
    let remainder = body % full;
    let partial = match remainder {
        0 => 0,
        r if r < overhead => return None,
        r => r - overhead,
    };
    Some(full_chunks * CHUNK_PLAINTEXT_SIZE as u64 + partial)
}

// AAD: chunk_number (8 bytes BE) || header_nonce (12 bytes)
fn chunk_aad(chunk_number: usize, header_nonce: &[u8]) -> [u8; 20] {
    let mut aad = [0u8; 20];
    aad[..8].copy_from_slice(&(chunk_number as u64).to_be_bytes());
    aad[8..].copy_from_slice(header_nonce);
    aad
}
