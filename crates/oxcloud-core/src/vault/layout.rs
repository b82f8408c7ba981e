//! Pure path arithmetic for the ciphertext tree. No I/O happens here.
//!
//! ```text
//! <vault root>/d/<digest[0..2]>/<digest[2..32]>/   shard of one folder
//!     <name>.c9r                                   file, or folder container holding dir.c9r
//!     <hash>.c9s/                                  shortened entry
//!         name.c9s                                 full ciphertext name
//!         contents.c9r | dir.c9r                   file content | folder marker
//!     dirid.c9r                                    recovery copy of the folder's id
//! ```

use crate::error::CloudProviderError;
use crate::path::CloudPath;

/// Top-level data directory under the vault root.
pub const DATA_DIR: &str = "d";
/// Extension of regular ciphertext entries.
pub const CIPHERTEXT_EXT: &str = ".c9r";
/// Extension of shortened entries.
pub const SHORTENED_EXT: &str = ".c9s";
/// Sidecar holding the full name of a shortened entry.
pub const NAME_FILE: &str = "name.c9s";
/// Content of a shortened file.
pub const CONTENTS_FILE: &str = "contents.c9r";
/// Directory marker name used by formats 7 and 8.
pub const DEFAULT_DIR_MARKER: &str = "dir.c9r";
/// Recovery file inside a shard.
pub const DIR_ID_BACKUP_FILE: &str = "dirid.c9r";

/// Characters of the directory digest used for the shard path.
pub const SHARD_DIGEST_LEN: usize = 32;
/// Length of a shortened entry name: 28 base64 characters plus `.c9s`.
pub const SHORTENED_NAME_MAX_LEN: usize = 32;

/// Kind of an entry found while listing a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryFormat {
    /// `<name>.c9r`
    Regular,
    /// `<hash>.c9s/`
    Shortened,
}

/// Classify a shard entry by name. Returns `None` for anything that is not a
/// vault entry, including the `dirid.c9r` recovery file.
pub fn classify_entry(name: &str) -> Option<EntryFormat> {
    if name == DIR_ID_BACKUP_FILE {
        None
    } else if name.len() > SHORTENED_EXT.len() && name.ends_with(SHORTENED_EXT) {
        Some(EntryFormat::Shortened)
    } else if name.len() > CIPHERTEXT_EXT.len() && name.ends_with(CIPHERTEXT_EXT) {
        Some(EntryFormat::Regular)
    } else {
        None
    }
}

/// `<vault root>/d`.
pub fn data_dir(vault_root: &CloudPath) -> CloudPath {
    vault_root.appending_component(DATA_DIR)
}

/// Shard of the folder whose directory digest is `digest`:
/// `<vault root>/d/<digest[0..2]>/<digest[2..32]>`.
pub fn shard_path(vault_root: &CloudPath, digest: &str) -> Result<CloudPath, CloudProviderError> {
    let digest = digest.get(..SHARD_DIGEST_LEN).ok_or_else(|| {
        CloudProviderError::InvalidVaultStructure {
            path: vault_root.clone(),
            reason: format!(
                "directory digest has {} characters, expected at least {SHARD_DIGEST_LEN}",
                digest.len()
            ),
        }
    })?;
    let (head, tail) = digest.split_at(2);
    Ok(data_dir(vault_root).appending_component(head).appending_component(tail))
}

/// Where a cleartext item lives in the ciphertext tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CiphertextLocation {
    /// Shard of the parent folder.
    pub parent_shard: CloudPath,
    /// The `.c9r` entry, or the `.c9s` folder when shortened.
    pub container: CloudPath,
    /// Full ciphertext name including `.c9r`, before shortening.
    pub ciphertext_name: String,
    pub is_shortened: bool,
}

impl CiphertextLocation {
    /// Directory marker inside the container.
    pub fn marker_path(&self, marker_name: &str) -> CloudPath {
        self.container.appending_component(marker_name)
    }

    /// The ciphertext of a file: the container itself, or `contents.c9r`
    /// inside a shortened container.
    pub fn file_content_path(&self) -> CloudPath {
        if self.is_shortened {
            self.container.appending_component(CONTENTS_FILE)
        } else {
            self.container.clone()
        }
    }

    /// `name.c9s` of a shortened container.
    pub fn name_file_path(&self) -> CloudPath {
        self.container.appending_component(NAME_FILE)
    }

    /// The encrypted name without `.c9r`, as passed to name decryption.
    pub fn encrypted_name(&self) -> &str {
        self.ciphertext_name
            .strip_suffix(CIPHERTEXT_EXT)
            .unwrap_or(&self.ciphertext_name)
    }
}
