//! Long-name shortening (`.c9s` entries).
//!
//! Many backends cap name lengths well below what an encrypted name can
//! reach. Ciphertext names longer than the threshold are stored under a
//! fixed-length hash, with the full name kept in a `name.c9s` sidecar.

use moka::sync::Cache;
use tracing::{debug, instrument, trace};

use crate::crypto::names::shortened_name_hash;
use crate::error::CloudProviderError;
use crate::path::CloudPath;
use crate::provider::CloudProvider;
use crate::scratch::ScratchSpace;
use crate::vault::config::DEFAULT_SHORTENING_THRESHOLD;
use crate::vault::layout::{CIPHERTEXT_EXT, NAME_FILE, SHORTENED_EXT};

const SIDECAR_CACHE_CAPACITY: u64 = 10_000;

/// Result of [`NameShortener::deflate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeflatedName {
    /// The name to store on the backend.
    pub stored_name: String,
    pub is_shortened: bool,
}

/// Deflates long ciphertext names and inflates them back from their sidecar.
#[derive(Clone)]
pub struct NameShortener {
    threshold: usize,
    // .c9s container path -> full ciphertext name
    sidecars: Cache<CloudPath, String>,
}

impl std::fmt::Debug for NameShortener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameShortener")
            .field("threshold", &self.threshold)
            .field("cached_sidecars", &self.sidecars.entry_count())
            .finish()
    }
}

impl Default for NameShortener {
    fn default() -> Self {
        Self::new(DEFAULT_SHORTENING_THRESHOLD)
    }
}

impl NameShortener {
    pub fn new(threshold: usize) -> Self {
        NameShortener {
            threshold,
            sidecars: Cache::builder().max_capacity(SIDECAR_CACHE_CAPACITY).build(),
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Map a full ciphertext name (with `.c9r`) to the name stored on the
    /// backend. Names within the threshold are returned unchanged.
    pub fn deflate(&self, ciphertext_name: &str) -> DeflatedName {
        if ciphertext_name.len() > self.threshold {
            DeflatedName {
                stored_name: format!("{}{SHORTENED_EXT}", shortened_name_hash(ciphertext_name)),
                is_shortened: true,
            }
        } else {
            DeflatedName {
                stored_name: ciphertext_name.to_string(),
                is_shortened: false,
            }
        }
    }

    /// Whether a stored name denotes a shortened entry.
    pub fn is_shortened(stored_name: &str) -> bool {
        stored_name.ends_with(SHORTENED_EXT)
    }

    /// Record the full name of a container just written.
    pub fn remember(&self, container: &CloudPath, ciphertext_name: &str) {
        self.sidecars.insert(container.clone(), ciphertext_name.to_string());
    }

    /// Drop the cached name of a container that was moved or deleted.
    pub fn forget(&self, container: &CloudPath) {
        self.sidecars.invalidate(container);
    }

    /// Recover the full ciphertext name of the shortened `container` by reading
    /// its `name.c9s`.
    ///
    /// The sidecar must hash back to the container name; anything else is
    /// reported as [`CloudProviderError::InvalidVaultStructure`].
    #[instrument(level = "trace", skip(self, provider, scratch), fields(container = %container))]
    pub async fn inflate<P: CloudProvider + ?Sized>(
        &self,
        provider: &P,
        scratch: &ScratchSpace,
        container: &CloudPath,
    ) -> Result<String, CloudProviderError> {
        if let Some(name) = self.sidecars.get(container) {
            trace!("Sidecar cache hit");
            return Ok(name);
        }

        let sidecar = container.appending_component(NAME_FILE);
        let temp = scratch
            .temp_file()
            .map_err(|e| CloudProviderError::io(&sidecar, e))?;
        provider.download_file(&sidecar, &temp).await?;
        let bytes = tokio::fs::read(&temp)
            .await
            .map_err(|e| CloudProviderError::io(&sidecar, e))?;

        let invalid = |reason: String| CloudProviderError::InvalidVaultStructure {
            path: sidecar.clone(),
            reason,
        };
        let name = String::from_utf8(bytes).map_err(|e| invalid(format!("name is not UTF-8: {e}")))?;
        let name = name.trim().to_string();
        if !name.ends_with(CIPHERTEXT_EXT) {
            return Err(invalid("name does not end with .c9r".to_string()));
        }
        let expected = format!("{}{SHORTENED_EXT}", shortened_name_hash(&name));
        if container.last_component() != Some(expected.as_str()) {
            return Err(invalid("name does not match the container hash".to_string()));
        }

        debug!(name_len = name.len(), "Inflated shortened name");
        self.sidecars.insert(container.clone(), name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LocalFileSystemProvider;
    use proptest::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn test_threshold_boundary() {
        let shortener = NameShortener::new(220);
        let at_threshold = format!("{}.c9r", "a".repeat(216));
        assert_eq!(at_threshold.len(), 220);
        let deflated = shortener.deflate(&at_threshold);
        assert!(!deflated.is_shortened);
        assert_eq!(deflated.stored_name, at_threshold);

        let above = format!("{}.c9r", "a".repeat(217));
        let deflated = shortener.deflate(&above);
        assert!(deflated.is_shortened);
        assert!(NameShortener::is_shortened(&deflated.stored_name));
        assert_eq!(deflated.stored_name.len(), 32);
    }

    #[tokio::test]
    async fn test_inflate_reads_and_caches_sidecar() {
        let dir = TempDir::new().unwrap();
        let provider = LocalFileSystemProvider::new(dir.path());
        let scratch = ScratchSpace::ephemeral().unwrap();
        let shortener = NameShortener::new(40);

        let long_name = format!("{}.c9r", "x".repeat(80));
        let deflated = shortener.deflate(&long_name);
        let container = CloudPath::root().appending_component(&deflated.stored_name);
        std::fs::create_dir(dir.path().join(&deflated.stored_name)).unwrap();
        std::fs::write(dir.path().join(&deflated.stored_name).join(NAME_FILE), &long_name).unwrap();

        assert_eq!(shortener.inflate(&provider, &scratch, &container).await.unwrap(), long_name);

        // Served from the cache once the sidecar is gone
        std::fs::remove_file(dir.path().join(&deflated.stored_name).join(NAME_FILE)).unwrap();
        assert_eq!(shortener.inflate(&provider, &scratch, &container).await.unwrap(), long_name);

        shortener.forget(&container);
        assert!(shortener.inflate(&provider, &scratch, &container).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_inflate_rejects_mismatched_sidecar() {
        let dir = TempDir::new().unwrap();
        let provider = LocalFileSystemProvider::new(dir.path());
        let scratch = ScratchSpace::ephemeral().unwrap();
        let shortener = NameShortener::new(40);

        std::fs::create_dir(dir.path().join("bogus.c9s")).unwrap();
        std::fs::write(dir.path().join("bogus.c9s").join(NAME_FILE), "other.c9r").unwrap();

        let err = shortener
            .inflate(&provider, &scratch, &CloudPath::new("/bogus.c9s"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudProviderError::InvalidVaultStructure { .. }));
    }

    proptest! {
        #[test]
        fn prop_deflate_is_bounded_and_deterministic(name in "[A-Za-z0-9_=-]{1,400}", threshold in 32usize..300) {
            let shortener = NameShortener::new(threshold);
            let name = format!("{name}.c9r");
            let first = shortener.deflate(&name);
            prop_assert_eq!(&first, &shortener.deflate(&name));
            prop_assert_eq!(first.is_shortened, name.len() > threshold);
            prop_assert!(first.stored_name.len() <= threshold.max(name.len()));
            if first.is_shortened {
                prop_assert_eq!(first.stored_name.len(), 32);
            }
        }
    }
}
