//! The vault decorator: cleartext paths in, Cryptomator ciphertext layout out.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, instrument, trace, warn};

use super::config::{MarkerEncoding, VaultProviderConfig};
use super::layout::{self, CONTENTS_FILE, CiphertextLocation, DIR_ID_BACKUP_FILE, EntryFormat, NAME_FILE};
use crate::cache::DirectoryIdCache;
use crate::crypto::Cryptor;
use crate::error::CloudProviderError;
use crate::folder_chain::ensure_folder_chain;
use crate::path::{CloudPath, DirectoryId};
use crate::provider::{
    CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider, fetch_complete_item_list,
};
use crate::scratch::ScratchSpace;
use crate::shortening::NameShortener;

/// A [`CloudProvider`] that stores everything encrypted in a vault on another
/// provider.
///
/// Callers address cleartext paths relative to the vault root. Each folder
/// has a [`DirectoryId`] kept in a marker inside its container; its children
/// live in the shard `d/<2>/<30>` derived from that id, with names encrypted
/// against it. Resolved ids are cached per path, so only the first access to
/// a deep path pays one marker download per segment.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use oxcloud_core::crypto::{MasterKey, VaultCryptor};
/// # use oxcloud_core::path::CloudPath;
/// # use oxcloud_core::provider::{CloudProvider, LocalFileSystemProvider};
/// # use oxcloud_core::scratch::ScratchSpace;
/// # use oxcloud_core::vault::{VaultProvider, VaultProviderConfig};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let vault = VaultProvider::new(
///     LocalFileSystemProvider::new("/srv/storage"),
///     VaultCryptor::new(Arc::new(MasterKey::random())),
///     CloudPath::new("/my-vault"),
///     VaultProviderConfig::default(),
///     ScratchSpace::system(),
/// );
/// vault.initialize().await?;
/// vault.create_folder(&CloudPath::new("/Documents")).await?;
/// # Ok(())
/// # }
/// ```
pub struct VaultProvider<P, C> {
    backend: P,
    cryptor: C,
    vault_root: CloudPath,
    config: VaultProviderConfig,
    shortener: NameShortener,
    dir_ids: DirectoryIdCache,
    scratch: ScratchSpace,
}

impl<P, C> std::fmt::Debug for VaultProvider<P, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultProvider")
            .field("vault_root", &self.vault_root)
            .field("config", &self.config)
            .field("dir_id_cache", &self.dir_ids.stats())
            .finish_non_exhaustive()
    }
}

// Re-label backend errors with the cleartext path the caller asked about.
fn relabel(err: CloudProviderError, path: &CloudPath) -> CloudProviderError {
    match err {
        CloudProviderError::ItemNotFound { .. } => CloudProviderError::ItemNotFound { path: path.clone() },
        CloudProviderError::ItemAlreadyExists { .. } => {
            CloudProviderError::ItemAlreadyExists { path: path.clone() }
        }
        CloudProviderError::ItemTypeMismatch { .. } => {
            CloudProviderError::ItemTypeMismatch { path: path.clone() }
        }
        CloudProviderError::ParentFolderDoesNotExist { .. } => {
            CloudProviderError::ParentFolderDoesNotExist { path: path.clone() }
        }
        other => other,
    }
}

// A missing ancestor means the target's parent does not exist.
fn parent_missing(err: CloudProviderError, path: &CloudPath) -> CloudProviderError {
    match err {
        CloudProviderError::ItemNotFound { .. } => {
            CloudProviderError::ParentFolderDoesNotExist { path: path.clone() }
        }
        other => other,
    }
}

impl<P: CloudProvider, C: Cryptor> VaultProvider<P, C> {
    /// Wrap `backend`, storing the vault under `vault_root`.
    pub fn new(
        backend: P,
        cryptor: C,
        vault_root: CloudPath,
        config: VaultProviderConfig,
        scratch: ScratchSpace,
    ) -> Self {
        VaultProvider {
            shortener: NameShortener::new(config.shortening_threshold),
            dir_ids: DirectoryIdCache::new(DirectoryId::root()),
            backend,
            cryptor,
            vault_root,
            config,
            scratch,
        }
    }

    pub fn backend(&self) -> &P {
        &self.backend
    }

    pub fn cryptor(&self) -> &C {
        &self.cryptor
    }

    pub fn vault_root(&self) -> &CloudPath {
        &self.vault_root
    }

    pub fn config(&self) -> &VaultProviderConfig {
        &self.config
    }

    /// The path → directory id cache.
    pub fn dir_id_cache(&self) -> &DirectoryIdCache {
        &self.dir_ids
    }

    /// Create the data directory and the root shard if they are missing.
    ///
    /// Safe to call on an existing vault.
    #[instrument(level = "info", skip(self), fields(vault_root = %self.vault_root))]
    pub async fn initialize(&self) -> Result<(), CloudProviderError> {
        let root_shard = self.shard_path(&DirectoryId::root())?;
        let created = ensure_folder_chain(&self.backend, &root_shard).await?;
        if created > 0 && self.config.format.write_dir_id_backup {
            self.write_dir_id_backup(&DirectoryId::root(), &root_shard).await;
        }
        info!(created, "Vault structure ready");
        Ok(())
    }

    // ==================== Path translation ====================

    /// Shard of the folder with id `dir_id`.
    pub fn shard_path(&self, dir_id: &DirectoryId) -> Result<CloudPath, CloudProviderError> {
        let digest = self
            .cryptor
            .encrypt_dir_id(dir_id)
            .map_err(|e| CloudProviderError::from_crypto(&self.vault_root, e))?;
        layout::shard_path(&self.vault_root, &digest)
    }

    /// Directory id of `folder`, from the cache or by reading markers from
    /// the deepest cached ancestor downward.
    ///
    /// Every id read on the way is cached. Fails with `ItemNotFound` naming
    /// the first path segment whose marker is missing.
    #[instrument(level = "trace", skip(self), fields(folder = %folder))]
    pub async fn resolve_directory_id(
        &self,
        folder: &CloudPath,
    ) -> Result<DirectoryId, CloudProviderError> {
        if let Some(dir_id) = self.dir_ids.get(folder) {
            return Ok(dir_id);
        }

        let chain = folder.ancestors_from_root();
        let mut current = DirectoryId::root();
        let mut start = 0;
        for (index, ancestor) in chain.iter().enumerate().rev().skip(1) {
            if let Some(dir_id) = self.dir_ids.get(ancestor) {
                current = dir_id;
                start = index + 1;
                break;
            }
        }

        for ancestor in &chain[start..] {
            let location = self.location_in(&current, ancestor)?;
            current = self.read_marker(&location, ancestor).await?;
            trace!(folder = %ancestor, dir_id = %current, "Resolved directory id");
            self.dir_ids.put(ancestor.clone(), current.clone());
        }
        Ok(current)
    }

    /// Where the cleartext item `path` is stored.
    ///
    /// Deterministic for a given path as long as no ancestor is moved.
    pub async fn ciphertext_location(
        &self,
        path: &CloudPath,
    ) -> Result<CiphertextLocation, CloudProviderError> {
        let parent = path.parent()?;
        let parent_id = self.resolve_directory_id(&parent).await?;
        self.location_in(&parent_id, path)
    }

    fn location_in(
        &self,
        parent_id: &DirectoryId,
        path: &CloudPath,
    ) -> Result<CiphertextLocation, CloudProviderError> {
        let name = path.last_component().ok_or(CloudProviderError::NoParent)?;
        let parent_shard = self.shard_path(parent_id)?;
        let encrypted = self
            .cryptor
            .encrypt_file_name(name, parent_id)
            .map_err(|e| CloudProviderError::from_crypto(path, e))?;
        let ciphertext_name = format!("{encrypted}{}", layout::CIPHERTEXT_EXT);
        let deflated = self.shortener.deflate(&ciphertext_name);

        Ok(CiphertextLocation {
            container: parent_shard.appending_component(&deflated.stored_name),
            parent_shard,
            ciphertext_name,
            is_shortened: deflated.is_shortened,
        })
    }

    // ==================== Markers ====================

    fn encode_marker(&self, dir_id: &DirectoryId, path: &CloudPath) -> Result<Vec<u8>, CloudProviderError> {
        match self.config.format.marker_encoding {
            MarkerEncoding::Plain => Ok(dir_id.as_bytes().to_vec()),
            MarkerEncoding::Encrypted => self
                .cryptor
                .encrypt_content(dir_id.as_bytes())
                .map_err(|e| CloudProviderError::from_crypto(path, e)),
        }
    }

    fn decode_marker(&self, bytes: Vec<u8>, path: &CloudPath) -> Result<DirectoryId, CloudProviderError> {
        let raw = match self.config.format.marker_encoding {
            MarkerEncoding::Plain => bytes,
            MarkerEncoding::Encrypted => self
                .cryptor
                .decrypt_content(&bytes)
                .map_err(|e| CloudProviderError::from_crypto(path, e))?,
        };
        if raw.is_empty() {
            return Err(CloudProviderError::InvalidVaultStructure {
                path: path.clone(),
                reason: "empty directory marker".to_string(),
            });
        }
        Ok(DirectoryId::from_bytes(raw))
    }

    async fn read_marker(
        &self,
        location: &CiphertextLocation,
        path: &CloudPath,
    ) -> Result<DirectoryId, CloudProviderError> {
        let marker = location.marker_path(&self.config.format.dir_marker_name);
        let bytes = self
            .download_bytes(&marker)
            .await
            .map_err(|e| relabel(e, path))?;
        self.decode_marker(bytes, path)
    }

    async fn write_dir_id_backup(&self, dir_id: &DirectoryId, shard: &CloudPath) {
        if let Err(e) = self.try_write_dir_id_backup(dir_id, shard).await {
            warn!(shard = %shard, error = %e, "Failed to write directory id backup");
        }
    }

    async fn try_write_dir_id_backup(
        &self,
        dir_id: &DirectoryId,
        shard: &CloudPath,
    ) -> Result<(), CloudProviderError> {
        let backup = shard.appending_component(DIR_ID_BACKUP_FILE);
        let encrypted = self
            .cryptor
            .encrypt_content(dir_id.as_bytes())
            .map_err(|e| CloudProviderError::from_crypto(&backup, e))?;
        self.upload_bytes(&encrypted, &backup, true).await?;
        Ok(())
    }

    // ==================== Transfer helpers ====================

    async fn download_bytes(&self, path: &CloudPath) -> Result<Vec<u8>, CloudProviderError> {
        let temp = self
            .scratch
            .temp_file()
            .map_err(|e| CloudProviderError::io(path, e))?;
        self.backend.download_file(path, &temp).await?;
        tokio::fs::read(&temp)
            .await
            .map_err(|e| CloudProviderError::io(path, e))
    }

    async fn upload_bytes(
        &self,
        bytes: &[u8],
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let temp = self
            .scratch
            .temp_file_with(bytes)
            .await
            .map_err(|e| CloudProviderError::io(path, e))?;
        self.backend.upload_file(&temp, path, replace_existing).await
    }

    // ==================== Item inspection ====================

    /// Kind of the item at `location` plus the backend metadata describing
    /// its data (file ciphertext or folder container).
    async fn probe(
        &self,
        location: &CiphertextLocation,
        path: &CloudPath,
    ) -> Result<(CloudItemType, CloudItemMetadata), CloudProviderError> {
        let container = self
            .backend
            .fetch_item_metadata(&location.container)
            .await
            .map_err(|e| relabel(e, path))?;

        if !location.is_shortened {
            let item_type = if container.is_folder() {
                CloudItemType::Folder
            } else {
                CloudItemType::File
            };
            return Ok((item_type, container));
        }

        match self.backend.fetch_item_metadata(&location.file_content_path()).await {
            Ok(contents) => Ok((CloudItemType::File, contents)),
            Err(e) if e.is_not_found() => Ok((CloudItemType::Folder, container)),
            Err(e) => Err(e),
        }
    }

    async fn exists(&self, path: &CloudPath) -> Result<bool, CloudProviderError> {
        match self.backend.fetch_item_metadata(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether `location` holds a container left behind by an interrupted
    /// `create_folder`: a folder with neither a directory marker nor file
    /// contents.
    async fn is_incomplete_folder(
        &self,
        location: &CiphertextLocation,
    ) -> Result<bool, CloudProviderError> {
        if !self.backend.fetch_item_metadata(&location.container).await?.is_folder() {
            return Ok(false);
        }
        if self
            .exists(&location.marker_path(&self.config.format.dir_marker_name))
            .await?
        {
            return Ok(false);
        }
        if location.is_shortened && self.exists(&location.file_content_path()).await? {
            return Ok(false);
        }
        Ok(true)
    }

    fn cleartext_metadata(
        &self,
        path: CloudPath,
        item_type: CloudItemType,
        data: &CloudItemMetadata,
    ) -> CloudItemMetadata {
        let size = match item_type {
            CloudItemType::File => data.size.and_then(|size| self.cryptor.cleartext_size(size)),
            _ => None,
        };
        CloudItemMetadata {
            name: path.last_component().unwrap_or_default().to_string(),
            cloud_path: path,
            item_type,
            last_modified: data.last_modified,
            size,
        }
    }

    /// Turn one shard entry into cleartext metadata. `Ok(None)` for entries
    /// that are not vault items.
    async fn decrypt_entry(
        &self,
        dir_id: &DirectoryId,
        folder: &CloudPath,
        entry: CloudItemMetadata,
    ) -> Result<Option<CloudItemMetadata>, CloudProviderError> {
        let Some(format) = layout::classify_entry(&entry.name) else {
            trace!(entry = %entry.name, "Skipping non-vault entry");
            return Ok(None);
        };

        let (ciphertext_name, item_type, data) = match format {
            EntryFormat::Regular => {
                let item_type = match entry.item_type {
                    CloudItemType::Unknown => return Ok(None),
                    other => other,
                };
                (entry.name.clone(), item_type, entry)
            }
            EntryFormat::Shortened => {
                if !entry.is_folder() {
                    return Ok(None);
                }
                let name = self
                    .shortener
                    .inflate(&self.backend, &self.scratch, &entry.cloud_path)
                    .await?;
                let contents = entry.cloud_path.appending_component(CONTENTS_FILE);
                match self.backend.fetch_item_metadata(&contents).await {
                    Ok(metadata) => (name, CloudItemType::File, metadata),
                    Err(e) if e.is_not_found() => (name, CloudItemType::Folder, entry),
                    Err(e) => return Err(e),
                }
            }
        };

        let encrypted = ciphertext_name
            .strip_suffix(layout::CIPHERTEXT_EXT)
            .unwrap_or(&ciphertext_name);
        let cleartext = self
            .cryptor
            .decrypt_file_name(encrypted, dir_id)
            .map_err(|e| CloudProviderError::from_crypto(&data.cloud_path, e))?;
        if cleartext.is_empty() || cleartext.contains('/') || cleartext == "." || cleartext == ".." {
            return Err(CloudProviderError::InvalidVaultStructure {
                path: data.cloud_path.clone(),
                reason: "decrypted name is not a single path segment".to_string(),
            });
        }

        Ok(Some(self.cleartext_metadata(
            folder.appending_component(&cleartext),
            item_type,
            &data,
        )))
    }

    /// Shards of the folder `root_id` and of every folder below it.
    async fn collect_subtree_shards(
        &self,
        root_id: &DirectoryId,
    ) -> Result<Vec<CloudPath>, CloudProviderError> {
        let marker_name = &self.config.format.dir_marker_name;
        let mut pending = vec![root_id.clone()];
        let mut visited = HashSet::new();
        let mut shards = Vec::new();

        while let Some(dir_id) = pending.pop() {
            if !visited.insert(dir_id.clone()) {
                continue;
            }
            let shard = self.shard_path(&dir_id)?;
            let entries = match fetch_complete_item_list(&self.backend, &shard).await {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => {
                    debug!(shard = %shard, "Shard already gone");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for entry in entries {
                if !entry.is_folder() || layout::classify_entry(&entry.name).is_none() {
                    continue;
                }
                let marker = entry.cloud_path.appending_component(marker_name);
                match self.download_bytes(&marker).await {
                    Ok(bytes) => pending.push(self.decode_marker(bytes, &entry.cloud_path)?),
                    // shortened file
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            shards.push(shard);
        }
        Ok(shards)
    }
}

#[async_trait]
impl<P: CloudProvider, C: Cryptor> CloudProvider for VaultProvider<P, C> {
    #[instrument(level = "debug", skip(self), fields(path = %path))]
    async fn fetch_item_metadata(
        &self,
        path: &CloudPath,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        if path.is_root() {
            return Ok(CloudItemMetadata::folder(CloudPath::root()));
        }
        let location = self.ciphertext_location(path).await?;
        let (item_type, data) = self.probe(&location, path).await?;
        Ok(self.cleartext_metadata(path.clone(), item_type, &data))
    }

    #[instrument(level = "debug", skip(self), fields(folder = %folder))]
    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<String>,
    ) -> Result<CloudItemList, CloudProviderError> {
        let dir_id = match self.resolve_directory_id(folder).await {
            Ok(dir_id) => dir_id,
            Err(CloudProviderError::ItemNotFound { path }) if path == *folder => {
                let location = self.ciphertext_location(folder).await?;
                return Err(match self.probe(&location, folder).await {
                    Ok((CloudItemType::File, _)) => CloudProviderError::ItemTypeMismatch { path },
                    _ => CloudProviderError::ItemNotFound { path },
                });
            }
            Err(e) => return Err(e),
        };
        let shard = self.shard_path(&dir_id)?;
        let page = self
            .backend
            .fetch_item_list(&shard, page_token)
            .await
            .map_err(|e| relabel(e, folder))?;

        let mut items = Vec::with_capacity(page.items.len());
        for entry in page.items {
            let entry_name = entry.name.clone();
            match self.decrypt_entry(&dir_id, folder, entry).await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(
                    e @ (CloudProviderError::AuthenticationFailed { .. }
                    | CloudProviderError::Crypto { .. }
                    | CloudProviderError::InvalidVaultStructure { .. }
                    | CloudProviderError::ItemNotFound { .. }),
                ) => {
                    warn!(entry = %entry_name, error = %e, "Skipping undecryptable entry");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(count = items.len(), has_more = page.next_page_token.is_some(), "Listed folder");
        Ok(CloudItemList {
            items,
            next_page_token: page.next_page_token,
        })
    }

    #[instrument(level = "debug", skip(self, local), fields(path = %path))]
    async fn download_file(&self, path: &CloudPath, local: &Path) -> Result<(), CloudProviderError> {
        let location = self.ciphertext_location(path).await?;
        let ciphertext = match self.download_bytes(&location.file_content_path()).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() && location.is_shortened => {
                let marker = location.marker_path(&self.config.format.dir_marker_name);
                return Err(match self.backend.fetch_item_metadata(&marker).await {
                    Ok(_) => CloudProviderError::ItemTypeMismatch { path: path.clone() },
                    Err(_) => CloudProviderError::ItemNotFound { path: path.clone() },
                });
            }
            Err(e) => return Err(relabel(e, path)),
        };

        let cleartext = self
            .cryptor
            .decrypt_content(&ciphertext)
            .map_err(|e| CloudProviderError::from_crypto(path, e))?;
        tokio::fs::write(local, &cleartext)
            .await
            .map_err(|e| CloudProviderError::io(path, e))?;
        debug!(size = cleartext.len(), "File downloaded");
        Ok(())
    }

    #[instrument(level = "info", skip(self, local), fields(path = %path))]
    async fn upload_file(
        &self,
        local: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let cleartext = tokio::fs::read(local)
            .await
            .map_err(|e| CloudProviderError::io(path, e))?;
        let parent = path.parent()?;
        let parent_id = self
            .resolve_directory_id(&parent)
            .await
            .map_err(|e| parent_missing(e, path))?;
        let location = self.location_in(&parent_id, path)?;
        let ciphertext = self
            .cryptor
            .encrypt_content(&cleartext)
            .map_err(|e| CloudProviderError::from_crypto(path, e))?;

        if location.is_shortened {
            match self.backend.create_folder(&location.container).await {
                Ok(()) => {
                    self.upload_bytes(location.ciphertext_name.as_bytes(), &location.name_file_path(), false)
                        .await
                        .map_err(|e| relabel(e, path))?;
                    self.shortener.remember(&location.container, &location.ciphertext_name);
                }
                Err(e) if e.is_already_exists() => {
                    let marker = location.marker_path(&self.config.format.dir_marker_name);
                    if self.backend.fetch_item_metadata(&marker).await.is_ok() {
                        return Err(CloudProviderError::ItemTypeMismatch { path: path.clone() });
                    }
                }
                Err(e) => return Err(relabel(e, path)),
            }
        }

        let stored = self
            .upload_bytes(&ciphertext, &location.file_content_path(), replace_existing)
            .await
            .map_err(|e| relabel(e, path))?;
        debug!(size = cleartext.len(), shortened = location.is_shortened, "File uploaded");

        Ok(CloudItemMetadata {
            name: path.last_component().unwrap_or_default().to_string(),
            cloud_path: path.clone(),
            item_type: CloudItemType::File,
            last_modified: stored.last_modified,
            size: Some(cleartext.len() as u64),
        })
    }

    /// Create a folder: container, optional `name.c9s`, marker, shard, then
    /// the optional `dirid.c9r`. The cache learns the new id only after all
    /// required writes succeeded; earlier writes are not rolled back. Calling
    /// again resumes a container that never received its marker.
    #[instrument(level = "info", skip(self), fields(path = %path))]
    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let parent = path.parent()?;
        let parent_id = self
            .resolve_directory_id(&parent)
            .await
            .map_err(|e| parent_missing(e, path))?;

        let dir_id = DirectoryId::generate();
        debug!(new_dir_id = %dir_id, "Generated new directory ID");

        let location = self.location_in(&parent_id, path)?;
        let resumed = match self.backend.create_folder(&location.container).await {
            Ok(()) => false,
            Err(e) if e.is_already_exists() => {
                if !self.is_incomplete_folder(&location).await? {
                    return Err(relabel(e, path));
                }
                warn!("Resuming interrupted folder creation");
                true
            }
            Err(e) => return Err(relabel(e, path)),
        };

        if location.is_shortened {
            self.upload_bytes(location.ciphertext_name.as_bytes(), &location.name_file_path(), resumed)
                .await?;
            self.shortener.remember(&location.container, &location.ciphertext_name);
        }

        let marker = self.encode_marker(&dir_id, path)?;
        self.upload_bytes(&marker, &location.marker_path(&self.config.format.dir_marker_name), false)
            .await?;

        let shard = self.shard_path(&dir_id)?;
        match self.backend.create_folder(&shard.parent()?).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }
        self.backend.create_folder(&shard).await?;

        if self.config.format.write_dir_id_backup {
            self.write_dir_id_backup(&dir_id, &shard).await;
        }

        self.dir_ids.put(path.clone(), dir_id);
        info!(shortened = location.is_shortened, "Folder created");
        Ok(())
    }

    #[instrument(level = "info", skip(self), fields(path = %path))]
    async fn delete_item(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let location = self.ciphertext_location(path).await?;
        let (item_type, _) = self.probe(&location, path).await?;

        if item_type != CloudItemType::Folder {
            self.backend
                .delete_item(&location.container)
                .await
                .map_err(|e| relabel(e, path))?;
            self.shortener.forget(&location.container);
            info!("File deleted");
            return Ok(());
        }

        let shards = match self.resolve_directory_id(path).await {
            Ok(dir_id) => self.collect_subtree_shards(&dir_id).await?,
            // Interrupted creation: the container never got its marker.
            Err(CloudProviderError::ItemNotFound { path: missing }) if missing == *path => {
                warn!("Deleting folder container without directory marker");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        self.backend
            .delete_item(&location.container)
            .await
            .map_err(|e| relabel(e, path))?;
        self.shortener.forget(&location.container);
        self.dir_ids.invalidate(path);

        for shard in &shards {
            match self.backend.delete_item(shard).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(shard = %shard, error = %e, "Failed to delete orphaned shard"),
            }
        }
        info!(shards = shards.len(), "Folder deleted");
        Ok(())
    }

    #[instrument(level = "info", skip(self), fields(from = %from, to = %to))]
    async fn move_item(&self, from: &CloudPath, to: &CloudPath) -> Result<(), CloudProviderError> {
        if from.is_ancestor_of(to) {
            return Err(CloudProviderError::MoveIntoDescendant {
                from: from.clone(),
                to: to.clone(),
            });
        }

        let source = self.ciphertext_location(from).await?;
        let (item_type, _) = self.probe(&source, from).await?;
        let is_folder = item_type == CloudItemType::Folder;

        let target_parent_id = self
            .resolve_directory_id(&to.parent()?)
            .await
            .map_err(|e| parent_missing(e, to))?;
        let target = self.location_in(&target_parent_id, to)?;
        match self.backend.fetch_item_metadata(&target.container).await {
            Ok(_) => return Err(CloudProviderError::ItemAlreadyExists { path: to.clone() }),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let name_bytes = target.ciphertext_name.as_bytes();
        // A regular file becoming shortened needs its target container first.
        if !is_folder && !source.is_shortened && target.is_shortened {
            self.backend.create_folder(&target.container).await?;
            self.upload_bytes(name_bytes, &target.name_file_path(), false).await?;
        }

        let (move_from, move_to) = match (source.is_shortened, target.is_shortened) {
            (false, true) if !is_folder => (source.container.clone(), target.file_content_path()),
            (true, false) if !is_folder => (source.file_content_path(), target.container.clone()),
            _ => (source.container.clone(), target.container.clone()),
        };
        self.backend
            .move_item(&move_from, &move_to)
            .await
            .map_err(|e| relabel(e, from))?;

        // Committed: nothing may resolve the item under `from` any more, even
        // if a follow-up step below fails.
        self.shortener.forget(&source.container);
        let detached = if is_folder {
            self.dir_ids.detach_subtree(from)
        } else {
            Vec::new()
        };

        match (source.is_shortened, target.is_shortened) {
            (false, true) if is_folder => {
                self.upload_bytes(name_bytes, &target.name_file_path(), false).await?;
            }
            (true, false) if is_folder => {
                match self
                    .backend
                    .delete_item(&target.container.appending_component(NAME_FILE))
                    .await
                {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }
            (true, false) => self.backend.delete_item(&source.container).await?,
            (true, true) => {
                self.upload_bytes(name_bytes, &target.name_file_path(), true).await?;
            }
            _ => {}
        }

        if target.is_shortened {
            self.shortener.remember(&target.container, &target.ciphertext_name);
        }
        self.dir_ids.attach_subtree(from, to, detached);
        info!(folder = is_folder, "Item moved");
        Ok(())
    }
}
