//! The storage backend abstraction.
//!
//! A [`CloudProvider`] stores opaque files and folders addressed by
//! [`CloudPath`]. The vault layer consumes one and is itself one, so helpers
//! written against the trait work on raw backends and on vaults alike.

pub mod local;

use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::CloudProviderError;
use crate::path::CloudPath;

pub use local::LocalFileSystemProvider;

/// Kind of an item stored by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloudItemType {
    File,
    Folder,
    /// Neither (symlinks, devices); listed but never interpreted.
    Unknown,
}

/// Metadata of a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudItemMetadata {
    /// Last path segment.
    pub name: String,
    pub cloud_path: CloudPath,
    pub item_type: CloudItemType,
    pub last_modified: Option<SystemTime>,
    /// Size in bytes; `None` for folders or when unknown.
    pub size: Option<u64>,
}

impl CloudItemMetadata {
    /// Metadata for a folder at `path`.
    pub fn folder(path: CloudPath) -> Self {
        CloudItemMetadata {
            name: path.last_component().unwrap_or_default().to_string(),
            cloud_path: path,
            item_type: CloudItemType::Folder,
            last_modified: None,
            size: None,
        }
    }

    #[inline]
    pub fn is_folder(&self) -> bool {
        self.item_type == CloudItemType::Folder
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.item_type == CloudItemType::File
    }
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudItemList {
    pub items: Vec<CloudItemMetadata>,
    /// Opaque continuation token; `None` on the last page.
    pub next_page_token: Option<String>,
}

/// Asynchronous storage backend.
///
/// All paths are absolute within the provider's namespace. Implementations
/// report failures through [`CloudProviderError`]: missing items as
/// `ItemNotFound`, collisions as `ItemAlreadyExists`, and missing parents as
/// `ParentFolderDoesNotExist`.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Metadata of a single item.
    async fn fetch_item_metadata(
        &self,
        path: &CloudPath,
    ) -> Result<CloudItemMetadata, CloudProviderError>;

    /// One page of the folder's children. Pass the previous page's
    /// `next_page_token` to continue.
    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<String>,
    ) -> Result<CloudItemList, CloudProviderError>;

    /// Download a file's bytes into `local`, overwriting it.
    async fn download_file(&self, path: &CloudPath, local: &Path) -> Result<(), CloudProviderError>;

    /// Upload the bytes of `local` to `path`.
    ///
    /// Fails with `ItemAlreadyExists` if the target exists and
    /// `replace_existing` is false.
    async fn upload_file(
        &self,
        local: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError>;

    /// Create a single folder. The parent must exist.
    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError>;

    /// Delete a file, or a folder with everything below it.
    async fn delete_item(&self, path: &CloudPath) -> Result<(), CloudProviderError>;

    /// Move or rename an item. The target must not exist.
    async fn move_item(&self, from: &CloudPath, to: &CloudPath) -> Result<(), CloudProviderError>;
}

#[async_trait]
impl<P: CloudProvider + ?Sized> CloudProvider for Arc<P> {
    async fn fetch_item_metadata(
        &self,
        path: &CloudPath,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        (**self).fetch_item_metadata(path).await
    }

    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<String>,
    ) -> Result<CloudItemList, CloudProviderError> {
        (**self).fetch_item_list(folder, page_token).await
    }

    async fn download_file(&self, path: &CloudPath, local: &Path) -> Result<(), CloudProviderError> {
        (**self).download_file(path, local).await
    }

    async fn upload_file(
        &self,
        local: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        (**self).upload_file(local, path, replace_existing).await
    }

    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        (**self).create_folder(path).await
    }

    async fn delete_item(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        (**self).delete_item(path).await
    }

    async fn move_item(&self, from: &CloudPath, to: &CloudPath) -> Result<(), CloudProviderError> {
        (**self).move_item(from, to).await
    }
}

/// Drain every page of a folder listing.
pub async fn fetch_complete_item_list<P: CloudProvider + ?Sized>(
    provider: &P,
    folder: &CloudPath,
) -> Result<Vec<CloudItemMetadata>, CloudProviderError> {
    let mut items = Vec::new();
    let mut token = None;
    loop {
        let page = provider.fetch_item_list(folder, token).await?;
        items.extend(page.items);
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => return Ok(items),
        }
    }
}
