//! A [`CloudProvider`] backed by a directory on the local disk.
//!
//! Used as the storage of local vaults and as the backend of the test suite.

use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, instrument, trace};

use super::{CloudItemList, CloudItemMetadata, CloudItemType, CloudProvider};
use crate::error::CloudProviderError;
use crate::path::CloudPath;

/// Listing page size when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Local-disk storage provider.
///
/// Listings are sorted by name and paged; the continuation token is the
/// decimal offset of the next entry.
#[derive(Debug, Clone)]
pub struct LocalFileSystemProvider {
    root: PathBuf,
    page_size: usize,
}

impl LocalFileSystemProvider {
    /// Serve the directory `root`. It must already exist.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalFileSystemProvider {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the number of entries returned per listing page (at least one).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The directory this provider serves.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local filesystem path of a cloud path.
    pub fn local_path(&self, path: &CloudPath) -> PathBuf {
        path.as_relative_path().to_path(&self.root)
    }

    async fn stat(&self, path: &CloudPath) -> Result<Option<Metadata>, CloudProviderError> {
        match fs::metadata(self.local_path(path)).await {
            Ok(metadata) => Ok(Some(metadata)),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                Ok(None)
            }
            Err(e) => Err(CloudProviderError::io(path, e)),
        }
    }

    async fn require_parent_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let parent = path.parent()?;
        match self.stat(&parent).await? {
            Some(metadata) if metadata.is_dir() => Ok(()),
            _ => Err(CloudProviderError::ParentFolderDoesNotExist { path: path.clone() }),
        }
    }
}

fn item_metadata(path: CloudPath, metadata: &Metadata) -> CloudItemMetadata {
    let item_type = if metadata.is_dir() {
        CloudItemType::Folder
    } else if metadata.is_file() {
        CloudItemType::File
    } else {
        CloudItemType::Unknown
    };
    CloudItemMetadata {
        name: path.last_component().unwrap_or_default().to_string(),
        size: (item_type == CloudItemType::File).then(|| metadata.len()),
        last_modified: metadata.modified().ok(),
        item_type,
        cloud_path: path,
    }
}

fn map_io(path: &CloudPath, err: io::Error) -> CloudProviderError {
    match err.kind() {
        io::ErrorKind::NotFound => CloudProviderError::ItemNotFound { path: path.clone() },
        io::ErrorKind::AlreadyExists => CloudProviderError::ItemAlreadyExists { path: path.clone() },
        _ => CloudProviderError::io(path, err),
    }
}

#[async_trait]
impl CloudProvider for LocalFileSystemProvider {
    async fn fetch_item_metadata(
        &self,
        path: &CloudPath,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        let metadata = self
            .stat(path)
            .await?
            .ok_or_else(|| CloudProviderError::ItemNotFound { path: path.clone() })?;
        Ok(item_metadata(path.clone(), &metadata))
    }

    #[instrument(level = "debug", skip(self), fields(folder = %folder))]
    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<String>,
    ) -> Result<CloudItemList, CloudProviderError> {
        let offset = match &page_token {
            None => 0,
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| CloudProviderError::PageTokenInvalid { token: token.clone() })?,
        };

        match self.stat(folder).await? {
            None => return Err(CloudProviderError::ItemNotFound { path: folder.clone() }),
            Some(metadata) if !metadata.is_dir() => {
                return Err(CloudProviderError::ItemTypeMismatch { path: folder.clone() });
            }
            Some(_) => {}
        }

        let mut entries = fs::read_dir(self.local_path(folder))
            .await
            .map_err(|e| map_io(folder, e))?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| map_io(folder, e))? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                trace!(entry = ?entry.file_name(), "Skipping non-UTF-8 entry");
                continue;
            };
            let metadata = entry.metadata().await.map_err(|e| map_io(folder, e))?;
            items.push(item_metadata(folder.appending_component(&name), &metadata));
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));

        if offset > items.len() {
            return Err(CloudProviderError::PageTokenInvalid {
                token: page_token.unwrap_or_default(),
            });
        }

        let end = offset.saturating_add(self.page_size).min(items.len());
        let next_page_token = (end < items.len()).then(|| end.to_string());
        let page: Vec<_> = items.drain(offset..end).collect();
        debug!(count = page.len(), has_more = next_page_token.is_some(), "Listed folder");

        Ok(CloudItemList {
            items: page,
            next_page_token,
        })
    }

    async fn download_file(&self, path: &CloudPath, local: &Path) -> Result<(), CloudProviderError> {
        match self.stat(path).await? {
            None => Err(CloudProviderError::ItemNotFound { path: path.clone() }),
            Some(metadata) if metadata.is_dir() => {
                Err(CloudProviderError::ItemTypeMismatch { path: path.clone() })
            }
            Some(_) => {
                fs::copy(self.local_path(path), local)
                    .await
                    .map_err(|e| map_io(path, e))?;
                Ok(())
            }
        }
    }

    async fn upload_file(
        &self,
        local: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        match self.stat(path).await? {
            Some(metadata) if metadata.is_dir() => {
                return Err(CloudProviderError::ItemTypeMismatch { path: path.clone() });
            }
            Some(_) if !replace_existing => {
                return Err(CloudProviderError::ItemAlreadyExists { path: path.clone() });
            }
            _ => {}
        }
        self.require_parent_folder(path).await?;

        let target = self.local_path(path);
        fs::copy(local, &target).await.map_err(|e| map_io(path, e))?;
        let metadata = fs::metadata(&target).await.map_err(|e| map_io(path, e))?;
        Ok(item_metadata(path.clone(), &metadata))
    }

    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        if path.is_root() || self.stat(path).await?.is_some() {
            return Err(CloudProviderError::ItemAlreadyExists { path: path.clone() });
        }
        self.require_parent_folder(path).await?;
        fs::create_dir(self.local_path(path))
            .await
            .map_err(|e| map_io(path, e))
    }

    async fn delete_item(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        let metadata = self
            .stat(path)
            .await?
            .ok_or_else(|| CloudProviderError::ItemNotFound { path: path.clone() })?;
        let local = self.local_path(path);
        let result = if metadata.is_dir() {
            fs::remove_dir_all(local).await
        } else {
            fs::remove_file(local).await
        };
        result.map_err(|e| map_io(path, e))
    }

    async fn move_item(&self, from: &CloudPath, to: &CloudPath) -> Result<(), CloudProviderError> {
        if self.stat(from).await?.is_none() {
            return Err(CloudProviderError::ItemNotFound { path: from.clone() });
        }
        if self.stat(to).await?.is_some() {
            return Err(CloudProviderError::ItemAlreadyExists { path: to.clone() });
        }
        self.require_parent_folder(to).await?;
        fs::rename(self.local_path(from), self.local_path(to))
            .await
            .map_err(|e| map_io(from, e))
    }
}
