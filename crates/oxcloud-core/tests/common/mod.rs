#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use oxcloud_core::crypto::{MasterKey, VaultCryptor};
use oxcloud_core::provider::{CloudItemList, CloudItemMetadata, CloudProvider, LocalFileSystemProvider};
use oxcloud_core::{CloudPath, CloudProviderError, ScratchSpace, VaultProvider, VaultProviderConfig};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Create a deterministic MasterKey for testing
pub fn create_test_master_key() -> MasterKey {
    MasterKey::new([0x01; 32], [0x02; 32])
}

/// Route `tracing` output through the test harness. Set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// One call made against a [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Metadata(CloudPath),
    List(CloudPath),
    Download(CloudPath),
    Upload(CloudPath),
    CreateFolder(CloudPath),
    Delete(CloudPath),
    Move(CloudPath, CloudPath),
}

/// Wraps a provider, records every call and can fail selected uploads.
pub struct RecordingProvider<P> {
    inner: P,
    ops: Mutex<Vec<Op>>,
    failing_upload_suffix: Mutex<Option<String>>,
}

impl<P> RecordingProvider<P> {
    pub fn new(inner: P) -> Self {
        RecordingProvider {
            inner,
            ops: Mutex::new(Vec::new()),
            failing_upload_suffix: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().clone()
    }

    pub fn clear(&self) {
        self.ops.lock().clear();
    }

    pub fn count(&self, matches: impl Fn(&Op) -> bool) -> usize {
        self.ops.lock().iter().filter(|op| matches(op)).count()
    }

    /// Make every upload whose target name ends with `suffix` fail.
    pub fn fail_uploads_ending_with(&self, suffix: Option<&str>) {
        *self.failing_upload_suffix.lock() = suffix.map(str::to_owned);
    }

    fn record(&self, op: Op) {
        self.ops.lock().push(op);
    }
}

#[async_trait]
impl<P: CloudProvider> CloudProvider for RecordingProvider<P> {
    async fn fetch_item_metadata(
        &self,
        path: &CloudPath,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        self.record(Op::Metadata(path.clone()));
        self.inner.fetch_item_metadata(path).await
    }

    async fn fetch_item_list(
        &self,
        folder: &CloudPath,
        page_token: Option<String>,
    ) -> Result<CloudItemList, CloudProviderError> {
        self.record(Op::List(folder.clone()));
        self.inner.fetch_item_list(folder, page_token).await
    }

    async fn download_file(&self, path: &CloudPath, local: &Path) -> Result<(), CloudProviderError> {
        self.record(Op::Download(path.clone()));
        self.inner.download_file(path, local).await
    }

    async fn upload_file(
        &self,
        local: &Path,
        path: &CloudPath,
        replace_existing: bool,
    ) -> Result<CloudItemMetadata, CloudProviderError> {
        self.record(Op::Upload(path.clone()));
        let failing = self.failing_upload_suffix.lock().clone();
        if let Some(suffix) = failing {
            if path.last_component().is_some_and(|name| name.ends_with(&suffix)) {
                return Err(CloudProviderError::Backend("injected upload failure".into()));
            }
        }
        self.inner.upload_file(local, path, replace_existing).await
    }

    async fn create_folder(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        self.record(Op::CreateFolder(path.clone()));
        self.inner.create_folder(path).await
    }

    async fn delete_item(&self, path: &CloudPath) -> Result<(), CloudProviderError> {
        self.record(Op::Delete(path.clone()));
        self.inner.delete_item(path).await
    }

    async fn move_item(&self, from: &CloudPath, to: &CloudPath) -> Result<(), CloudProviderError> {
        self.record(Op::Move(from.clone(), to.clone()));
        self.inner.move_item(from, to).await
    }
}

pub type Backend = Arc<RecordingProvider<LocalFileSystemProvider>>;
pub type TestVaultProvider = VaultProvider<Backend, VaultCryptor>;

/// A vault on a temporary local directory, stored under `/vault`.
pub struct TestVault {
    pub dir: TempDir,
    pub backend: Backend,
    pub vault: TestVaultProvider,
    pub scratch: ScratchSpace,
}

impl TestVault {
    pub async fn new() -> Self {
        Self::with_config(VaultProviderConfig::default()).await
    }

    pub async fn with_config(config: VaultProviderConfig) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RecordingProvider::new(LocalFileSystemProvider::new(dir.path())));
        let scratch = ScratchSpace::ephemeral().unwrap();
        let vault = VaultProvider::new(
            backend.clone(),
            VaultCryptor::new(Arc::new(create_test_master_key())),
            CloudPath::new("/vault"),
            config,
            scratch.clone(),
        );
        vault.initialize().await.unwrap();
        backend.clear();
        TestVault {
            dir,
            backend,
            vault,
            scratch,
        }
    }

    /// A second provider over the same storage, with a cold cache.
    pub fn reopen(&self) -> TestVaultProvider {
        VaultProvider::new(
            self.backend.clone(),
            VaultCryptor::new(Arc::new(create_test_master_key())),
            CloudPath::new("/vault"),
            self.vault.config().clone(),
            self.scratch.clone(),
        )
    }

    /// Local filesystem path of a backend path.
    pub fn local(&self, path: &CloudPath) -> std::path::PathBuf {
        self.backend.inner().local_path(path)
    }

    /// Write `content` to a fresh local file and upload it to `path`.
    pub async fn upload(&self, path: &str, content: &[u8]) -> CloudItemMetadata {
        let source = self.dir.path().join(format!("upload-{}", uuid_like()));
        std::fs::write(&source, content).unwrap();
        let metadata = self
            .vault
            .upload_file(&source, &CloudPath::new(path), false)
            .await
            .unwrap();
        std::fs::remove_file(source).unwrap();
        metadata
    }

    /// Download `path` and return its cleartext.
    pub async fn download(&self, path: &str) -> Vec<u8> {
        let target = self.dir.path().join(format!("download-{}", uuid_like()));
        self.vault
            .download_file(&CloudPath::new(path), &target)
            .await
            .unwrap();
        let bytes = std::fs::read(&target).unwrap();
        std::fs::remove_file(target).unwrap();
        bytes
    }

    /// Cleartext names in `folder`, sorted.
    pub async fn list_names(&self, folder: &str) -> Vec<String> {
        let items = oxcloud_core::provider::fetch_complete_item_list(&self.vault, &CloudPath::new(folder))
            .await
            .unwrap();
        let mut names: Vec<_> = items.into_iter().map(|item| item.name).collect();
        names.sort();
        names
    }
}

fn uuid_like() -> String {
    oxcloud_core::DirectoryId::generate().to_string()
}

/// A name long enough that its ciphertext exceeds the default threshold.
pub fn long_name(prefix: &str) -> String {
    format!("{prefix}-{}", "x".repeat(200))
}
