//! Idempotent creation of a folder and all of its ancestors.

use tracing::{debug, instrument};

use crate::error::CloudProviderError;
use crate::path::CloudPath;
use crate::provider::CloudProvider;

/// Create `target` and every missing ancestor, top-down.
///
/// Folders that already exist are skipped. The first other failure aborts;
/// folders created before it stay in place, so calling again after a failure
/// picks up where it stopped. Returns the number of folders created.
#[instrument(level = "debug", skip(provider), fields(target = %target))]
pub async fn ensure_folder_chain<P: CloudProvider + ?Sized>(
    provider: &P,
    target: &CloudPath,
) -> Result<usize, CloudProviderError> {
    let mut created = 0;
    for folder in target.ancestors_from_root() {
        match provider.create_folder(&folder).await {
            Ok(()) => created += 1,
            Err(CloudProviderError::ItemAlreadyExists { .. }) => {}
            Err(e) => {
                debug!(folder = %folder, error = %e, "Folder chain creation aborted");
                return Err(e);
            }
        }
    }
    Ok(created)
}
