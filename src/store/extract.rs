//! Zip archive extraction

use async_trait::async_trait;
use std::path::Path;

use super::error::{StoreError, StoreResult};
use super::traits::ArchiveExtractor;

/// Extracts zip archives on the blocking thread pool
///
/// Entry names are checked by the `zip` crate; an entry that would land
/// outside `dest` fails the whole extraction.
#[derive(Debug, Clone, Default)]
pub struct ZipExtractor;

impl ZipExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> StoreResult<()> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let file = std::fs::File::open(&archive)?;
            let mut zip = zip::ZipArchive::new(file).map_err(|e| StoreError::Archive {
                reason: format!("{}: {}", archive.display(), e),
            })?;

            tracing::debug!("Extracting {} entries into {:?}", zip.len(), dest);

            zip.extract(&dest).map_err(|e| StoreError::Archive {
                reason: format!("{}: {}", archive.display(), e),
            })?;
            Ok(())
        })
        .await?
    }
}
