//! On-disk mirror of downloaded model documents.
//!
//! Layout: `<root>/<model_id>/<file>`. Documents are stored raw and never
//! rewritten once present. Uses tokio's async file I/O.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::model::provider::ProviderError;

/// Remote architecture document.
pub const CONFIG_FILE: &str = "config.json";

/// Remote tensor-index document.
pub const INDEX_FILE: &str = "model-index.json";

/// Document mirror rooted at a cache directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory for a model. Rejects ids that would escape the root.
    pub fn model_dir(&self, model_id: &str) -> Result<PathBuf, ProviderError> {
        let relative = Path::new(model_id);
        let safe = !model_id.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(ProviderError::InvalidModelId(model_id.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Read a mirrored document, if present.
    pub async fn read(&self, model_id: &str, file: &str) -> Result<Option<Vec<u8>>, ProviderError> {
        let path = self.model_dir(model_id)?.join(file);
        match fs::read(&path).await {
            Ok(data) => {
                debug!(path = %path.display(), size = data.len(), "Read cached document");
                Ok(Some(data))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Store a document unless one is already mirrored.
    pub async fn write(
        &self,
        model_id: &str,
        file: &str,
        data: &[u8],
    ) -> Result<PathBuf, ProviderError> {
        let path = self.model_dir(model_id)?.join(file);
        if fs::try_exists(&path).await? {
            return Ok(path);
        }
        self.replace(model_id, file, data).await
    }

    /// Store a document, overwriting any mirrored copy.
    ///
    /// The data lands in a sibling temp file first and is renamed into place,
    /// so an interrupted write never leaves a partial document behind.
    pub async fn replace(
        &self,
        model_id: &str,
        file: &str,
        data: &[u8],
    ) -> Result<PathBuf, ProviderError> {
        let dir = self.model_dir(model_id)?;
        let path = dir.join(file);
        let partial = dir.join(format!(".{file}.{}.partial", std::process::id()));

        fs::create_dir_all(&dir).await?;
        fs::write(&partial, data).await?;
        if let Err(e) = fs::rename(&partial, &path).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), size = data.len(), "Cached document");

        Ok(path)
    }
}
