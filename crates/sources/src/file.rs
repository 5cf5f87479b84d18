use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipeline::{DocumentId, DocumentSource, SourceError, SourceFailure};
use tracing::instrument;

/// Reads the newsletter from the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct FileDocumentSource {
    base_dir: Option<PathBuf>,
}

impl FileDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative document paths are resolved against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, document: &DocumentId) -> PathBuf {
        let path = Path::new(document.as_str());
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[async_trait]
impl DocumentSource for FileDocumentSource {
    #[instrument(skip(self), fields(document = %document))]
    async fn fetch(&self, document: &DocumentId) -> Result<String, SourceError> {
        let path = self.resolve(document);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            let failure = match e.kind() {
                ErrorKind::NotFound => SourceFailure::NotFound,
                ErrorKind::PermissionDenied => SourceFailure::PermissionDenied,
                ErrorKind::InvalidData => SourceFailure::Other("file is not valid UTF-8".to_string()),
                _ => SourceFailure::Other(e.to_string()),
            };
            SourceError {
                document: path.display().to_string(),
                failure,
            }
        })?;
        tracing::debug!(bytes = text.len(), path = %path.display(), "document read");
        Ok(crate::strip_bom(text))
    }
}
