//! Upload backend trait and ordered fallback.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::error::{StorageError, StorageResult};

/// A file-hosting service that turns a local file into a public URL.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Upload `path` and return its public link.
    async fn upload(&self, path: &Path) -> StorageResult<String>;
}

/// Tries each backend in order and returns the first link.
#[derive(Clone, Default)]
pub struct FallbackUploader {
    backends: Vec<Arc<dyn Uploader>>,
}

impl FallbackUploader {
    pub fn new(backends: Vec<Arc<dyn Uploader>>) -> Self {
        Self { backends }
    }

    pub fn push(&mut self, backend: Arc<dyn Uploader>) {
        self.backends.push(backend);
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}

impl std::fmt::Debug for FallbackUploader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackUploader")
            .field("backends", &self.backend_names())
            .finish()
    }
}

#[async_trait]
impl Uploader for FallbackUploader {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn upload(&self, path: &Path) -> StorageResult<String> {
        let mut errors = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            match backend.upload(path).await {
                Ok(url) => {
                    info!(backend = backend.name(), url = %url, "Uploaded {}", path.display());
                    return Ok(url);
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Upload failed, trying next backend");
                    errors.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        Err(StorageError::AllBackendsFailed(errors))
    }
}

/// File name component used as the remote name.
pub(crate) fn file_name(path: &Path) -> StorageResult<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| StorageError::upload_failed(format!("{} has no file name", path.display())))
}

/// Streaming request body for a local file, with its length.
pub(crate) async fn file_body(path: &Path) -> StorageResult<(reqwest::Body, u64)> {
    let file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    Ok((reqwest::Body::wrap_stream(ReaderStream::new(file)), size))
}
