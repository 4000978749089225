//! Upload backend selection from the environment.

use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::error::{StorageError, StorageResult};
use crate::gofile::{GofileConfig, GofileUploader};
use crate::pixeldrain::{PixeldrainConfig, PixeldrainUploader};
use crate::s3::{S3Config, S3Uploader};
use crate::uploader::{FallbackUploader, Uploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gofile,
    Pixeldrain,
    S3,
}

impl FromStr for BackendKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gofile" => Ok(Self::Gofile),
            "pixeldrain" => Ok(Self::Pixeldrain),
            "s3" | "contabo" => Ok(Self::S3),
            other => Err(StorageError::UnknownBackend(other.to_string())),
        }
    }
}

/// Ordered backend list plus per-backend settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backends: Vec<BackendKind>,
    pub gofile: GofileConfig,
    pub pixeldrain: PixeldrainConfig,
    pub s3: Option<S3Config>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backends: vec![BackendKind::Gofile, BackendKind::Pixeldrain],
            gofile: GofileConfig::default(),
            pixeldrain: PixeldrainConfig::default(),
            s3: None,
        }
    }
}

/// Parse a comma-separated backend list, skipping empty entries.
pub fn parse_backends(list: &str) -> StorageResult<Vec<BackendKind>> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(BackendKind::from_str)
        .collect()
}

impl StorageConfig {
    /// `UPLOAD_BACKENDS` (default `gofile,pixeldrain`), `PIXELDRAIN_API_KEY`,
    /// and the `CONTABO_S3_*` variables when `s3` is listed.
    pub fn from_env() -> StorageResult<Self> {
        let defaults = Self::default();

        let backends = match std::env::var("UPLOAD_BACKENDS") {
            Ok(list) => parse_backends(&list)?,
            Err(_) => defaults.backends,
        };

        let pixeldrain = PixeldrainConfig {
            api_key: std::env::var("PIXELDRAIN_API_KEY").ok().filter(|k| !k.is_empty()),
            ..defaults.pixeldrain
        };

        let s3 = if backends.contains(&BackendKind::S3) {
            Some(S3Config::from_env()?)
        } else {
            None
        };

        Ok(Self {
            backends,
            gofile: defaults.gofile,
            pixeldrain,
            s3,
        })
    }

    /// Build the fallback chain in configured order.
    pub fn build(&self) -> StorageResult<FallbackUploader> {
        let mut chain = FallbackUploader::default();
        for kind in &self.backends {
            let backend: Arc<dyn Uploader> = match kind {
                BackendKind::Gofile => Arc::new(GofileUploader::new(self.gofile.clone())?),
                BackendKind::Pixeldrain => Arc::new(PixeldrainUploader::new(self.pixeldrain.clone())?),
                BackendKind::S3 => match &self.s3 {
                    Some(config) => Arc::new(S3Uploader::new(config.clone())),
                    None => {
                        warn!("s3 upload backend listed without configuration, skipping");
                        continue;
                    }
                },
            };
            chain.push(backend);
        }

        if chain.is_empty() {
            return Err(StorageError::config_error("no upload backends configured"));
        }
        Ok(chain)
    }
}
