//! Public file-hosting uploads.
//!
//! Each backend implements [`Uploader`]; [`FallbackUploader`] tries them in
//! the configured order and returns the first public link.

pub mod config;
pub mod error;
pub mod gofile;
pub mod pixeldrain;
pub mod s3;
pub mod uploader;

pub use config::{parse_backends, BackendKind, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use gofile::{GofileConfig, GofileUploader};
pub use pixeldrain::{PixeldrainConfig, PixeldrainUploader};
pub use s3::{S3Config, S3Uploader};
pub use uploader::{FallbackUploader, Uploader};
