//! HTTP client for the reel file server.
//!
//! Remote workers cannot see the job store; everything they do goes through
//! this client: claiming and resolving jobs, heartbeats, shared counters and
//! file transfer.

pub mod client;
pub mod error;
pub mod types;

pub use client::{ClientConfig, FileServerClient};
pub use error::{ClientError, ClientResult};
pub use types::{CompleteResponse, DirEntry, DirListing, EntryKind, FailResponse, UploadResponse};
