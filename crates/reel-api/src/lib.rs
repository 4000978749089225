//! Axum file server and job queue facade.
//!
//! This crate provides:
//! - File upload, download, listing and deletion under one data root
//! - HTTP access to the file-backed job queues, worker registry and counters
//! - API key auth, rate limiting and security headers
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod security;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
