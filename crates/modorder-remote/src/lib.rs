//! Remote manifest retrieval for modorder version checks.
//!
//! This crate provides the `ManifestSource` trait with an HTTP implementation
//! backed by ureq, a `FetchPool` that runs fetches on background threads and
//! hands completions back to the owning thread on demand, and `RemoteConfig`
//! for request timeouts and identification.

pub mod config;
pub mod http;
pub mod pool;

pub use config::RemoteConfig;
pub use http::HttpSource;
pub use pool::{FetchOutcome, FetchPool};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("remote config error: {0}")]
    Config(String),
    #[error("fetch abandoned: {0}")]
    Abandoned(String),
}

/// Something that can retrieve the raw bytes of a remote manifest.
pub trait ManifestSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}
