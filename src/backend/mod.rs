//! Search/index backend used both for detection queries and for the
//! write-back index.

pub mod client;
pub mod memory;

use async_trait::async_trait;
use serde_json::Value;

pub use client::ElasticClient;
pub use memory::MemoryBackend;

/// Minimal document store contract the alerting engine relies on
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Run a query body against an index and return the `_source` of every hit
    async fn search(&self, index: &str, body: &Value) -> Result<Vec<Value>, BackendError>;

    /// Append one document to an index
    async fn index_document(&self, index: &str, document: &Value) -> Result<(), BackendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote error: {0}")]
    RemoteError(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Client setup error: {0}")]
    Setup(String),
}
