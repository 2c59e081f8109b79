use async_trait::async_trait;

use crate::errors::Result;

pub mod local;

pub use local::LocalStorage;

/// Opaque byte-sink keyed by path. The core only needs write/delete/exists;
/// everything else about file layout belongs to the implementation.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Persists `data` at `path`, returning the number of bytes written.
    async fn write(&self, path: &str, data: &[u8]) -> Result<u64>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;
}
