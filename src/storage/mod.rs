//! Chunk storage over an addressable blob backend.
//!
//! Every chunk lives under a key derived only from metadata, `owner/file/part{index}`,
//! so a process holding nothing but catalog rows can find any chunk again.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub mod local;
pub mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(String),

    #[error("blob io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blob backend error: {0}")]
    Backend(String),
}

pub type BlobResult<T> = Result<T, BlobError>;

/// Key/value blob storage. `put` overwrites an existing key.
#[async_trait]
pub trait BlobBackend: Send + Sync {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> BlobResult<()>;

    /// Fails with [`BlobError::NotFound`] for absent keys.
    async fn get(&self, key: &str) -> BlobResult<Bytes>;

    /// Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> BlobResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub owner_id: Uuid,
    pub file_id: Uuid,
    pub part_index: u32,
}

impl ChunkKey {
    pub fn new(owner_id: Uuid, file_id: Uuid, part_index: u32) -> Self {
        Self { owner_id, file_id, part_index }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/part{}", self.owner_id, self.file_id, self.part_index)
    }
}

/// Adapter between the engine and a [`BlobBackend`].
#[derive(Clone)]
pub struct ChunkStore {
    backend: Arc<dyn BlobBackend>,
}

impl ChunkStore {
    pub fn new(backend: Arc<dyn BlobBackend>) -> Self {
        Self { backend }
    }

    pub async fn put(&self, key: ChunkKey, data: Bytes, content_hint: &str) -> BlobResult<()> {
        self.backend.put(&key.to_string(), data, content_hint).await
    }

    pub async fn get(&self, key: ChunkKey) -> BlobResult<Bytes> {
        self.backend.get(&key.to_string()).await
    }

    pub async fn delete(&self, key: ChunkKey) -> BlobResult<()> {
        self.backend.delete(&key.to_string()).await
    }
}
