#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use chunked_file_storage::db::{Catalog, MemoryCatalog};
use chunked_file_storage::models::{FilePart, FileRecord, FileStatus, NewFilePart, NodeStatus, StorageNode};
use chunked_file_storage::services::{FileService, NodeRegistry, TransferSettings};
use chunked_file_storage::storage::{BlobBackend, BlobError, BlobResult, MemoryBlobStore};

pub struct Cluster {
    pub catalog: Arc<MemoryCatalog>,
    pub blobs: Arc<MemoryBlobStore>,
    pub service: FileService,
    pub nodes: Vec<StorageNode>,
}

pub async fn register_nodes(catalog: &Arc<MemoryCatalog>, count: usize) -> Vec<StorageNode> {
    let registry = NodeRegistry::new(catalog.clone());
    let mut nodes = Vec::new();
    for i in 0..count {
        // Distinct free space so placement order is predictable: node-0 has the most.
        let free = 1000.0 - i as f64 * 10.0;
        nodes.push(registry.register_node(&format!("node-{}", i), 1000.0, free).await.unwrap());
    }
    nodes
}

pub async fn cluster(node_count: usize) -> Cluster {
    cluster_with(node_count, TransferSettings::default()).await
}

pub async fn cluster_with(node_count: usize, settings: TransferSettings) -> Cluster {
    let catalog = Arc::new(MemoryCatalog::new());
    let blobs = Arc::new(MemoryBlobStore::new());
    let nodes = register_nodes(&catalog, node_count).await;
    let service = FileService::new(
        catalog.clone() as Arc<dyn Catalog>,
        blobs.clone() as Arc<dyn BlobBackend>,
        settings,
    );
    Cluster { catalog, blobs, service, nodes }
}

pub fn sample_bytes(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i * 31 % 251) as u8).collect::<Vec<u8>>())
}

pub fn chunk_key(owner: Uuid, file_id: Uuid, part_index: u32) -> String {
    format!("{}/{}/part{}", owner, file_id, part_index)
}

/// Memory store whose `put` fails for keys ending in `part{N}` while armed.
pub struct FlakyBlobStore {
    pub inner: MemoryBlobStore,
    failing_suffix: String,
    armed: AtomicBool,
}

impl FlakyBlobStore {
    pub fn failing_part(part_index: u32) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            failing_suffix: format!("/part{}", part_index),
            armed: AtomicBool::new(true),
        }
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobBackend for FlakyBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> BlobResult<()> {
        if self.armed.load(Ordering::SeqCst) && key.ends_with(&self.failing_suffix) {
            return Err(BlobError::Backend(format!("injected failure for {}", key)));
        }
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.inner.delete(key).await
    }
}

/// Backend whose writes never complete.
pub struct StalledBlobStore;

#[async_trait]
impl BlobBackend for StalledBlobStore {
    async fn put(&self, _key: &str, _data: Bytes, _content_type: &str) -> BlobResult<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        Err(BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, _key: &str) -> BlobResult<()> {
        Ok(())
    }
}

/// Memory store whose deletes never complete.
#[derive(Default)]
pub struct StalledDeleteBlobStore {
    pub inner: MemoryBlobStore,
}

#[async_trait]
impl BlobBackend for StalledDeleteBlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> BlobResult<()> {
        self.inner.put(key, data, content_type).await
    }

    async fn get(&self, key: &str) -> BlobResult<Bytes> {
        self.inner.get(key).await
    }

    async fn delete(&self, _key: &str) -> BlobResult<()> {
        futures::future::pending::<()>().await;
        Ok(())
    }
}

/// Catalog whose `get_file` hangs while `stall_lookups` is set.
pub struct StallingCatalog {
    pub inner: MemoryCatalog,
    stall_lookups: AtomicBool,
}

impl StallingCatalog {
    pub fn new() -> Self {
        Self {
            inner: MemoryCatalog::new(),
            stall_lookups: AtomicBool::new(false),
        }
    }

    pub fn stall_lookups(&self, stall: bool) {
        self.stall_lookups.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl Catalog for StallingCatalog {
    async fn list_nodes(&self) -> Result<Vec<StorageNode>> {
        self.inner.list_nodes().await
    }

    async fn get_node(&self, node_id: Uuid) -> Result<Option<StorageNode>> {
        self.inner.get_node(node_id).await
    }

    async fn insert_node(&self, node: &StorageNode) -> Result<()> {
        self.inner.insert_node(node).await
    }

    async fn update_node_heartbeat(
        &self,
        node_id: Uuid,
        status: NodeStatus,
        free_space_gb: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<StorageNode>> {
        self.inner.update_node_heartbeat(node_id, status, free_space_gb, at).await
    }

    async fn mark_stale_nodes_offline(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.mark_stale_nodes_offline(cutoff).await
    }

    async fn insert_file(&self, file: &FileRecord) -> Result<()> {
        self.inner.insert_file(file).await
    }

    async fn get_file(&self, file_id: Uuid) -> Result<Option<FileRecord>> {
        if self.stall_lookups.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        self.inner.get_file(file_id).await
    }

    async fn list_files(&self, owner_id: Uuid) -> Result<Vec<FileRecord>> {
        self.inner.list_files(owner_id).await
    }

    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> Result<()> {
        self.inner.update_file_status(file_id, status).await
    }

    async fn fail_file(&self, file_id: Uuid) -> Result<bool> {
        self.inner.fail_file(file_id).await
    }

    async fn finalize_file(&self, file_id: Uuid, num_parts: u32) -> Result<bool> {
        self.inner.finalize_file(file_id, num_parts).await
    }

    async fn delete_file(&self, file_id: Uuid) -> Result<u64> {
        self.inner.delete_file(file_id).await
    }

    async fn insert_part(&self, part: &NewFilePart) -> Result<FilePart> {
        self.inner.insert_part(part).await
    }

    async fn list_parts(&self, file_id: Uuid) -> Result<Vec<FilePart>> {
        self.inner.list_parts(file_id).await
    }

    async fn delete_parts(&self, file_id: Uuid) -> Result<u64> {
        self.inner.delete_parts(file_id).await
    }
}
