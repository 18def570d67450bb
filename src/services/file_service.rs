//! File assembly: splits uploads into planned parts, writes them through the chunk
//! store, and reassembles verified parts on download.
//!
//! A file moves `uploading -> distributed` once every part row is in place, or
//! `uploading -> error` on the first failure. Part transfers run as an ordered pipeline;
//! with `transfer_concurrency > 1` several transfers overlap but results are still
//! consumed in part order, so the failing index is always the lowest failed one.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::{Bytes, BytesMut};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use metrics::{counter, histogram};
use uuid::Uuid;

use crate::db::Catalog;
use crate::distribution::{plan, PlannedPart};
use crate::error::{DfsError, Result};
use crate::models::{FilePart, FileRecord, FileStatus, NewFilePart, PartPlacement};
use crate::services::node_service::{NodeOrder, NodeRegistry};
use crate::storage::{BlobBackend, BlobError, ChunkKey, ChunkStore};
use crate::utils::config::Config;
use crate::utils::digest::checksum;
use crate::utils::mime::{content_type_for, OCTET_STREAM};
use crate::utils::naming::{chunk_file_name, validate_file_name};

/// Called with the completed fraction, in `[0, 1]`, after each part is written.
pub type ProgressFn = dyn Fn(f64) + Send + Sync;

#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub max_file_size: u64,
    pub default_parts: u32,
    pub transfer_concurrency: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        TransferSettings::from(&Config::default())
    }
}

impl From<&Config> for TransferSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            max_file_size: cfg.max_file_size,
            default_parts: cfg.default_parts,
            transfer_concurrency: cfg.transfer_concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner_id: Uuid,
    pub file_name: String,
    pub data: Bytes,
    /// Defaults to the configured part count.
    pub target_parts: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub file_id: Uuid,
    pub file_name: String,
    pub content_type: &'static str,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct DownloadedChunk {
    pub file_id: Uuid,
    pub part_index: u32,
    pub node_id: Uuid,
    pub suggested_name: String,
    pub content_type: &'static str,
    pub data: Bytes,
}

type ActiveUploads = Arc<Mutex<HashSet<Uuid>>>;

/// Exclusive per-file slot shared by uploads, retries and deletes. Released on drop.
struct FileSlot {
    file_id: Uuid,
    active: ActiveUploads,
}

impl FileSlot {
    fn acquire(file_id: Uuid, active: &ActiveUploads) -> Result<Self> {
        let mut set = active.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(file_id) {
            return Err(DfsError::UploadInProgress(file_id));
        }
        Ok(Self {
            file_id,
            active: active.clone(),
        })
    }
}

impl Drop for FileSlot {
    fn drop(&mut self) {
        self.active.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.file_id);
    }
}

/// Armed only once this process has put the record in `uploading`. If dropped before
/// settling, the record is failed in the background and only then is the slot released.
struct UploadGuard {
    slot: Option<FileSlot>,
    catalog: Arc<dyn Catalog>,
    settled: bool,
}

impl UploadGuard {
    fn arm(slot: FileSlot, catalog: &Arc<dyn Catalog>) -> Self {
        Self {
            slot: Some(slot),
            catalog: catalog.clone(),
            settled: false,
        }
    }

    async fn fail(mut self) {
        if let Some(slot) = self.slot.as_ref() {
            mark_failed(self.catalog.as_ref(), slot.file_id).await;
        }
        self.settled = true;
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        let slot = match self.slot.take() {
            Some(slot) => slot,
            None => return,
        };
        if self.settled {
            return;
        }

        warn!("Upload of file {} abandoned before completion", slot.file_id);
        let catalog = self.catalog.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    mark_failed(catalog.as_ref(), slot.file_id).await;
                    drop(slot);
                });
            }
            Err(_) => error!("No runtime to mark abandoned file {} as error", slot.file_id),
        }
    }
}

/// `uploading -> error`. A record that already left `uploading` keeps its status.
async fn mark_failed(catalog: &dyn Catalog, file_id: Uuid) {
    match catalog.fail_file(file_id).await {
        Ok(true) => {}
        Ok(false) => debug!("File {} is no longer uploading; status left unchanged", file_id),
        Err(e) => error!("Failed to mark file {} as error: {:#}", file_id, e),
    }
}

#[derive(Clone)]
pub struct FileService {
    catalog: Arc<dyn Catalog>,
    registry: NodeRegistry,
    chunks: ChunkStore,
    settings: TransferSettings,
    active_uploads: ActiveUploads,
}

impl FileService {
    pub fn new(catalog: Arc<dyn Catalog>, blobs: Arc<dyn BlobBackend>, settings: TransferSettings) -> Self {
        Self {
            registry: NodeRegistry::new(catalog.clone()),
            catalog,
            chunks: ChunkStore::new(blobs),
            settings,
            active_uploads: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    fn validate(&self, file_name: &str, size: u64) -> Result<()> {
        if size > self.settings.max_file_size {
            return Err(DfsError::FileTooLarge { size, max: self.settings.max_file_size });
        }
        validate_file_name(file_name)?;
        if size == 0 {
            return Err(DfsError::EmptyFile);
        }
        Ok(())
    }

    /// Stores a new file. Validation failures leave no trace in the catalog.
    pub async fn upload(&self, req: UploadRequest, progress: Option<&ProgressFn>) -> Result<FileRecord> {
        let size = req.data.len() as u64;
        self.validate(&req.file_name, size)?;

        let target_parts = req.target_parts.unwrap_or(self.settings.default_parts);
        let record = FileRecord {
            file_id: Uuid::new_v4(),
            owner_id: req.owner_id,
            file_name: req.file_name,
            file_size: size,
            num_parts: target_parts.max(1),
            status: FileStatus::Uploading,
            created_at: Utc::now(),
        };
        let slot = FileSlot::acquire(record.file_id, &self.active_uploads)?;
        self.catalog.insert_file(&record).await?;
        let guard = UploadGuard::arm(slot, &self.catalog);
        info!("Uploading {} ({} bytes) as file {}", record.file_name, size, record.file_id);

        self.distribute(record, req.data, target_parts, guard, progress).await
    }

    /// Re-runs the upload of a record left in `error` (or stuck in `uploading`) with the
    /// same bytes. Chunks and part rows of the earlier attempt are removed first.
    pub async fn retry_upload(
        &self,
        owner_id: Uuid,
        file_id: Uuid,
        data: Bytes,
        target_parts: Option<u32>,
        progress: Option<&ProgressFn>,
    ) -> Result<FileRecord> {
        let slot = FileSlot::acquire(file_id, &self.active_uploads)?;
        let mut record = self.owned_file(owner_id, file_id).await?;

        if !matches!(record.status, FileStatus::Error | FileStatus::Uploading) {
            return Err(DfsError::NotRetryable { file_id, status: record.status });
        }
        if data.len() as u64 != record.file_size {
            return Err(DfsError::RetryMismatch {
                file_id,
                expected: record.file_size,
                actual: data.len() as u64,
            });
        }
        self.validate(&record.file_name, record.file_size)?;

        if let Err(e) = self.reset_for_retry(&record).await {
            mark_failed(self.catalog.as_ref(), file_id).await;
            return Err(e);
        }
        let guard = UploadGuard::arm(slot, &self.catalog);
        record.status = FileStatus::Uploading;
        info!("Retrying upload of file {} ({})", file_id, record.file_name);

        let target_parts = target_parts.unwrap_or(self.settings.default_parts);
        self.distribute(record, data, target_parts, guard, progress).await
    }

    /// Drops the chunks and part rows of the previous attempt, then puts the record back
    /// in `uploading`.
    async fn reset_for_retry(&self, record: &FileRecord) -> Result<()> {
        let parts = self.catalog.list_parts(record.file_id).await?;
        self.remove_chunks(record, &parts).await;

        let cleared = self.catalog.delete_parts(record.file_id).await?;
        if cleared > 0 {
            info!("Cleared {} part row(s) of file {} before retry", cleared, record.file_id);
        }
        self.catalog.update_file_status(record.file_id, FileStatus::Uploading).await?;
        Ok(())
    }

    async fn distribute(
        &self,
        mut record: FileRecord,
        data: Bytes,
        target_parts: u32,
        guard: UploadGuard,
        progress: Option<&ProgressFn>,
    ) -> Result<FileRecord> {
        let started = Instant::now();

        let nodes = self.registry.list_nodes(None, NodeOrder::ByFreeSpace).await;
        let planned = match plan(record.file_size, target_parts, &nodes) {
            Ok(planned) => planned,
            Err(e) => {
                warn!("Planning failed for file {}: {}", record.file_id, e);
                counter!("dfs_upload_failures_total").increment(1);
                guard.fail().await;
                return Err(e);
            }
        };
        if planned.len() as u32 != target_parts {
            info!(
                "File {} split into {} part(s) instead of the requested {}",
                record.file_id,
                planned.len(),
                target_parts
            );
        }

        let content_type = content_type_for(&record.file_name);
        let total = planned.len();
        let writes: Vec<_> = planned
            .iter()
            .map(|part| {
                let slice = data.slice(part.byte_range());
                self.write_part(&record, part, slice, content_type)
            })
            .collect();
        let mut pipeline = stream::iter(writes).buffered(self.settings.transfer_concurrency);

        let mut completed = 0usize;
        while let Some(result) = pipeline.next().await {
            match result {
                Ok(_) => {
                    completed += 1;
                    counter!("dfs_parts_written_total").increment(1);
                    if let Some(report) = progress {
                        report(completed as f64 / total as f64);
                    }
                }
                Err(e) => {
                    // Cancel whatever is still in flight before recording the failure.
                    drop(pipeline);
                    error!("{}", e);
                    counter!("dfs_upload_failures_total").increment(1);
                    guard.fail().await;
                    return Err(e);
                }
            }
        }
        drop(pipeline);

        let num_parts = total as u32;
        let finalized = match self.catalog.finalize_file(record.file_id, num_parts).await {
            Ok(finalized) => finalized,
            Err(e) => {
                guard.fail().await;
                return Err(e.into());
            }
        };
        if !finalized {
            guard.fail().await;
            return Err(DfsError::CorruptMetadata {
                file_id: record.file_id,
                detail: format!("expected {} part rows when finalizing", num_parts),
            });
        }
        guard.settle();

        record.num_parts = num_parts;
        record.status = FileStatus::Distributed;
        counter!("dfs_files_uploaded_total").increment(1);
        histogram!("dfs_transfer_seconds", "operation" => "upload").record(started.elapsed().as_secs_f64());
        info!(
            "File {} distributed across {} node(s) in {:.2?}",
            record.file_id,
            num_parts,
            started.elapsed()
        );
        Ok(record)
    }

    async fn write_part(
        &self,
        record: &FileRecord,
        part: &PlannedPart,
        data: Bytes,
        content_type: &str,
    ) -> Result<FilePart> {
        let write_failed = |source: anyhow::Error| DfsError::PartWriteFailed {
            file_id: record.file_id,
            part_index: part.part_index,
            source,
        };

        let digest = checksum(&data);
        let size = data.len() as u64;
        let key = ChunkKey::new(record.owner_id, record.file_id, part.part_index);
        self.chunks
            .put(key, data, content_type)
            .await
            .map_err(|e| write_failed(e.into()))?;

        self.catalog
            .insert_part(&NewFilePart {
                file_id: record.file_id,
                part_index: part.part_index,
                node_id: part.node.node_id,
                checksum: digest,
                size,
            })
            .await
            .map_err(write_failed)
    }

    /// Reassembles a distributed file, verifying every part. Any failure discards the
    /// whole result.
    pub async fn download(&self, owner_id: Uuid, file_id: Uuid) -> Result<DownloadedFile> {
        let started = Instant::now();
        let (record, parts) = self.verified_layout(owner_id, file_id).await?;

        let reads: Vec<_> = parts.iter().map(|part| self.read_part(&record, part)).collect();
        let mut pipeline = stream::iter(reads).buffered(self.settings.transfer_concurrency);

        let mut assembled = BytesMut::with_capacity(record.file_size as usize);
        while let Some(result) = pipeline.next().await {
            assembled.extend_from_slice(&result?);
        }
        drop(pipeline);

        counter!("dfs_files_downloaded_total").increment(1);
        histogram!("dfs_transfer_seconds", "operation" => "download").record(started.elapsed().as_secs_f64());
        info!("Reassembled file {} from {} part(s)", file_id, parts.len());

        Ok(DownloadedFile {
            file_id,
            content_type: content_type_for(&record.file_name),
            file_name: record.file_name,
            data: assembled.freeze(),
        })
    }

    /// Fetches one verified chunk as-is, for inspecting placement.
    pub async fn download_part(&self, owner_id: Uuid, file_id: Uuid, part_index: u32) -> Result<DownloadedChunk> {
        let (record, parts) = self.verified_layout(owner_id, file_id).await?;
        let part = parts
            .iter()
            .find(|p| p.part_index == part_index)
            .ok_or(DfsError::PartNotFound { file_id, part_index })?;

        let data = self.read_part(&record, part).await?;
        Ok(DownloadedChunk {
            file_id,
            part_index,
            node_id: part.node_id,
            suggested_name: chunk_file_name(&record.file_name, part_index),
            content_type: OCTET_STREAM,
            data,
        })
    }

    async fn verified_layout(&self, owner_id: Uuid, file_id: Uuid) -> Result<(FileRecord, Vec<FilePart>)> {
        let record = self.owned_file(owner_id, file_id).await?;
        if record.status != FileStatus::Distributed {
            return Err(DfsError::FileNotReady { file_id, status: record.status });
        }
        let parts = self.catalog.list_parts(file_id).await?;
        check_layout(&record, &parts)?;
        Ok((record, parts))
    }

    async fn read_part(&self, record: &FileRecord, part: &FilePart) -> Result<Bytes> {
        let key = ChunkKey::new(record.owner_id, record.file_id, part.part_index);
        let data = self.chunks.get(key).await.map_err(|e| match e {
            BlobError::NotFound(_) => DfsError::NotFound {
                file_id: record.file_id,
                part_index: part.part_index,
            },
            other => DfsError::PartReadFailed {
                file_id: record.file_id,
                part_index: part.part_index,
                source: other,
            },
        })?;

        if checksum(&data) != part.checksum {
            warn!("Checksum mismatch in part {} of file {}", part.part_index, record.file_id);
            return Err(DfsError::ChecksumMismatch {
                file_id: record.file_id,
                part_index: part.part_index,
            });
        }
        Ok(data)
    }

    pub async fn list_files(&self, owner_id: Uuid) -> Result<Vec<FileRecord>> {
        Ok(self.catalog.list_files(owner_id).await?)
    }

    pub async fn get_file(&self, owner_id: Uuid, file_id: Uuid) -> Result<FileRecord> {
        self.owned_file(owner_id, file_id).await
    }

    /// Chunk distribution map: every recorded part with the name of its node.
    pub async fn list_parts(&self, owner_id: Uuid, file_id: Uuid) -> Result<Vec<PartPlacement>> {
        self.owned_file(owner_id, file_id).await?;
        let parts = self.catalog.list_parts(file_id).await?;
        let names: HashMap<Uuid, String> = self
            .registry
            .list_nodes(None, NodeOrder::ByName)
            .await
            .into_iter()
            .map(|n| (n.node_id, n.node_name))
            .collect();

        Ok(parts
            .into_iter()
            .map(|part| PartPlacement {
                node_name: names.get(&part.node_id).cloned(),
                part,
            })
            .collect())
    }

    /// Removes a file's chunks (best effort) and then its record and part rows.
    pub async fn delete_file(&self, owner_id: Uuid, file_id: Uuid) -> Result<()> {
        let _slot = FileSlot::acquire(file_id, &self.active_uploads)?;
        let record = self.owned_file(owner_id, file_id).await?;
        let parts = self.catalog.list_parts(file_id).await?;
        self.remove_chunks(&record, &parts).await;

        self.catalog.delete_file(file_id).await?;
        info!("Deleted file {} ({})", file_id, record.file_name);
        Ok(())
    }

    /// Deletes the chunk of every recorded part plus the declared range, so chunks
    /// written without a row go too. Failures are only logged.
    async fn remove_chunks(&self, record: &FileRecord, parts: &[FilePart]) {
        let indices: BTreeSet<u32> = parts
            .iter()
            .map(|p| p.part_index)
            .chain(1..=record.num_parts)
            .collect();
        for index in indices {
            let key = ChunkKey::new(record.owner_id, record.file_id, index);
            if let Err(e) = self.chunks.delete(key).await {
                warn!("Failed to delete chunk {}: {}", key, e);
            }
        }
    }

    async fn owned_file(&self, owner_id: Uuid, file_id: Uuid) -> Result<FileRecord> {
        match self.catalog.get_file(file_id).await? {
            Some(record) if record.owner_id == owner_id => Ok(record),
            _ => Err(DfsError::FileNotFound(file_id)),
        }
    }
}

/// Parts must be exactly `1..=num_parts` and add up to the file size.
fn check_layout(record: &FileRecord, parts: &[FilePart]) -> Result<()> {
    let corrupt = |detail: String| DfsError::CorruptMetadata { file_id: record.file_id, detail };

    for (position, part) in parts.iter().enumerate() {
        let expected = position as u32 + 1;
        if part.part_index != expected {
            return Err(if part.part_index < expected {
                corrupt(format!("duplicate part index {}", part.part_index))
            } else {
                corrupt(format!("missing part {}", expected))
            });
        }
    }
    if parts.len() as u32 != record.num_parts {
        return Err(corrupt(format!(
            "{} part(s) recorded, {} declared",
            parts.len(),
            record.num_parts
        )));
    }
    let total: u64 = parts.iter().map(|p| p.size).sum();
    if total != record.file_size {
        return Err(corrupt(format!(
            "part sizes sum to {} bytes, file is {}",
            total, record.file_size
        )));
    }
    Ok(())
}
