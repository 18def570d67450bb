use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Catalog;
use crate::models::{FilePart, FileRecord, FileStatus, NewFilePart, NodeStatus, StorageNode};

#[derive(Default)]
struct Tables {
    nodes: HashMap<Uuid, StorageNode>,
    files: HashMap<Uuid, FileRecord>,
    parts: Vec<FilePart>,
}

/// In-process catalog with the same semantics as the Postgres one.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every call fails as if the database were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drops a single part row, leaving the file record untouched.
    pub async fn remove_part(&self, file_id: Uuid, part_index: u32) -> bool {
        let mut tables = self.tables.write().await;
        let before = tables.parts.len();
        tables.parts.retain(|p| !(p.file_id == file_id && p.part_index == part_index));
        tables.parts.len() != before
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("catalog unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_nodes(&self) -> Result<Vec<StorageNode>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut nodes: Vec<StorageNode> = tables.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.node_name.cmp(&b.node_name));
        Ok(nodes)
    }

    async fn get_node(&self, node_id: Uuid) -> Result<Option<StorageNode>> {
        self.check_available()?;
        Ok(self.tables.read().await.nodes.get(&node_id).cloned())
    }

    async fn insert_node(&self, node: &StorageNode) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables.nodes.contains_key(&node.node_id) {
            bail!("node {} already exists", node.node_id);
        }
        tables.nodes.insert(node.node_id, node.clone());
        Ok(())
    }

    async fn update_node_heartbeat(
        &self,
        node_id: Uuid,
        status: NodeStatus,
        free_space_gb: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<StorageNode>> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        Ok(tables.nodes.get_mut(&node_id).map(|node| {
            node.status = status;
            node.free_space_gb = free_space_gb;
            node.last_heartbeat = Some(at);
            node.clone()
        }))
    }

    async fn mark_stale_nodes_offline(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let mut marked = 0;
        for node in tables.nodes.values_mut() {
            let stale = node.last_heartbeat.map_or(true, |hb| hb < cutoff);
            if node.status != NodeStatus::Offline && stale {
                node.status = NodeStatus::Offline;
                marked += 1;
            }
        }
        Ok(marked)
    }

    async fn insert_file(&self, file: &FileRecord) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables.files.contains_key(&file.file_id) {
            bail!("file {} already exists", file.file_id);
        }
        tables.files.insert(file.file_id, file.clone());
        Ok(())
    }

    async fn get_file(&self, file_id: Uuid) -> Result<Option<FileRecord>> {
        self.check_available()?;
        Ok(self.tables.read().await.files.get(&file_id).cloned())
    }

    async fn list_files(&self, owner_id: Uuid) -> Result<Vec<FileRecord>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut files: Vec<FileRecord> = tables
            .files
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(files)
    }

    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> Result<()> {
        self.check_available()?;
        if let Some(file) = self.tables.write().await.files.get_mut(&file_id) {
            file.status = status;
        }
        Ok(())
    }

    async fn fail_file(&self, file_id: Uuid) -> Result<bool> {
        self.check_available()?;
        match self.tables.write().await.files.get_mut(&file_id) {
            Some(file) if file.status == FileStatus::Uploading => {
                file.status = FileStatus::Error;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finalize_file(&self, file_id: Uuid, num_parts: u32) -> Result<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let part_count = tables.parts.iter().filter(|p| p.file_id == file_id).count();
        match tables.files.get_mut(&file_id) {
            Some(file) if file.status == FileStatus::Uploading && part_count == num_parts as usize => {
                file.status = FileStatus::Distributed;
                file.num_parts = num_parts;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_file(&self, file_id: Uuid) -> Result<u64> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        tables.parts.retain(|p| p.file_id != file_id);
        Ok(tables.files.remove(&file_id).map_or(0, |_| 1))
    }

    async fn insert_part(&self, part: &NewFilePart) -> Result<FilePart> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if !tables.files.contains_key(&part.file_id) {
            return Err(anyhow!("file {} does not exist", part.file_id));
        }
        if !tables.nodes.contains_key(&part.node_id) {
            return Err(anyhow!("node {} does not exist", part.node_id));
        }
        if tables
            .parts
            .iter()
            .any(|p| p.file_id == part.file_id && p.part_index == part.part_index)
        {
            bail!("part {} of file {} already exists", part.part_index, part.file_id);
        }
        let row = FilePart {
            file_id: part.file_id,
            part_index: part.part_index,
            node_id: part.node_id,
            checksum: part.checksum.clone(),
            size: part.size,
            created_at: Utc::now(),
        };
        tables.parts.push(row.clone());
        Ok(row)
    }

    async fn list_parts(&self, file_id: Uuid) -> Result<Vec<FilePart>> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut parts: Vec<FilePart> = tables
            .parts
            .iter()
            .filter(|p| p.file_id == file_id)
            .cloned()
            .collect();
        parts.sort_by_key(|p| p.part_index);
        Ok(parts)
    }

    async fn delete_parts(&self, file_id: Uuid) -> Result<u64> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let before = tables.parts.len();
        tables.parts.retain(|p| p.file_id != file_id);
        Ok((before - tables.parts.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: FileStatus) -> FileRecord {
        FileRecord {
            file_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            file_name: "a.txt".to_string(),
            file_size: 10,
            num_parts: 2,
            status,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn fail_file_only_touches_uploading_records() {
        let catalog = MemoryCatalog::new();
        let uploading = record(FileStatus::Uploading);
        let distributed = record(FileStatus::Distributed);
        catalog.insert_file(&uploading).await.unwrap();
        catalog.insert_file(&distributed).await.unwrap();

        assert!(catalog.fail_file(uploading.file_id).await.unwrap());
        assert!(!catalog.fail_file(distributed.file_id).await.unwrap());
        assert!(!catalog.fail_file(Uuid::new_v4()).await.unwrap());

        assert_eq!(catalog.get_file(uploading.file_id).await.unwrap().unwrap().status, FileStatus::Error);
        assert_eq!(
            catalog.get_file(distributed.file_id).await.unwrap().unwrap().status,
            FileStatus::Distributed
        );
    }
}
