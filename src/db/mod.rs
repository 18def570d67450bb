//! Relational catalog for nodes, files and their parts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{FilePart, FileRecord, FileStatus, NewFilePart, NodeStatus, ParseStatusError, StorageNode};

pub mod files;
pub mod file_parts;
pub mod nodes;
pub mod memory;

pub use memory::MemoryCatalog;

/// Durable metadata store. Implementations must give read-after-write consistency.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<StorageNode>>;
    async fn get_node(&self, node_id: Uuid) -> Result<Option<StorageNode>>;
    async fn insert_node(&self, node: &StorageNode) -> Result<()>;
    /// Returns `None` when no node has this id.
    async fn update_node_heartbeat(
        &self,
        node_id: Uuid,
        status: NodeStatus,
        free_space_gb: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<StorageNode>>;
    async fn mark_stale_nodes_offline(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn insert_file(&self, file: &FileRecord) -> Result<()>;
    async fn get_file(&self, file_id: Uuid) -> Result<Option<FileRecord>>;
    /// Newest first.
    async fn list_files(&self, owner_id: Uuid) -> Result<Vec<FileRecord>>;
    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> Result<()>;
    /// Moves an `uploading` file to `error`. Files in any other status are left alone.
    /// Returns whether the transition happened.
    async fn fail_file(&self, file_id: Uuid) -> Result<bool>;
    /// Moves an `uploading` file to `distributed` and records `num_parts`, but only when
    /// exactly `num_parts` part rows exist. Returns whether the transition happened.
    async fn finalize_file(&self, file_id: Uuid, num_parts: u32) -> Result<bool>;
    /// Removes the file and, by cascade, its parts.
    async fn delete_file(&self, file_id: Uuid) -> Result<u64>;

    async fn insert_part(&self, part: &NewFilePart) -> Result<FilePart>;
    /// Ordered by part index.
    async fn list_parts(&self, file_id: Uuid) -> Result<Vec<FilePart>>;
    async fn delete_parts(&self, file_id: Uuid) -> Result<u64>;
}

pub async fn init_db(database_url: &str) -> Result<Pool<Postgres>> {
    let pool = Pool::<Postgres>::connect(database_url)
        .await
        .context("connect to database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("run migrations")?;
    Ok(pool)
}

pub(crate) fn decode_status<T>(column: &str, value: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ParseStatusError>,
{
    value.parse().map_err(|e: ParseStatusError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

#[derive(Clone)]
pub struct PgCatalog {
    pool: Pool<Postgres>,
}

impl PgCatalog {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn list_nodes(&self) -> Result<Vec<StorageNode>> {
        nodes::get_all_nodes(&self.pool).await.context("list storage nodes")
    }

    async fn get_node(&self, node_id: Uuid) -> Result<Option<StorageNode>> {
        nodes::get_node(&self.pool, node_id).await.context("get storage node")
    }

    async fn insert_node(&self, node: &StorageNode) -> Result<()> {
        nodes::insert_node(&self.pool, node).await.context("insert storage node")
    }

    async fn update_node_heartbeat(
        &self,
        node_id: Uuid,
        status: NodeStatus,
        free_space_gb: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<StorageNode>> {
        nodes::update_node_heartbeat(&self.pool, node_id, status, free_space_gb, at)
            .await
            .context("update node heartbeat")
    }

    async fn mark_stale_nodes_offline(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        nodes::mark_stale_nodes_offline(&self.pool, cutoff)
            .await
            .context("mark stale nodes offline")
    }

    async fn insert_file(&self, file: &FileRecord) -> Result<()> {
        files::create_file(&self.pool, file).await.context("insert file record")
    }

    async fn get_file(&self, file_id: Uuid) -> Result<Option<FileRecord>> {
        files::get_file_by_id(&self.pool, file_id).await.context("get file record")
    }

    async fn list_files(&self, owner_id: Uuid) -> Result<Vec<FileRecord>> {
        files::list_user_files(&self.pool, owner_id).await.context("list user files")
    }

    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> Result<()> {
        files::update_file_status(&self.pool, file_id, status)
            .await
            .context("update file status")?;
        Ok(())
    }

    async fn fail_file(&self, file_id: Uuid) -> Result<bool> {
        files::fail_uploading_file(&self.pool, file_id)
            .await
            .context("mark file failed")
    }

    async fn finalize_file(&self, file_id: Uuid, num_parts: u32) -> Result<bool> {
        files::finalize_file(&self.pool, file_id, num_parts)
            .await
            .context("finalize file")
    }

    async fn delete_file(&self, file_id: Uuid) -> Result<u64> {
        files::delete_file(&self.pool, file_id).await.context("delete file record")
    }

    async fn insert_part(&self, part: &NewFilePart) -> Result<FilePart> {
        file_parts::create_file_part(&self.pool, part)
            .await
            .context("insert file part")
    }

    async fn list_parts(&self, file_id: Uuid) -> Result<Vec<FilePart>> {
        file_parts::get_parts_by_file_id(&self.pool, file_id)
            .await
            .context("list file parts")
    }

    async fn delete_parts(&self, file_id: Uuid) -> Result<u64> {
        file_parts::delete_parts_by_file_id(&self.pool, file_id)
            .await
            .context("delete file parts")
    }
}
