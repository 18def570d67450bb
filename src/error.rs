use thiserror::Error;
use uuid::Uuid;

use crate::models::FileStatus;
use crate::storage::BlobError;

#[derive(Error, Debug)]
pub enum DfsError {
    #[error("insufficient online nodes: {available} available, at least 2 required")]
    InsufficientNodes { available: usize },

    #[error("refusing to store an empty file")]
    EmptyFile,

    #[error("file is {size} bytes, exceeding the {max} byte limit")]
    FileTooLarge { size: u64, max: u64 },

    #[error("invalid file name {0:?}: only letters, digits, '.', '_' and '-' are allowed")]
    InvalidName(String),

    #[error("file {file_id}: writing part {part_index} failed: {source}")]
    PartWriteFailed {
        file_id: Uuid,
        part_index: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("file {file_id} is not ready for download (status {status})")]
    FileNotReady { file_id: Uuid, status: FileStatus },

    #[error("file {file_id} has corrupt part metadata: {detail}")]
    CorruptMetadata { file_id: Uuid, detail: String },

    #[error("file {file_id}: checksum mismatch in part {part_index}")]
    ChecksumMismatch { file_id: Uuid, part_index: u32 },

    #[error("file {file_id}: chunk for part {part_index} not found in blob storage")]
    NotFound { file_id: Uuid, part_index: u32 },

    #[error("file {0} not found")]
    FileNotFound(Uuid),

    #[error("file {file_id} has no part {part_index}")]
    PartNotFound { file_id: Uuid, part_index: u32 },

    #[error("file {0} already has an upload in progress")]
    UploadInProgress(Uuid),

    #[error("file {file_id} is already {status}; only failed or stalled uploads can be retried")]
    NotRetryable { file_id: Uuid, status: FileStatus },

    #[error("file {file_id}: retry data is {actual} bytes but the record expects {expected}")]
    RetryMismatch { file_id: Uuid, expected: u64, actual: u64 },

    #[error("file {file_id}: reading part {part_index} failed: {source}")]
    PartReadFailed {
        file_id: Uuid,
        part_index: u32,
        #[source]
        source: BlobError,
    },

    #[error("catalog error: {0}")]
    Catalog(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DfsError>;
