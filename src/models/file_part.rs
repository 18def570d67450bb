use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FilePart {
    pub file_id: Uuid,
    /// 1-based position of the part within its file.
    pub part_index: u32,
    pub node_id: Uuid,
    /// Lowercase hex SHA-256 of the part bytes.
    pub checksum: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewFilePart {
    pub file_id: Uuid,
    pub part_index: u32,
    pub node_id: Uuid,
    pub checksum: String,
    pub size: u64,
}

/// A part joined with the display name of the node holding it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PartPlacement {
    pub part: FilePart,
    pub node_name: Option<String>,
}
