use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::ParseStatusError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Uploading,
    Distributed,
    Complete,
    Error,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Uploading => "uploading",
            FileStatus::Distributed => "distributed",
            FileStatus::Complete => "complete",
            FileStatus::Error => "error",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(FileStatus::Uploading),
            "distributed" => Ok(FileStatus::Distributed),
            "complete" => Ok(FileStatus::Complete),
            "error" => Ok(FileStatus::Error),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileRecord {
    pub file_id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub num_parts: u32,
    pub status: FileStatus,
    pub created_at: DateTime<Utc>,
}
