use thiserror::Error;

pub mod node;
pub mod file;
pub mod file_part;

pub use node::{NodeStatus, StorageNode};
pub use file::{FileRecord, FileStatus};
pub use file_part::{FilePart, NewFilePart, PartPlacement};

#[derive(Debug, Error)]
#[error("unknown status value '{0}'")]
pub struct ParseStatusError(pub String);
