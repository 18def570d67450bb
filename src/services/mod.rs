pub mod file_service;
pub mod node_service;

pub use file_service::{DownloadedChunk, DownloadedFile, FileService, ProgressFn, TransferSettings, UploadRequest};
pub use node_service::{NodeOrder, NodeRegistry};
