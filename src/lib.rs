pub mod cli;
pub mod db;
pub mod distribution;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{DfsError, Result};
