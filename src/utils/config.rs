use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use dotenv::dotenv;
use anyhow::{Context, Result};
use uuid::Uuid;

use crate::distribution::DEFAULT_TARGET_PARTS;

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
pub const DEFAULT_NODE_STALE_SECS: i64 = 120;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub chunk_dir: PathBuf,
    pub max_file_size: u64,
    pub default_parts: u32,
    /// How many part transfers may be in flight at once; 1 keeps them strictly sequential.
    pub transfer_concurrency: usize,
    pub node_stale_secs: i64,
    pub prometheus_port: Option<u16>,
    pub owner_id: Option<Uuid>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            chunk_dir: PathBuf::from("chunks"),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            default_parts: DEFAULT_TARGET_PARTS,
            transfer_concurrency: 1,
            node_stale_secs: DEFAULT_NODE_STALE_SECS,
            prometheus_port: None,
            owner_id: None,
        }
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("invalid value for {}: '{}'", name, raw)),
        Err(_) => Ok(None),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = Config::default();

        let transfer_concurrency = parse_var::<usize>("TRANSFER_CONCURRENCY")?
            .unwrap_or(defaults.transfer_concurrency)
            .max(1);

        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            chunk_dir: env::var("CHUNK_DIR").map(PathBuf::from).unwrap_or(defaults.chunk_dir),
            max_file_size: parse_var("MAX_FILE_SIZE_BYTES")?.unwrap_or(defaults.max_file_size),
            default_parts: parse_var("DEFAULT_PARTS")?.unwrap_or(defaults.default_parts),
            transfer_concurrency,
            node_stale_secs: parse_var("NODE_STALE_SECS")?.unwrap_or(defaults.node_stale_secs),
            prometheus_port: parse_var("PROMETHEUS_PORT")?,
            owner_id: parse_var("DFS_OWNER_ID")?,
        })
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().context("DATABASE_URL not set")
    }
}
