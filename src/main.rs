use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use metrics_exporter_prometheus::PrometheusBuilder;

use chunked_file_storage::cli::{commands::handle_cli, Cli};
use chunked_file_storage::db::{self, Catalog, PgCatalog};
use chunked_file_storage::services::{FileService, TransferSettings};
use chunked_file_storage::storage::{BlobBackend, LocalBlobStore};
use chunked_file_storage::utils::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = Config::from_env()?;

    if let Some(port) = cfg.prometheus_port {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], port))
            .install()
            .context("install prometheus exporter")?;
        info!("Metrics exported on port {}", port);
    }

    let pool = db::init_db(cfg.database_url()?).await?;
    info!("Database OK.");

    tokio::fs::create_dir_all(&cfg.chunk_dir)
        .await
        .with_context(|| format!("create chunk dir {}", cfg.chunk_dir.display()))?;

    let catalog: Arc<dyn Catalog> = Arc::new(PgCatalog::new(pool));
    let blobs: Arc<dyn BlobBackend> = Arc::new(LocalBlobStore::new(&cfg.chunk_dir));
    let service = FileService::new(catalog, blobs, TransferSettings::from(&cfg));

    let owner = cli.owner.or(cfg.owner_id);
    handle_cli(cli.command, &service, &cfg, owner).await
}
