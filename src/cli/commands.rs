use super::Commands;
use std::path::{Path, PathBuf};
use anyhow::{anyhow, Context, Result};
use bytes::Bytes;
use chrono::Duration;
use tokio::fs;
use uuid::Uuid;

use crate::services::{FileService, NodeOrder, UploadRequest};
use crate::utils::config::Config;

fn require_owner(owner: Option<Uuid>) -> Result<Uuid> {
    owner.ok_or_else(|| anyhow!("No owner given. Pass --owner <uuid> or set DFS_OWNER_ID."))
}

fn default_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Cannot derive a file name from '{}'", path.display()))
}

fn print_progress(fraction: f64) {
    println!("  distributed {:>3.0}%", fraction * 100.0);
}

pub async fn handle_cli(cmd: Commands, service: &FileService, cfg: &Config, owner: Option<Uuid>) -> Result<()> {
    match cmd {
        Commands::Nodes { status } => {
            let nodes = service.registry().list_nodes(status, NodeOrder::ByName).await;
            if nodes.is_empty() {
                println!("No storage nodes.");
            }
            for n in nodes {
                let heartbeat = n
                    .last_heartbeat
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                println!(
                    "{} {} [{}] {:.1}/{:.1} GB free ({:.0}% used) last heartbeat {}",
                    n.node_id,
                    n.node_name,
                    n.status,
                    n.free_space_gb,
                    n.total_space_gb,
                    n.usage_percent(),
                    heartbeat
                );
            }
        }
        Commands::RegisterNode { name, total_gb, free_gb } => {
            let node = service.registry().register_node(&name, total_gb, free_gb).await?;
            println!("Registered node {} ({})", node.node_name, node.node_id);
        }
        Commands::Heartbeat { node_id, status, free_gb } => {
            let node = service.registry().record_heartbeat(node_id, status, free_gb).await?;
            println!("Node {} is {} with {:.1} GB free", node.node_name, node.status, node.free_space_gb);
        }
        Commands::SweepNodes { stale_secs } => {
            let secs = stale_secs.unwrap_or(cfg.node_stale_secs);
            let marked = service.registry().sweep_stale_nodes(Duration::seconds(secs)).await?;
            println!("Marked {} node(s) offline", marked);
        }
        Commands::Upload { file_path, name, parts } => {
            let owner_id = require_owner(owner)?;
            let file_name = match name {
                Some(n) => n,
                None => default_name(&file_path)?,
            };
            let data = fs::read(&file_path)
                .await
                .with_context(|| format!("Failed to read '{}'", file_path.display()))?;
            let req = UploadRequest {
                owner_id,
                file_name,
                data: Bytes::from(data),
                target_parts: parts,
            };
            let record = service.upload(req, Some(&print_progress)).await?;
            println!(
                "Uploaded {} as {} ({} bytes in {} parts)",
                record.file_name, record.file_id, record.file_size, record.num_parts
            );
        }
        Commands::Retry { file_id, file_path, parts } => {
            let owner_id = require_owner(owner)?;
            let data = fs::read(&file_path)
                .await
                .with_context(|| format!("Failed to read '{}'", file_path.display()))?;
            let record = service
                .retry_upload(owner_id, file_id, Bytes::from(data), parts, Some(&print_progress))
                .await?;
            println!("File {} is now {} ({} parts)", record.file_id, record.status, record.num_parts);
        }
        Commands::Files => {
            let owner_id = require_owner(owner)?;
            let files = service.list_files(owner_id).await?;
            if files.is_empty() {
                println!("No files uploaded yet.");
            }
            for f in files {
                println!(
                    "{} - {} ({} bytes, {} parts, {}) {}",
                    f.file_id,
                    f.file_name,
                    f.file_size,
                    f.num_parts,
                    f.status,
                    f.created_at.to_rfc3339()
                );
            }
        }
        Commands::Parts { file_id } => {
            let owner_id = require_owner(owner)?;
            for placement in service.list_parts(owner_id, file_id).await? {
                let part = placement.part;
                let node = placement.node_name.unwrap_or_else(|| part.node_id.to_string());
                println!(
                    "Part {} on {} - {:.2} KB sha256 {}",
                    part.part_index,
                    node,
                    part.size as f64 / 1024.0,
                    part.checksum
                );
            }
        }
        Commands::Download { file_id, output } => {
            let owner_id = require_owner(owner)?;
            let file = service.download(owner_id, file_id).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(&file.file_name));
            fs::write(&output, &file.data)
                .await
                .with_context(|| format!("Failed to write '{}'", output.display()))?;
            println!("Downloaded {} ({}, {} bytes) to {}", file.file_name, file.content_type, file.data.len(), output.display());
        }
        Commands::DownloadPart { file_id, index, output } => {
            let owner_id = require_owner(owner)?;
            let chunk = service.download_part(owner_id, file_id, index).await?;
            let output = output.unwrap_or_else(|| PathBuf::from(&chunk.suggested_name));
            fs::write(&output, &chunk.data)
                .await
                .with_context(|| format!("Failed to write '{}'", output.display()))?;
            println!("Chunk {} ({} bytes, node {}) written to {}", index, chunk.data.len(), chunk.node_id, output.display());
        }
        Commands::Delete { file_id } => {
            let owner_id = require_owner(owner)?;
            service.delete_file(owner_id, file_id).await?;
            println!("Deleted {}", file_id);
        }
    }
    Ok(())
}
