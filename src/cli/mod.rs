use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::NodeStatus;

pub mod commands;

#[derive(Parser, Debug)]
#[command(name = "dfs")]
#[command(about = "Store files as chunks spread across storage nodes", long_about = None)]
pub struct Cli {
    /// Owner the command acts for; falls back to DFS_OWNER_ID
    #[arg(long, global = true)]
    pub owner: Option<Uuid>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List storage nodes
    Nodes {
        #[arg(long)]
        status: Option<NodeStatus>,
    },
    RegisterNode {
        #[arg(long)]
        name: String,
        #[arg(long)]
        total_gb: f64,
        #[arg(long)]
        free_gb: f64,
    },
    Heartbeat {
        node_id: Uuid,
        #[arg(long, default_value = "online")]
        status: NodeStatus,
        #[arg(long)]
        free_gb: f64,
    },
    /// Mark nodes without a recent heartbeat offline
    SweepNodes {
        #[arg(long)]
        stale_secs: Option<i64>,
    },
    Upload {
        file_path: PathBuf,
        /// Stored name; defaults to the file's own name
        #[arg(long)]
        name: Option<String>,
        #[arg(short, long)]
        parts: Option<u32>,
    },
    /// Re-run a failed upload with the same bytes
    Retry {
        file_id: Uuid,
        file_path: PathBuf,
        #[arg(short, long)]
        parts: Option<u32>,
    },
    Files,
    /// Show which node holds each part of a file
    Parts {
        file_id: Uuid,
    },
    Download {
        file_id: Uuid,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    DownloadPart {
        file_id: Uuid,
        index: u32,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    Delete {
        file_id: Uuid,
    },
}
