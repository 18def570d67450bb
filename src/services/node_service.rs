use std::sync::Arc;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{Duration, Utc};
use log::{info, warn};
use uuid::Uuid;

use crate::db::Catalog;
use crate::models::{NodeStatus, StorageNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeOrder {
    /// Alphabetical, for display.
    ByName,
    /// Most free space first, for planning.
    ByFreeSpace,
}

/// Read-mostly view of the storage nodes in the catalog.
#[derive(Clone)]
pub struct NodeRegistry {
    catalog: Arc<dyn Catalog>,
}

impl NodeRegistry {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    /// Never fails: an unreachable catalog yields no nodes, which planning rejects.
    pub async fn list_nodes(&self, filter: Option<NodeStatus>, order: NodeOrder) -> Vec<StorageNode> {
        let nodes = match self.catalog.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                warn!("Node registry unavailable, reporting no nodes: {:#}", e);
                return Vec::new();
            }
        };

        let mut nodes: Vec<StorageNode> = nodes
            .into_iter()
            .filter(|n| filter.map_or(true, |status| n.status == status))
            .collect();

        match order {
            NodeOrder::ByName => nodes.sort_by(|a, b| a.node_name.cmp(&b.node_name).then(a.node_id.cmp(&b.node_id))),
            NodeOrder::ByFreeSpace => nodes.sort_by(|a, b| {
                b.free_space_gb
                    .total_cmp(&a.free_space_gb)
                    .then(a.node_id.cmp(&b.node_id))
            }),
        }
        nodes
    }

    /// Online nodes in the order the planner consumes them.
    pub async fn planning_view(&self) -> Vec<StorageNode> {
        self.list_nodes(Some(NodeStatus::Online), NodeOrder::ByFreeSpace).await
    }

    pub async fn register_node(&self, node_name: &str, total_space_gb: f64, free_space_gb: f64) -> Result<StorageNode> {
        if node_name.trim().is_empty() {
            bail!("node name must not be empty");
        }
        check_capacity(total_space_gb, free_space_gb)?;

        let node = StorageNode {
            node_id: Uuid::new_v4(),
            node_name: node_name.trim().to_string(),
            status: NodeStatus::Online,
            total_space_gb,
            free_space_gb,
            last_heartbeat: Some(Utc::now()),
        };
        self.catalog.insert_node(&node).await.context("register node")?;
        info!("Registered node {} ({}) with {:.1}/{:.1} GB free", node.node_name, node.node_id, free_space_gb, total_space_gb);
        Ok(node)
    }

    pub async fn record_heartbeat(&self, node_id: Uuid, status: NodeStatus, free_space_gb: f64) -> Result<StorageNode> {
        let node = self
            .catalog
            .get_node(node_id)
            .await?
            .ok_or_else(|| anyhow!("node {} not found", node_id))?;
        check_capacity(node.total_space_gb, free_space_gb)?;

        self.catalog
            .update_node_heartbeat(node_id, status, free_space_gb, Utc::now())
            .await
            .context("update node heartbeat")?
            .ok_or_else(|| anyhow!("node {} not found", node_id))
    }

    /// Marks nodes that have not reported within `threshold` as offline.
    pub async fn sweep_stale_nodes(&self, threshold: Duration) -> Result<u64> {
        let cutoff = Utc::now() - threshold;
        let marked = self.catalog.mark_stale_nodes_offline(cutoff).await?;
        if marked > 0 {
            info!("Marked {} stale node(s) offline", marked);
        }
        Ok(marked)
    }
}

fn check_capacity(total_space_gb: f64, free_space_gb: f64) -> Result<()> {
    if !(total_space_gb >= 0.0 && free_space_gb >= 0.0) {
        bail!("capacity must be non-negative");
    }
    if free_space_gb > total_space_gb {
        bail!("free space {} GB exceeds total {} GB", free_space_gb, total_space_gb);
    }
    Ok(())
}
