use serde::{Serialize, Deserialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::ParseStatusError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Online,
    Degraded,
    Offline,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Online => "online",
            NodeStatus::Degraded => "degraded",
            NodeStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(NodeStatus::Online),
            "degraded" => Ok(NodeStatus::Degraded),
            "offline" => Ok(NodeStatus::Offline),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A storage endpoint as seen through the catalog. Capacities are in GB.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StorageNode {
    pub node_id: Uuid,
    pub node_name: String,
    pub status: NodeStatus,
    pub total_space_gb: f64,
    pub free_space_gb: f64,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl StorageNode {
    pub fn is_online(&self) -> bool {
        self.status == NodeStatus::Online
    }

    /// Percentage of the node's capacity in use, 0 for a node reporting no capacity.
    pub fn usage_percent(&self) -> f64 {
        if self.total_space_gb <= 0.0 {
            return 0.0;
        }
        (self.total_space_gb - self.free_space_gb) / self.total_space_gb * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(total: f64, free: f64) -> StorageNode {
        StorageNode {
            node_id: Uuid::new_v4(),
            node_name: "node-a".to_string(),
            status: NodeStatus::Online,
            total_space_gb: total,
            free_space_gb: free,
            last_heartbeat: None,
        }
    }

    #[test]
    fn usage_percent_reflects_used_space() {
        assert_eq!(node(200.0, 50.0).usage_percent(), 75.0);
        assert_eq!(node(0.0, 0.0).usage_percent(), 0.0);
    }

    #[test]
    fn status_parses_from_catalog_text() {
        assert_eq!("degraded".parse::<NodeStatus>().unwrap(), NodeStatus::Degraded);
        assert!("rebooting".parse::<NodeStatus>().is_err());
    }
}
