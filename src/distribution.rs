//! Chunk planning: how many parts a file is cut into, where each part starts, and
//! which node receives it.
//!
//! Every part lands on a different online node. There is no replication; a second
//! copy of a part would mean a second node per `PlannedPart` here and one part row per
//! replica in the catalog.

use crate::error::{DfsError, Result};
use crate::models::StorageNode;

pub const DEFAULT_TARGET_PARTS: u32 = 4;
pub const MIN_ONLINE_NODES: usize = 2;

#[derive(Debug, Clone)]
pub struct PlannedPart {
    /// 1-based.
    pub part_index: u32,
    pub start_offset: u64,
    pub length: u64,
    pub node: StorageNode,
}

impl PlannedPart {
    pub fn byte_range(&self) -> std::ops::Range<usize> {
        self.start_offset as usize..(self.start_offset + self.length) as usize
    }
}

/// Online nodes ordered for placement: most free space first, node id breaking ties.
pub fn placement_order(nodes: &[StorageNode]) -> Vec<StorageNode> {
    let mut online: Vec<StorageNode> = nodes.iter().filter(|n| n.is_online()).cloned().collect();
    online.sort_by(|a, b| {
        b.free_space_gb
            .total_cmp(&a.free_space_gb)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    online
}

pub fn plan(file_size: u64, target_parts: u32, nodes: &[StorageNode]) -> Result<Vec<PlannedPart>> {
    if file_size == 0 {
        return Err(DfsError::EmptyFile);
    }

    let candidates = placement_order(nodes);
    if candidates.len() < MIN_ONLINE_NODES {
        return Err(DfsError::InsufficientNodes { available: candidates.len() });
    }

    let requested = target_parts.max(1) as u64;
    let num_parts = requested.min(candidates.len() as u64);
    let part_size = file_size.div_ceil(num_parts);
    // Tiny files can't fill every part under the ceiling rule; drop the empty tail.
    let num_parts = file_size.div_ceil(part_size);

    let mut planned = Vec::with_capacity(num_parts as usize);
    let mut offset = 0u64;
    for (i, node) in candidates.into_iter().take(num_parts as usize).enumerate() {
        let length = if i as u64 == num_parts - 1 {
            file_size - part_size * (num_parts - 1)
        } else {
            part_size
        };
        planned.push(PlannedPart {
            part_index: i as u32 + 1,
            start_offset: offset,
            length,
            node,
        });
        offset += length;
    }

    Ok(planned)
}
