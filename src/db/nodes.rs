use sqlx::{Pool, Postgres, Row};
use sqlx::postgres::PgRow;
use crate::models::{NodeStatus, StorageNode};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::decode_status;

fn node_from_row(row: &PgRow) -> Result<StorageNode, sqlx::Error> {
    let status: String = row.try_get("status")?;
    Ok(StorageNode {
        node_id: row.try_get("node_id")?,
        node_name: row.try_get("node_name")?,
        status: decode_status("status", &status)?,
        total_space_gb: row.try_get("total_space_gb")?,
        free_space_gb: row.try_get("free_space_gb")?,
        last_heartbeat: row.try_get("last_heartbeat")?,
    })
}

pub async fn insert_node(pool: &Pool<Postgres>, node: &StorageNode) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO storage_nodes (node_id, node_name, status, total_space_gb, free_space_gb, last_heartbeat)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
        .bind(node.node_id)
        .bind(&node.node_name)
        .bind(node.status.as_str())
        .bind(node.total_space_gb)
        .bind(node.free_space_gb)
        .bind(node.last_heartbeat)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_node(pool: &Pool<Postgres>, node_id: Uuid) -> Result<Option<StorageNode>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT node_id, node_name, status, total_space_gb, free_space_gb, last_heartbeat
        FROM storage_nodes
        WHERE node_id = $1
        "#,
    )
        .bind(node_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(node_from_row).transpose()
}

pub async fn get_all_nodes(pool: &Pool<Postgres>) -> Result<Vec<StorageNode>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT node_id, node_name, status, total_space_gb, free_space_gb, last_heartbeat
        FROM storage_nodes
        ORDER BY node_name
        "#,
    )
        .fetch_all(pool)
        .await?;
    rows.iter().map(node_from_row).collect()
}

pub async fn update_node_heartbeat(
    pool: &Pool<Postgres>,
    node_id: Uuid,
    status: NodeStatus,
    free_space_gb: f64,
    at: DateTime<Utc>,
) -> Result<Option<StorageNode>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE storage_nodes
        SET status = $1, free_space_gb = $2, last_heartbeat = $3
        WHERE node_id = $4
        RETURNING node_id, node_name, status, total_space_gb, free_space_gb, last_heartbeat
        "#,
    )
        .bind(status.as_str())
        .bind(free_space_gb)
        .bind(at)
        .bind(node_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(node_from_row).transpose()
}

pub async fn mark_stale_nodes_offline(pool: &Pool<Postgres>, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        UPDATE storage_nodes
        SET status = 'offline'
        WHERE status <> 'offline'
          AND (last_heartbeat IS NULL OR last_heartbeat < $1)
        "#,
    )
        .bind(cutoff)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows)
}
