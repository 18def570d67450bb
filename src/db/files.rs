use sqlx::{Pool, Postgres, Row};
use sqlx::postgres::PgRow;
use crate::models::{FileRecord, FileStatus};
use uuid::Uuid;

use super::decode_status;

fn file_from_row(row: &PgRow) -> Result<FileRecord, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let file_size: i64 = row.try_get("file_size_bytes")?;
    let num_parts: i32 = row.try_get("num_parts")?;
    Ok(FileRecord {
        file_id: row.try_get("file_id")?,
        owner_id: row.try_get("owner_id")?,
        file_name: row.try_get("file_name")?,
        file_size: file_size as u64,
        num_parts: num_parts as u32,
        status: decode_status("status", &status)?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn create_file(pool: &Pool<Postgres>, file: &FileRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO files (file_id, owner_id, file_name, file_size_bytes, num_parts, status, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
        .bind(file.file_id)
        .bind(file.owner_id)
        .bind(&file.file_name)
        .bind(file.file_size as i64)
        .bind(file.num_parts as i32)
        .bind(file.status.as_str())
        .bind(file.created_at)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_file_by_id(pool: &Pool<Postgres>, file_id: Uuid) -> Result<Option<FileRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT file_id, owner_id, file_name, file_size_bytes, num_parts, status, created_at
        FROM files
        WHERE file_id = $1
        "#,
    )
        .bind(file_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(file_from_row).transpose()
}

pub async fn list_user_files(pool: &Pool<Postgres>, owner_id: Uuid) -> Result<Vec<FileRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT file_id, owner_id, file_name, file_size_bytes, num_parts, status, created_at
        FROM files
        WHERE owner_id = $1
        ORDER BY created_at DESC
        "#,
    )
        .bind(owner_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(file_from_row).collect()
}

pub async fn update_file_status(pool: &Pool<Postgres>, file_id: Uuid, status: FileStatus) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query("UPDATE files SET status = $1 WHERE file_id = $2")
        .bind(status.as_str())
        .bind(file_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows)
}

pub async fn fail_uploading_file(pool: &Pool<Postgres>, file_id: Uuid) -> Result<bool, sqlx::Error> {
    let rows = sqlx::query("UPDATE files SET status = 'error' WHERE file_id = $1 AND status = 'uploading'")
        .bind(file_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows == 1)
}

/// Flips a file to `distributed` in the same statement that checks its part rows,
/// so the status can never be observed ahead of a missing part.
pub async fn finalize_file(pool: &Pool<Postgres>, file_id: Uuid, num_parts: u32) -> Result<bool, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        UPDATE files
        SET status = 'distributed', num_parts = $2
        WHERE file_id = $1
          AND status = 'uploading'
          AND (SELECT COUNT(*) FROM file_parts WHERE file_id = $1) = $2
        "#,
    )
        .bind(file_id)
        .bind(num_parts as i32)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows == 1)
}

pub async fn delete_file(pool: &Pool<Postgres>, file_id: Uuid) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query("DELETE FROM files WHERE file_id = $1")
        .bind(file_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows)
}
