use sqlx::{Pool, Postgres, Row};
use sqlx::postgres::PgRow;
use crate::models::{FilePart, NewFilePart};
use uuid::Uuid;

fn part_from_row(row: &PgRow) -> Result<FilePart, sqlx::Error> {
    let part_index: i32 = row.try_get("part_index")?;
    let size: i64 = row.try_get("size_bytes")?;
    Ok(FilePart {
        file_id: row.try_get("file_id")?,
        part_index: part_index as u32,
        node_id: row.try_get("node_id")?,
        checksum: row.try_get("checksum")?,
        size: size as u64,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn create_file_part(pool: &Pool<Postgres>, part: &NewFilePart) -> Result<FilePart, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO file_parts (file_id, part_index, node_id, checksum, size_bytes)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING file_id, part_index, node_id, checksum, size_bytes, created_at
        "#,
    )
        .bind(part.file_id)
        .bind(part.part_index as i32)
        .bind(part.node_id)
        .bind(&part.checksum)
        .bind(part.size as i64)
        .fetch_one(pool)
        .await?;
    part_from_row(&row)
}

pub async fn get_parts_by_file_id(pool: &Pool<Postgres>, file_id: Uuid) -> Result<Vec<FilePart>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT file_id, part_index, node_id, checksum, size_bytes, created_at
        FROM file_parts
        WHERE file_id = $1
        ORDER BY part_index
        "#,
    )
        .bind(file_id)
        .fetch_all(pool)
        .await?;
    rows.iter().map(part_from_row).collect()
}

pub async fn delete_parts_by_file_id(pool: &Pool<Postgres>, file_id: Uuid) -> Result<u64, sqlx::Error> {
    let rows = sqlx::query("DELETE FROM file_parts WHERE file_id = $1")
        .bind(file_id)
        .execute(pool)
        .await?
        .rows_affected();
    Ok(rows)
}
