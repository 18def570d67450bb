mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use chunked_file_storage::models::FileStatus;
use chunked_file_storage::services::{ProgressFn, TransferSettings, UploadRequest};
use chunked_file_storage::db::Catalog;
use uuid::Uuid;

use common::{chunk_key, cluster, cluster_with, sample_bytes};

fn request(owner_id: Uuid, name: &str, data: Bytes) -> UploadRequest {
    UploadRequest {
        owner_id,
        file_name: name.to_string(),
        data,
        target_parts: None,
    }
}

#[tokio::test]
async fn round_trip_reproduces_bytes() {
    let c = cluster(4).await;
    let owner = Uuid::new_v4();

    for len in [1usize, 3, 5, 1001, 64 * 1024 + 7] {
        let data = sample_bytes(len);
        let record = c
            .service
            .upload(request(owner, "blob.bin", data.clone()), None)
            .await
            .unwrap();
        assert_eq!(record.status, FileStatus::Distributed);

        let file = c.service.download(owner, record.file_id).await.unwrap();
        assert_eq!(file.data, data, "length {}", len);
        assert_eq!(file.content_type, "application/octet-stream");
    }
}

#[tokio::test]
async fn ten_mib_over_four_nodes() {
    let c = cluster(4).await;
    let owner = Uuid::new_v4();
    let data = sample_bytes(10 * 1024 * 1024);

    let record = c.service.upload(request(owner, "big.zip", data.clone()), None).await.unwrap();
    assert_eq!(record.num_parts, 4);

    let parts = c.catalog.list_parts(record.file_id).await.unwrap();
    let sizes: Vec<u64> = parts.iter().map(|p| p.size).collect();
    assert_eq!(sizes, vec![2_621_440; 4]);
    assert_eq!(parts.iter().map(|p| p.part_index).collect::<Vec<_>>(), vec![1, 2, 3, 4]);

    let nodes: HashSet<Uuid> = parts.iter().map(|p| p.node_id).collect();
    assert_eq!(nodes.len(), 4);

    let file = c.service.download(owner, record.file_id).await.unwrap();
    assert_eq!(file.content_type, "application/zip");
    assert_eq!(file.data, data);
}

#[tokio::test]
async fn part_sizes_sum_to_file_size() {
    let c = cluster(3).await;
    let owner = Uuid::new_v4();
    let data = sample_bytes(10 * 1024 * 1024 + 1);

    let record = c.service.upload(request(owner, "odd.dat", data), None).await.unwrap();
    let parts = c.catalog.list_parts(record.file_id).await.unwrap();

    assert_eq!(record.num_parts, 3);
    assert_eq!(parts.iter().map(|p| p.size).sum::<u64>(), record.file_size);
    assert!(parts[2].size <= parts[0].size);
}

#[tokio::test]
async fn records_effective_part_count() {
    let c = cluster(2).await;
    let owner = Uuid::new_v4();

    let record = c
        .service
        .upload(request(owner, "notes.txt", sample_bytes(4000)), None)
        .await
        .unwrap();
    assert_eq!(record.num_parts, 2);

    let stored = c.service.get_file(owner, record.file_id).await.unwrap();
    assert_eq!(stored.num_parts, 2);
    assert_eq!(stored.status, FileStatus::Distributed);
}

#[tokio::test]
async fn chunks_live_under_owner_file_part_keys() {
    let c = cluster(4).await;
    let owner = Uuid::new_v4();

    let record = c
        .service
        .upload(request(owner, "report.pdf", sample_bytes(4096)), None)
        .await
        .unwrap();
    for index in 1..=4 {
        assert!(c.blobs.contains(&chunk_key(owner, record.file_id, index)).await);
    }
}

#[tokio::test]
async fn progress_reported_once_per_part() {
    let c = cluster(4).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let report: &ProgressFn = &move |fraction: f64| sink.lock().unwrap().push(fraction);

    c.service
        .upload(request(Uuid::new_v4(), "a.txt", sample_bytes(400)), Some(report))
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5, 0.75, 1.0]);
}

#[tokio::test]
async fn concurrent_transfers_keep_order() {
    let settings = TransferSettings {
        transfer_concurrency: 4,
        ..TransferSettings::default()
    };
    let c = cluster_with(6, settings).await;
    let owner = Uuid::new_v4();
    let data = sample_bytes(123_457);

    let record = c
        .service
        .upload(
            UploadRequest {
                target_parts: Some(6),
                ..request(owner, "video.mp4", data.clone())
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(record.num_parts, 6);

    let file = c.service.download(owner, record.file_id).await.unwrap();
    assert_eq!(file.data, data);
    assert_eq!(file.content_type, "video/mp4");
}

#[tokio::test]
async fn single_chunk_download_returns_raw_part() {
    let c = cluster(4).await;
    let owner = Uuid::new_v4();
    let data = sample_bytes(1000);

    let record = c.service.upload(request(owner, "report.pdf", data.clone()), None).await.unwrap();
    let chunk = c.service.download_part(owner, record.file_id, 2).await.unwrap();

    assert_eq!(chunk.data, data.slice(250..500));
    assert_eq!(chunk.suggested_name, "report.chunk2.pdf");
    assert_eq!(chunk.content_type, "application/octet-stream");
    assert_eq!(chunk.node_id, c.nodes[1].node_id);
}

#[tokio::test]
async fn part_map_names_nodes() {
    let c = cluster(3).await;
    let owner = Uuid::new_v4();

    let record = c
        .service
        .upload(request(owner, "data.json", sample_bytes(300)), None)
        .await
        .unwrap();
    let placements = c.service.list_parts(owner, record.file_id).await.unwrap();

    let names: Vec<Option<String>> = placements.iter().map(|p| p.node_name.clone()).collect();
    assert_eq!(
        names,
        vec![Some("node-0".to_string()), Some("node-1".to_string()), Some("node-2".to_string())]
    );
}

#[tokio::test]
async fn files_listed_newest_first_and_scoped_to_owner() {
    let c = cluster(2).await;
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();

    let first = c.service.upload(request(owner, "one.txt", sample_bytes(10)), None).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = c.service.upload(request(owner, "two.txt", sample_bytes(10)), None).await.unwrap();
    c.service.upload(request(other, "three.txt", sample_bytes(10)), None).await.unwrap();

    let ids: Vec<Uuid> = c.service.list_files(owner).await.unwrap().iter().map(|f| f.file_id).collect();
    assert_eq!(ids, vec![second.file_id, first.file_id]);

    assert!(c.service.download(other, first.file_id).await.is_err());
}

#[tokio::test]
async fn delete_removes_chunks_and_records() {
    let c = cluster(4).await;
    let owner = Uuid::new_v4();

    let record = c
        .service
        .upload(request(owner, "gone.txt", sample_bytes(800)), None)
        .await
        .unwrap();
    assert_eq!(c.blobs.len().await, 4);

    c.service.delete_file(owner, record.file_id).await.unwrap();

    assert!(c.blobs.is_empty().await);
    assert!(c.catalog.get_file(record.file_id).await.unwrap().is_none());
    assert!(c.catalog.list_parts(record.file_id).await.unwrap().is_empty());
}
