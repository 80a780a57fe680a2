//! Object store integration tests.
//!
//! Run with a local MinIO:
//! docker run -d -p 9000:9000 minio/minio server /data

use std::io::Write;

use tempfile::NamedTempFile;
use uuid::Uuid;
use vpipe_storage::ObjectStore;

#[tokio::test]
#[ignore = "requires MinIO or S3 credentials"]
async fn test_upload_download_round_trip() {
    dotenvy::dotenv().ok();

    let store = ObjectStore::from_env();
    store.ensure_bucket().await.expect("Failed to ensure bucket");

    let key = format!("test/{}/source.mp4", Uuid::new_v4());

    let mut src = NamedTempFile::new().unwrap();
    src.write_all(b"not actually a video").unwrap();

    assert!(!store.exists(&key).await.unwrap());

    store.upload(src.path(), &key).await.unwrap();
    assert!(store.exists(&key).await.unwrap());

    let dest = NamedTempFile::new().unwrap();
    store.download(&key, dest.path()).await.unwrap();
    assert_eq!(std::fs::read(dest.path()).unwrap(), b"not actually a video");

    // Overwriting the same key with the same content is fine (last writer
    // wins); the idempotent re-run path depends on this.
    store.upload(src.path(), &key).await.unwrap();
}

#[tokio::test]
#[ignore = "requires MinIO or S3 credentials"]
async fn test_download_missing_key_fails() {
    dotenvy::dotenv().ok();

    let store = ObjectStore::from_env();
    let dest = NamedTempFile::new().unwrap();
    let missing = format!("test/{}/missing.mp4", Uuid::new_v4());

    let err = store.download(&missing, dest.path()).await.unwrap_err();
    assert!(matches!(
        err,
        vpipe_storage::StorageError::NotFound(_) | vpipe_storage::StorageError::DownloadFailed(_)
    ));
}
