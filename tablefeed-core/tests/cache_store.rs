//! Cache store behavior: freshness tiers, stale serving, exhaustion,
//! and collapse of concurrent regenerations.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::anyhow;
use filetime::FileTime;
use tablefeed_core::{CacheError, CacheStore};
use tempfile::TempDir;

const TTL: Duration = Duration::from_secs(60);
const HARD_TIMEOUT: Duration = Duration::from_secs(120);

fn store() -> CacheStore {
    CacheStore::new(TTL, HARD_TIMEOUT)
}

fn write_artifact_aged(dir: &TempDir, content: &str, age: Duration) -> std::path::PathBuf {
    let path = dir.path().join("calendar.ics");
    std::fs::write(&path, content).unwrap();
    let mtime = FileTime::from_system_time(SystemTime::now() - age);
    filetime::set_file_mtime(&path, mtime).unwrap();
    path
}

#[tokio::test]
async fn fresh_artifact_is_served_unchanged_without_regeneration() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact_aged(&dir, "cached content", TTL - Duration::from_secs(1));

    let served = store()
        .serve(&path, || async { panic!("regenerator must not run") })
        .await
        .unwrap();

    assert_eq!(served, "cached content");
}

#[tokio::test]
async fn stale_artifact_is_regenerated_and_overwritten() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact_aged(&dir, "old", TTL + Duration::from_secs(1));

    let served = store()
        .serve(&path, || async { Ok("new".to_string()) })
        .await
        .unwrap();

    assert_eq!(served, "new");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
}

#[tokio::test]
async fn missing_artifact_is_generated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("calendar.ics");

    let served = store()
        .serve(&path, || async { Ok("generated".to_string()) })
        .await
        .unwrap();

    assert_eq!(served, "generated");
    assert!(path.exists());
}

#[tokio::test]
async fn failed_regeneration_serves_stale_within_hard_timeout() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact_aged(&dir, "stale but usable", TTL + Duration::from_secs(1));

    let served = store()
        .serve(&path, || async { Err(anyhow!("source down")) })
        .await
        .unwrap();

    // Degraded success, not an error.
    assert_eq!(served, "stale but usable");
}

#[tokio::test]
async fn failed_regeneration_past_hard_timeout_is_exhausted() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact_aged(&dir, "too old", HARD_TIMEOUT + Duration::from_secs(1));

    let err = store()
        .serve(&path, || async { Err(anyhow!("source down")) })
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Exhausted { .. }));
    // The expired artifact is never served.
    assert!(err.to_string().contains("source down"));
}

#[tokio::test]
async fn failed_regeneration_with_no_artifact_is_exhausted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("calendar.ics");

    let err = store()
        .serve(&path, || async { Err(anyhow!("source down")) })
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Exhausted { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_stale_observers_collapse_into_one_regeneration() {
    let dir = TempDir::new().unwrap();
    let path = write_artifact_aged(&dir, "old", TTL + Duration::from_secs(10));

    let store = Arc::new(store());
    let runs = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let store = store.clone();
        let runs = runs.clone();
        let path = path.clone();
        handles.push(tokio::spawn(async move {
            store
                .serve(&path, || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok("regenerated".to_string())
                })
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), "regenerated");
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1, "exactly one regeneration may run");
}
