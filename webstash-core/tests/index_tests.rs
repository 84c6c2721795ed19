// Tests for the domain archive index

use std::time::Duration;
use tempfile::TempDir;
use webstash_archiver::store::{PRIMARY_DOCUMENT, SnapshotStore};
use webstash_core::index::{ArchiveIndex, DEFAULT_REFRESH_AFTER};

async fn write_primary(store: &SnapshotStore, domain: &str, capture_id: i64, text: &str) {
    let path = store.resolve_path(domain, capture_id, PRIMARY_DOCUMENT);
    store.save(&path, text.as_bytes()).await.unwrap();
}

fn test_index() -> (TempDir, ArchiveIndex) {
    let temp_dir = TempDir::new().unwrap();
    let store = SnapshotStore::new(temp_dir.path().join("archives"));
    (temp_dir, ArchiveIndex::new(store))
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_domains_empty_without_root() {
    let (_temp_dir, index) = test_index();
    assert!(index.list_domains().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_captures_newest_first_with_change_signal() {
    let (_temp_dir, index) = test_index();
    let domain = "example.com";

    write_primary(index.store(), domain, 1000, "one two three four").await;
    write_primary(index.store(), domain, 2000, "one two three four").await;
    write_primary(index.store(), domain, 3000, "one two three four five six seven eight").await;

    let captures = index.list_captures(domain).await.unwrap();
    let ids: Vec<i64> = captures.iter().map(|c| c.capture_id).collect();
    assert_eq!(ids, vec![3000, 2000, 1000]);

    // oldest capture has no predecessor
    assert_eq!(captures[2].percent_difference, 0.0);
    assert!(!captures[2].changed);

    // 2000 is identical to 1000
    assert_eq!(captures[1].percent_difference, 0.0);
    assert!(!captures[1].changed);

    // 3000 appended four words to four shared ones: 4 of 8 tokens
    assert!(
        (captures[0].percent_difference - 50.0).abs() < f64::EPSILON,
        "got {}",
        captures[0].percent_difference
    );
    assert!(captures[0].changed);
}

#[tokio::test]
async fn test_capture_without_primary_document_reports_zero() {
    let (_temp_dir, index) = test_index();
    let domain = "example.com";

    write_primary(index.store(), domain, 1000, "hello world").await;
    // capture 2000 exists but has no primary document
    let stray = index.store().resolve_path(domain, 2000, "assets/app.js");
    index.store().save(&stray, b"console.log(1)").await.unwrap();

    let captures = index.list_captures(domain).await.unwrap();
    assert_eq!(captures.len(), 2);
    assert_eq!(captures[0].percent_difference, 0.0);
    assert!(!captures[0].changed);
}

#[tokio::test]
async fn test_get_capture_found_and_missing() {
    let (_temp_dir, index) = test_index();
    write_primary(index.store(), "example.com", 500, "hi").await;

    let found = index.get_capture("example.com", 500).await.unwrap();
    assert_eq!(found.unwrap().capture_id, 500);
    assert!(index.get_capture("example.com", 501).await.unwrap().is_none());
}

// ============================================================================
// Staleness
// ============================================================================

#[tokio::test]
async fn test_needs_refresh_for_unknown_domain() {
    let (_temp_dir, index) = test_index();
    assert!(index
        .needs_refresh("nosuch.example", DEFAULT_REFRESH_AFTER)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_needs_refresh_for_old_and_fresh_captures() {
    let (_temp_dir, index) = test_index();
    let domain = "example.com";

    // a capture from the epoch is long stale
    write_primary(index.store(), domain, 1000, "old").await;
    assert!(index
        .needs_refresh(domain, DEFAULT_REFRESH_AFTER)
        .await
        .unwrap());

    // a capture from a second ago is fresh
    let recent = chrono::Utc::now().timestamp_millis() - 1000;
    write_primary(index.store(), domain, recent, "new").await;
    assert!(!index
        .needs_refresh(domain, DEFAULT_REFRESH_AFTER)
        .await
        .unwrap());

    // unless the threshold is zero
    assert!(index.needs_refresh(domain, Duration::ZERO).await.unwrap());
}
