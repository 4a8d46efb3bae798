//! Integration tests for write tracking and index refreshes.

use polydex_search::{RefreshBatch, SearchRequest};

use crate::common::{TestHarness, ids, seeded, titles};

async fn count(harness: &TestHarness, query: &str) -> usize {
    harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], query))
        .await
        .unwrap()
        .total
}

#[tokio::test]
async fn test_written_row_hidden_until_delta_refresh() {
    let harness = seeded().await;
    let mut batch = RefreshBatch::new();

    harness
        .write("Article", 1, &[("Title", "Rust borrowing"), ("Rating", "5")], &mut batch)
        .await;

    assert_eq!(count(&harness, "borrowing").await, 0);
    assert_eq!(count(&harness, "ownership").await, 0);
    assert_eq!(batch.names(), vec!["ArticleDelta", "ArticleLiveDelta"]);

    let report = harness.maintainer.flush(&mut batch).await.unwrap().unwrap();
    assert!(!report.failed);
    assert!(report.dictionary_rebuilt);
    assert!(batch.is_empty());

    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "borrowing"))
        .await
        .unwrap();
    assert_eq!(ids(&result), vec![1]);
    assert_eq!(titles(&result), vec!["Rust borrowing"]);
    assert_eq!(count(&harness, "ownership").await, 0);
}

#[tokio::test]
async fn test_unwritten_rows_stay_visible() {
    let harness = seeded().await;
    let mut batch = RefreshBatch::new();
    harness
        .write("NewsArticle", 2, &[("Title", "Rust release notes")], &mut batch)
        .await;

    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "rust"))
        .await
        .unwrap();
    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 3]);
}

#[tokio::test]
async fn test_write_clears_stale_flag() {
    let harness = seeded().await;
    assert!(harness.db.flag("Article", 3));

    let mut batch = RefreshBatch::new();
    harness
        .write("SpecialArticle", 3, &[("Title", "Special rust")], &mut batch)
        .await;

    assert!(!harness.db.flag("Article", 3));
    assert!(!harness.db.flag("Article_Live", 3));
    assert_eq!(
        batch.names(),
        vec!["SpecialArticleDelta", "SpecialArticleLiveDelta"]
    );
    assert!(
        harness
            .db
            .statements()
            .iter()
            .all(|s| s.contains("`primary_indexed` = 0"))
    );
}

#[tokio::test]
async fn test_full_refresh_folds_delta_into_primary() {
    let harness = seeded().await;
    let mut batch = RefreshBatch::new();
    harness
        .write("Article", 4, &[("Title", "Gardening tools")], &mut batch)
        .await;
    harness.maintainer.flush(&mut batch).await.unwrap();
    assert_eq!(harness.engine.documents("ArticleDelta").unwrap().len(), 1);

    harness.refresh_all().await;
    assert!(harness.engine.documents("ArticleDelta").unwrap().is_empty());
    assert_eq!(count(&harness, "tools").await, 1);
}

#[tokio::test]
async fn test_suspended_writes_untracked_until_resume() {
    let harness = seeded().await;
    harness.maintainer.suspend();
    assert!(harness.maintainer.is_suspended());

    let mut batch = RefreshBatch::new();
    harness
        .write("Article", 1, &[("Title", "Bulk import")], &mut batch)
        .await;
    assert!(batch.is_empty());
    assert!(harness.maintainer.flush(&mut batch).await.unwrap().is_none());

    let report = harness.maintainer.resume().await.unwrap();
    assert!(!harness.maintainer.is_suspended());
    assert!(report.indexes.contains(&"Shop".to_string()));
    assert_eq!(count(&harness, "bulk").await, 1);
}

#[tokio::test]
async fn test_indexer_error_skips_dictionary() {
    let harness = seeded().await;
    let dictionaries = harness.indexer.dictionaries.lock().unwrap().len();

    let report = harness
        .maintainer
        .refresh_indexes(Some(&["Missing".to_string()]))
        .await
        .unwrap();
    assert!(report.failed);
    assert!(!report.dictionary_rebuilt);
    assert_eq!(harness.indexer.dictionaries.lock().unwrap().len(), dictionaries);
}
