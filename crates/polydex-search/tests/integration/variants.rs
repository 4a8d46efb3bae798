//! Integration tests for staged and partitioned searches.

use polydex_core::{PolydexConfig, Stage};
use polydex_plan::{PartitionChoice, QueryOptions};
use polydex_search::SearchRequest;

use crate::common::{TestHarness, ids, seeded, titles};

async fn staged() -> TestHarness {
    let harness = TestHarness::new();
    harness.seed("Article", 1, &[("Title", "Launch plan")]);
    harness.publish("Article", 1);
    harness.seed("Article", 1, &[("Title", "Launch plan revised")]);
    harness.seed("Article", 2, &[("Title", "Unpublished launch")]);
    harness.refresh_all().await;
    harness
}

fn published() -> QueryOptions {
    QueryOptions {
        stage: Some(Stage::Published),
        ..Default::default()
    }
}

// ----------------------------------------------------------------------------
// Staging
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_published_view_reads_live_indexes() {
    let harness = staged().await;
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "launch").with_options(published()))
        .await
        .unwrap();

    assert_eq!(ids(&result), vec![1]);
    assert!(result.indexes.iter().all(|name| name.contains("Live")));
    assert!(result.indexes.contains(&"ArticleLiveDelta".to_string()));
}

#[tokio::test]
async fn test_draft_view_sees_unpublished_rows() {
    let harness = staged().await;
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "launch"))
        .await
        .unwrap();

    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 2]);
    assert!(!result.indexes.iter().any(|name| name.contains("Live")));

    let revised = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "revised").with_options(published()))
        .await
        .unwrap();
    assert!(revised.matches.is_empty());
}

#[tokio::test]
async fn test_ambient_stage_from_config() {
    let harness = TestHarness::with_config(PolydexConfig {
        ambient_stage: Stage::Published,
        ..Default::default()
    });
    harness.seed("Article", 1, &[("Title", "Launch plan")]);
    harness.publish("Article", 1);
    harness.seed("Article", 2, &[("Title", "Unpublished launch")]);
    harness.refresh_all().await;

    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "launch"))
        .await
        .unwrap();
    assert_eq!(titles(&result), vec!["Launch plan"]);
}

// ----------------------------------------------------------------------------
// Partitions
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_ambient_partition_sees_shared_rows_only() {
    let harness = seeded().await;
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Shop"], "shop"))
        .await
        .unwrap();
    assert_eq!(ids(&result), vec![1]);
}

#[tokio::test]
async fn test_partition_sees_own_and_shared_rows() {
    let harness = seeded().await;
    let options = QueryOptions {
        partition: Some(PartitionChoice::Only(3)),
        ..Default::default()
    };
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Shop"], "shop").with_options(options))
        .await
        .unwrap();

    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 2]);
}

#[tokio::test]
async fn test_all_partitions() {
    let harness = seeded().await;
    let options = QueryOptions {
        partition: Some(PartitionChoice::All),
        ..Default::default()
    };
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Shop"], "shop").with_options(options))
        .await
        .unwrap();
    assert_eq!(result.total, 3);
}

#[tokio::test]
async fn test_unpartitioned_types_unaffected() {
    let harness = seeded().await;
    let options = QueryOptions {
        partition: Some(PartitionChoice::Only(7)),
        ..Default::default()
    };
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "gardening").with_options(options))
        .await
        .unwrap();
    assert_eq!(ids(&result), vec![4]);
}
