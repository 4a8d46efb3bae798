//! Integration tests for query coordination.

use polydex_core::PolydexConfig;
use polydex_plan::{CLASS_ID_ATTR, QueryOptions};
use polydex_search::{Error, SearchRequest};

use crate::common::{TestHarness, ids, seeded, titles};

#[tokio::test]
async fn test_search_spans_shared_and_split_indexes() {
    let harness = seeded().await;
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "rust"))
        .await
        .unwrap();

    assert_eq!(result.total, 3);
    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 2, 3]);
    assert_eq!(
        result.indexes,
        vec!["Article", "SpecialArticle", "ArticleDelta", "SpecialArticleDelta"]
    );
}

#[tokio::test]
async fn test_exact_type_restricts_shared_index() {
    let harness = seeded().await;
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "rust").exact_types())
        .await
        .unwrap();

    assert_eq!(ids(&result), vec![1]);
    assert!(result.records().all(|r| r.type_name == "Article"));
}

#[tokio::test]
async fn test_descendant_type_alone() {
    let harness = seeded().await;
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["NewsArticle"], "rust"))
        .await
        .unwrap();

    assert_eq!(titles(&result), vec!["Rust release news"]);
    assert_eq!(result.indexes, vec!["Article", "ArticleDelta"]);
}

#[tokio::test]
async fn test_numeric_filters() {
    let harness = seeded().await;
    let options = QueryOptions::default().require("Rating", 5u64).require("Rating", 4u64);
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "rust").with_options(options))
        .await
        .unwrap();
    let mut found = ids(&result);
    found.sort_unstable();
    assert_eq!(found, vec![1, 3]);

    let options = QueryOptions::default().exclude(CLASS_ID_ATTR, "NewsArticle");
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "release").with_options(options))
        .await
        .unwrap();
    assert!(result.matches.is_empty());
}

#[tokio::test]
async fn test_deleted_record_dropped_from_page() {
    let harness = seeded().await;
    assert!(harness.store.remove("Article", 1).unwrap());

    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "ownership"))
        .await
        .unwrap();
    assert!(result.matches.is_empty());
    assert_eq!(result.total, 1);
}

#[tokio::test]
async fn test_unbuilt_index_error_escalated() {
    let harness = TestHarness::new();
    harness.seed("Article", 1, &[("Title", "Never indexed")]);

    let err = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "indexed"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Escalated {
            severity: "error",
            ..
        }
    ));
    assert!(err.to_string().contains("unknown local index"));
}

#[tokio::test]
async fn test_unbuilt_index_error_recorded_when_not_raised() {
    let harness = TestHarness::with_config(PolydexConfig {
        raise_on_error: false,
        ..Default::default()
    });
    harness.seed("Article", 1, &[("Title", "Never indexed")]);

    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "indexed"))
        .await
        .unwrap();
    assert!(result.matches.is_empty());
    assert!(result.error.unwrap().contains("ArticleDelta"));
}

#[tokio::test]
async fn test_unsupported_sort_clause_warns() {
    let harness = TestHarness::with_config(PolydexConfig {
        raise_on_warning: true,
        ..Default::default()
    });
    harness.seed("Article", 1, &[("Title", "Rust")]);
    harness.refresh_all().await;

    let err = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "rust").sort_by_expression("RAND()"))
        .await
        .unwrap_err();
    let result = err.result().expect("escalated result");
    assert_eq!(ids(result), vec![1]);
    assert!(result.warning.as_deref().unwrap().contains("RAND()"));
}
