//! Integration tests for string sorts refined past the packed key.

use polydex_search::{SearchRequest, SortField};

use crate::common::{TestHarness, titles};

/// Five titles tied on the packed key, seeded so that id order disagrees
/// with title order, between one earlier and one later title.
async fn tied_titles() -> TestHarness {
    let harness = TestHarness::new();
    let rows = [
        (1, "topicae"),
        (2, "topicac"),
        (3, "topicaa"),
        (4, "topicad"),
        (5, "topicab"),
        (6, "alpha"),
        (7, "zulu"),
    ];
    for (id, title) in rows {
        harness.seed("Article", id, &[("Title", title)]);
    }
    harness.refresh_all().await;
    harness
}

#[tokio::test]
async fn test_tied_page_sorted_by_full_value() {
    let harness = tied_titles().await;
    let request = SearchRequest::new(["Article"], "")
        .exact_types()
        .sort_by(vec![SortField::asc("Title")])
        .page(0, 5)
        .start(1);

    let result = harness.coordinator().search(&request).await.unwrap();
    assert_eq!(result.total, 7);
    assert_eq!(
        titles(&result),
        vec!["topicaa", "topicab", "topicac", "topicad", "topicae"]
    );
}

#[tokio::test]
async fn test_page_straddling_tie_group() {
    let harness = tied_titles().await;
    let request = SearchRequest::new(["Article"], "")
        .exact_types()
        .sort_by(vec![SortField::asc("Title")])
        .page(0, 3);

    let first = harness.coordinator().search(&request).await.unwrap();
    assert_eq!(titles(&first), vec!["alpha", "topicaa", "topicab"]);

    let second = harness
        .coordinator()
        .search(&request.clone().page(1, 3))
        .await
        .unwrap();
    assert_eq!(titles(&second), vec!["topicac", "topicad", "topicae"]);
}

#[tokio::test]
async fn test_descending_sort_refined() {
    let harness = tied_titles().await;
    let request = SearchRequest::new(["Article"], "")
        .exact_types()
        .sort_by(vec![SortField::desc("Title")])
        .page(0, 7);

    let result = harness.coordinator().search(&request).await.unwrap();
    assert_eq!(
        titles(&result),
        vec!["zulu", "topicae", "topicad", "topicac", "topicab", "topicaa", "alpha"]
    );
}

#[tokio::test]
async fn test_refinement_skipped_over_row_cap() {
    let harness = TestHarness::with_config(polydex_core::PolydexConfig {
        refine_row_cap: 2,
        ..Default::default()
    });
    for (id, title) in [(1, "topicab"), (2, "topicaa"), (3, "topicac")] {
        harness.seed("Article", id, &[("Title", title)]);
    }
    harness.seed("Article", 4, &[("Title", "zulu")]);
    harness.refresh_all().await;

    let request = SearchRequest::new(["Article"], "")
        .exact_types()
        .sort_by(vec![SortField::asc("Title")])
        .page(0, 2);
    let result = harness.coordinator().search(&request).await.unwrap();
    assert_eq!(titles(&result), vec!["topicab", "topicaa"]);
}
