//! Integration tests for "did you mean" suggestions.

use std::sync::Arc;

use polydex_core::PolydexConfig;
use polydex_search::SearchRequest;

use crate::common::{Dictionary, TestHarness};

async fn greetings(config: PolydexConfig) -> TestHarness {
    let harness = TestHarness::with_config(config);
    harness.seed("Article", 1, &[("Title", "hello world")]);
    harness.seed("Article", 2, &[("Title", "hello there world")]);
    harness.seed("Article", 3, &[("Title", "help wanted")]);
    harness.refresh_all().await;
    harness
}

fn speller() -> Arc<Dictionary> {
    Arc::new(Dictionary::new(&[
        ("helo", &["help", "hello"]),
        ("wrld", &["world"]),
    ]))
}

#[tokio::test]
async fn test_misspelled_query_gets_suggestion() {
    let harness = greetings(PolydexConfig::default()).await;
    let coordinator = harness.coordinator().with_speller(speller());

    let result = coordinator
        .search(&SearchRequest::new(["Article"], "helo wrld").with_suggestions())
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    let suggestion = result.suggestion.expect("suggestion offered");
    assert_eq!(suggestion.text, "hello world");
    assert_eq!(
        suggestion.html,
        "<strong>hello</strong> <strong>world</strong>"
    );
    assert_eq!(suggestion.total, 2);
}

#[tokio::test]
async fn test_no_suggestion_unless_requested() {
    let harness = greetings(PolydexConfig::default()).await;
    let coordinator = harness.coordinator().with_speller(speller());

    let result = coordinator
        .search(&SearchRequest::new(["Article"], "helo wrld"))
        .await
        .unwrap();
    assert!(result.suggestion.is_none());
}

#[tokio::test]
async fn test_no_suggestion_above_threshold() {
    let harness = greetings(PolydexConfig {
        suggestion_threshold: 1,
        ..Default::default()
    })
    .await;
    let coordinator = harness.coordinator().with_speller(speller());

    let result = coordinator
        .search(&SearchRequest::new(["Article"], "hello").with_suggestions())
        .await
        .unwrap();
    assert_eq!(result.total, 2);
    assert!(result.suggestion.is_none());
}

#[tokio::test]
async fn test_no_suggestion_without_speller() {
    let harness = greetings(PolydexConfig::default()).await;
    let result = harness
        .coordinator()
        .search(&SearchRequest::new(["Article"], "helo wrld").with_suggestions())
        .await
        .unwrap();
    assert!(result.suggestion.is_none());
}
