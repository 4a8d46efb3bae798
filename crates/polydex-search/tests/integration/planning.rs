//! Integration tests for index planning over the shared test registry.

use polydex_core::{GlobalDocumentId, partition_id};
use polydex_plan::VariantKind;

use crate::common::TestHarness;

#[test]
fn test_same_signature_descendant_shares_ancestor_index() {
    let harness = TestHarness::new();
    let plan = harness
        .planner
        .plan(Some(&["Article", "NewsArticle"]))
        .unwrap();

    let article = plan
        .iter()
        .find(|index| index.name() == "Article")
        .expect("Article index planned");
    assert_eq!(article.member_types, vec!["Article", "NewsArticle"]);
    assert!(!plan.iter().any(|index| index.name() == "NewsArticle"));
}

#[test]
fn test_extra_field_splits_index() {
    let harness = TestHarness::new();
    let plan = harness
        .planner
        .plan(Some(&["Article", "SpecialArticle"]))
        .unwrap();

    let names: Vec<String> = plan.iter().map(|index| index.name()).collect();
    assert_eq!(names, vec!["Article", "SpecialArticle"]);
    assert_ne!(
        harness.planner.signature("Article"),
        harness.planner.signature("SpecialArticle")
    );
    assert_eq!(
        harness.planner.signature("Article"),
        harness.planner.signature("NewsArticle")
    );
}

#[test]
fn test_global_id_round_trip() {
    let id = GlobalDocumentId::encode(3023971265, 42);
    assert_eq!(id.decode(), (3023971265, 42));
    assert_eq!(id.partition(), 3023971265);
    assert_eq!(id.local_id(), 42);
}

#[test]
fn test_physical_indexes_cover_every_variant() {
    let harness = TestHarness::new();
    let names: Vec<String> = harness
        .planner
        .physical_indexes(None)
        .unwrap()
        .iter()
        .map(|index| index.name())
        .collect();

    for expected in [
        "Article",
        "ArticleDelta",
        "ArticleLive",
        "ArticleLiveDelta",
        "SpecialArticle",
        "SpecialArticleDelta",
        "SpecialArticleLive",
        "SpecialArticleLiveDelta",
        "Shop",
        "ShopDelta",
    ] {
        assert!(names.contains(&expected.to_string()), "missing {expected}");
    }
    assert!(!names.contains(&"ShopLive".to_string()));
}

#[test]
fn test_indexes_for_type_follow_membership() {
    let harness = TestHarness::new();
    let indexes = harness.planner.indexes_for_type("NewsArticle").unwrap();
    assert!(indexes.iter().all(|index| index.base_type == "Article"));
    assert_eq!(
        indexes
            .iter()
            .filter(|index| index.kind() == VariantKind::Primary)
            .count(),
        1
    );
}

#[test]
fn test_partitioned_index_carries_partition_field() {
    let harness = TestHarness::new();
    let fields = harness.planner.fields("Shop");
    assert!(fields.iter().any(|f| f.name == "partition_id" && f.filterable));
    assert!(
        !harness
            .planner
            .fields("Article")
            .iter()
            .any(|f| f.name == "partition_id")
    );
}

#[test]
fn test_check_passes_without_collisions() {
    let harness = TestHarness::new();
    harness.planner.check().unwrap();
    assert_ne!(partition_id("Article"), partition_id("Shop"));
}
