//! Property-based tests for planning.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use polydex_core::PolydexConfig;

    use crate::planner::IndexPlanner;
    use crate::test_support::registry;

    fn all_types() -> Vec<&'static str> {
        vec!["SearchBase", "DescendantA", "DescendantB", "Plain", "Shop", "FeedDoc"]
    }

    proptest! {
        #[test]
        fn plan_ignores_input_order(order in Just(all_types()).prop_shuffle()) {
            let config = PolydexConfig::default();
            let expected = IndexPlanner::new(registry(), &config).plan(None).unwrap();
            let planned = IndexPlanner::new(registry(), &config)
                .plan(Some(order.as_slice()))
                .unwrap();
            prop_assert_eq!(planned, expected);
        }

        #[test]
        fn shared_index_named_after_most_ancestral_member(
            order in Just(vec!["DescendantA", "SearchBase"]).prop_shuffle()
        ) {
            let planner = IndexPlanner::new(registry(), &PolydexConfig::default());
            let plan = planner.plan(Some(order.as_slice())).unwrap();
            let holder: Vec<_> = plan
                .iter()
                .filter(|index| index.contains_type("DescendantA"))
                .collect();
            prop_assert_eq!(holder.len(), 1);
            prop_assert_eq!(holder[0].base_type.as_str(), "SearchBase");
            prop_assert!(holder[0].contains_type("SearchBase"));
        }
    }
}
