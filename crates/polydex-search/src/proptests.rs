//! Property-based tests for sort refinement.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use crate::refine::SortRefiner;
    use crate::refine::tests::{FullList, hit, title_key, titles};

    /// Titles over a tiny alphabet behind a shared four-byte prefix, so most
    /// rows tie on their packed key.
    fn title() -> impl Strategy<Value = String> {
        ("(long|lone|zzzz)", "[ab]{0,3}").prop_map(|(prefix, tail)| format!("{prefix}{tail}"))
    }

    proptest! {
        #[test]
        fn refined_page_matches_true_sort(
            raw in prop::collection::vec(title(), 1..24),
            offset_seed in any::<usize>(),
            size in 1usize..8,
        ) {
            let hits = raw
                .iter()
                .enumerate()
                .map(|(i, t)| hit(i as u32 + 1, t))
                .collect();
            let list = FullList::new(hits);
            let total = raw.len();
            let offset = offset_seed % total;

            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let refined = runtime.block_on(
                SortRefiner::new(100).refine(list.page(offset, size), total, &title_key(), &list),
            );

            let expected = list.sorted_titles(offset, size);
            prop_assert_eq!(titles(&refined), expected.iter().map(String::as_str).collect::<Vec<_>>());
        }
    }
}
