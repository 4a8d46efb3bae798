//! "Did you mean" suggestions.
//!
//! Each word of a losing query is sent to a [`SpellingSource`]; every
//! combination of the returned candidates is substituted back into the query
//! and re-run, and the rewrite with the most matches wins if it beats the
//! original.

use async_trait::async_trait;
use polydex_core::Result;

use crate::types::Suggestion;

/// Upper bound on the rewrites tried for one query.
pub const MAX_COMBINATIONS: usize = 256;

/// Word-level correction candidates.
pub trait SpellingSource: Send + Sync {
    /// Up to `limit` corrections of `word`, best first. A correctly spelled
    /// word has none.
    fn suggest(&self, word: &str, limit: usize) -> Vec<String>;
}

/// Re-runs the original search with different query text.
#[async_trait]
pub trait RerunSearch: Send + Sync {
    /// Total matches of `query`.
    async fn total(&self, query: &str) -> Result<usize>;
}

/// Finds the best-matching spelling correction of a query.
#[derive(Debug, Clone, Copy)]
pub struct SpellingSuggester {
    max_candidates: usize,
}

/// A word of the query and where it sits.
#[derive(Debug)]
struct Word<'a> {
    start: usize,
    text: &'a str,
}

impl SpellingSuggester {
    /// Suggester asking for up to `max_candidates` corrections per word.
    pub fn new(max_candidates: usize) -> Self {
        Self { max_candidates }
    }

    /// The best rewrite of `query`, if one matches more than `total` rows.
    pub async fn suggest(
        &self,
        query: &str,
        total: usize,
        source: &dyn SpellingSource,
        rerun: &dyn RerunSearch,
    ) -> Option<Suggestion> {
        let words = words(query);

        let mut choices: Vec<(&str, Vec<String>)> = Vec::new();
        for word in &words {
            if choices.iter().any(|(w, _)| *w == word.text) {
                continue;
            }
            let candidates: Vec<String> = source
                .suggest(word.text, self.max_candidates)
                .into_iter()
                .filter(|c| c != word.text)
                .take(self.max_candidates)
                .collect();
            if !candidates.is_empty() {
                choices.push((word.text, candidates));
            }
        }
        if choices.is_empty() {
            return None;
        }

        let mut best: Option<(usize, Vec<usize>)> = None;
        let mut best_total = total;
        for (tried, combination) in combinations(&choices).enumerate() {
            if tried == MAX_COMBINATIONS {
                log::debug!("Stopped after {MAX_COMBINATIONS} spelling rewrites of '{query}'");
                break;
            }
            let (text, _) = rewrite(query, &words, &choices, &combination);
            match rerun.total(&text).await {
                Ok(count) if count > best_total => {
                    best_total = count;
                    best = Some((count, combination));
                }
                Ok(_) => {}
                Err(e) => log::warn!("Spelling rerun of '{text}' failed: {e}"),
            }
        }

        let (total, combination) = best?;
        let (text, html) = rewrite(query, &words, &choices, &combination);
        Some(Suggestion { text, html, total })
    }
}

fn words(query: &str) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    let mut start = None;
    for (i, c) in query.char_indices() {
        match (c.is_alphabetic(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                words.push(Word {
                    start: s,
                    text: &query[s..i],
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        words.push(Word {
            start: s,
            text: &query[s..],
        });
    }
    words
}

/// Every pick of one candidate per word, as candidate indexes.
fn combinations(choices: &[(&str, Vec<String>)]) -> impl Iterator<Item = Vec<usize>> {
    let sizes: Vec<usize> = choices.iter().map(|(_, c)| c.len()).collect();
    let count = sizes.iter().fold(1usize, |n, &size| n.saturating_mul(size));
    (0..count).map(move |mut n| {
        let mut pick = vec![0; sizes.len()];
        for (slot, size) in pick.iter_mut().zip(&sizes).rev() {
            *slot = n % size;
            n /= size;
        }
        pick
    })
}

/// Plain and marked query text with the picked candidates substituted.
fn rewrite(
    query: &str,
    words: &[Word<'_>],
    choices: &[(&str, Vec<String>)],
    pick: &[usize],
) -> (String, String) {
    let mut text = String::with_capacity(query.len());
    let mut html = String::with_capacity(query.len() + 32);
    let mut at = 0;
    for word in words {
        let replacement = choices
            .iter()
            .zip(pick)
            .find(|((w, _), _)| *w == word.text)
            .map(|((_, candidates), &i)| candidates[i].as_str());
        let Some(replacement) = replacement else {
            continue;
        };
        text.push_str(&query[at..word.start]);
        html.push_str(&query[at..word.start]);
        text.push_str(replacement);
        html.push_str("<strong>");
        html.push_str(replacement);
        html.push_str("</strong>");
        at = word.start + word.text.len();
    }
    text.push_str(&query[at..]);
    html.push_str(&query[at..]);
    (text, html)
}

// ============================================================================
// Tests
// ============================================================================
