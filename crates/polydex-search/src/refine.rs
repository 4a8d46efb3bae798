//! Exact ordering of pages sorted on packed string keys.
//!
//! The engine sorts string fields by a packed key holding their first four
//! bytes, so rows sharing a packed key come back in engine order instead of
//! true order. Runs of such ties that lie entirely inside the page are
//! sorted in memory. A run touching either page edge may continue on a
//! neighbouring page, so the whole tie group is fetched with one probe per
//! edge (at most two), sorted, and the page's share of it spliced in.
//!
//! ```text
//!   engine order   ... x3 x1 | x2 y1 y3 z1 z2 | z4 z3 ...
//!                            └─ page ─────────┘
//!   probe x  ──► x1 x2 x3 (sorted) ──► page takes the tail: x3
//!   probe z  ──► z1 z2 z3 z4       ──► page takes the head: z1 z2
//!   y1 y3 lie inside the page      ──► sorted in memory
//! ```
//!
//! Refinement never fails a search: a probe that errors or whose tie group
//! exceeds the row cap leaves that part of the page in engine order.

use std::cmp::Ordering;

use async_trait::async_trait;
use polydex_core::Result;

use crate::types::Hit;

/// One key of a field sort as seen by the refiner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKeyField {
    /// Record field holding the true value.
    pub name: String,
    /// Engine attribute the engine sorted by.
    pub attribute: String,
    /// Whether `attribute` is a lossy packed key of a string field.
    pub packed: bool,
    /// Sort descending.
    pub descending: bool,
}

/// A tie group fetched by a probe.
#[derive(Debug, Clone, Default)]
pub struct TieGroup {
    /// Resolved rows, in engine order.
    pub hits: Vec<Hit>,
    /// Rows the engine matched, including any beyond the limit.
    pub total: usize,
}

/// Re-runs the refined search restricted to one approximate key.
#[async_trait]
pub trait TieProbe: Send + Sync {
    /// Rows whose engine attributes equal `key`, at most `limit` of them.
    async fn probe(&self, key: &[(String, u64)], limit: usize) -> Result<TieGroup>;
}

/// Restores exact order of field-sorted pages.
#[derive(Debug, Clone, Copy)]
pub struct SortRefiner {
    row_cap: usize,
}

impl SortRefiner {
    /// Refiner whose probes fetch at most `row_cap` rows.
    pub fn new(row_cap: usize) -> Self {
        Self { row_cap }
    }

    /// Row cap of each probe.
    pub fn row_cap(&self) -> usize {
        self.row_cap
    }

    /// Refine one page. `total` is the engine's match count for the search,
    /// less any hits dropped from `page` as unresolvable.
    pub async fn refine(
        &self,
        mut page: Vec<Hit>,
        total: usize,
        fields: &[SortKeyField],
        probe: &dyn TieProbe,
    ) -> Vec<Hit> {
        if page.is_empty() || !fields.iter().any(|f| f.packed) {
            return page;
        }

        if page.len() >= total {
            page.sort_by(|a, b| compare_true(fields, a, b));
            return page;
        }

        let n = page.len();
        let first = approximate(fields, &page[0]);
        let last = approximate(fields, &page[n - 1]);

        if first == last {
            return match self.fetch(fields, &first, probe).await {
                Some(mut group) => {
                    let Some(at) = group.iter().position(|hit| hit.id == page[0].id) else {
                        log::debug!("Page head missing from its tie group, keeping engine order");
                        return page;
                    };
                    group.sort_by(|a, b| compare_true(fields, a, b));
                    if at + n > group.len() {
                        log::debug!("Tie group shorter than the page, keeping engine order");
                        return page;
                    }
                    group.drain(at..at + n).collect()
                }
                None => page,
            };
        }

        let leading = page
            .iter()
            .take_while(|hit| approximate(fields, hit) == first)
            .count();
        let trailing = page
            .iter()
            .rev()
            .take_while(|hit| approximate(fields, hit) == last)
            .count();

        sort_interior_runs(fields, &mut page[leading..n - trailing]);

        if let Some(mut group) = self.fetch(fields, &first, probe).await
            && group.len() >= leading
        {
            group.sort_by(|a, b| compare_true(fields, a, b));
            let tail = group.split_off(group.len() - leading);
            for (slot, hit) in page[..leading].iter_mut().zip(tail) {
                *slot = hit;
            }
        }

        if let Some(mut group) = self.fetch(fields, &last, probe).await
            && group.len() >= trailing
        {
            group.sort_by(|a, b| compare_true(fields, a, b));
            for (slot, hit) in page[n - trailing..].iter_mut().zip(group) {
                *slot = hit;
            }
        }

        page
    }

    /// The full tie group of `key`, or `None` when it cannot be trusted.
    async fn fetch(
        &self,
        fields: &[SortKeyField],
        key: &[u64],
        probe: &dyn TieProbe,
    ) -> Option<Vec<Hit>> {
        let filters: Vec<(String, u64)> = fields
            .iter()
            .zip(key)
            .map(|(field, value)| (field.attribute.clone(), *value))
            .collect();

        match probe.probe(&filters, self.row_cap).await {
            Ok(group) if group.total > self.row_cap => {
                log::debug!(
                    "Tie group of {} rows exceeds the refinement cap of {}, keeping engine order",
                    group.total,
                    self.row_cap
                );
                None
            }
            Ok(group) => Some(group.hits),
            Err(e) => {
                log::debug!("Refinement probe failed, keeping engine order: {e}");
                None
            }
        }
    }
}

/// Engine attribute values of the sort keys.
fn approximate(fields: &[SortKeyField], hit: &Hit) -> Vec<u64> {
    fields
        .iter()
        .map(|f| hit.attributes.get(&f.attribute).copied().unwrap_or(0))
        .collect()
}

/// Order by true key values.
pub(crate) fn compare_true(fields: &[SortKeyField], a: &Hit, b: &Hit) -> Ordering {
    for field in fields {
        let ordering = if field.packed {
            let left = a.record.field(&field.name).unwrap_or_default();
            let right = b.record.field(&field.name).unwrap_or_default();
            left.as_bytes().cmp(right.as_bytes())
        } else {
            let left = a.attributes.get(&field.attribute).copied().unwrap_or(0);
            let right = b.attributes.get(&field.attribute).copied().unwrap_or(0);
            left.cmp(&right)
        };
        let ordering = if field.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Sort each run of equal approximate keys in place.
fn sort_interior_runs(fields: &[SortKeyField], hits: &mut [Hit]) {
    let mut start = 0;
    while start < hits.len() {
        let key = approximate(fields, &hits[start]);
        let mut end = start + 1;
        while end < hits.len() && approximate(fields, &hits[end]) == key {
            end += 1;
        }
        hits[start..end].sort_by(|a, b| compare_true(fields, a, b));
        start = end;
    }
}

// ============================================================================
// Tests
// ============================================================================
