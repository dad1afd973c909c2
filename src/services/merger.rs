use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use crate::{
    models::{ItemId, ScoredItem, SessionId},
    services::signals::CandidateTally,
};

/// Composite weight per co-purchase event
pub const CO_PURCHASE_WEIGHT: f64 = 2.0;
/// Composite weight per distinct session the candidate appeared in
pub const UNIQUE_SESSION_WEIGHT: f64 = 1.5;
/// Composite weight per purchase following a seed view
pub const VIEW_TO_PURCHASE_WEIGHT: f64 = 3.0;

/// Sums scores per item across lists
///
/// Output is ordered by descending score. Equal scores keep the order in which the
/// item was first encountered across the concatenated lists. No limit is applied.
pub fn merge(lists: &[Vec<ScoredItem>]) -> Vec<ScoredItem> {
    merge_weighted(lists.iter().map(|list| (1.0, list.as_slice())))
}

/// Same as [`merge`], with each list's scores scaled by its weight first
pub fn merge_weighted<'a, I>(lists: I) -> Vec<ScoredItem>
where
    I: IntoIterator<Item = (f64, &'a [ScoredItem])>,
{
    let mut merged: Vec<ScoredItem> = Vec::new();
    let mut positions: HashMap<ItemId, usize> = HashMap::new();

    for (weight, list) in lists {
        for item in list {
            let score = item.score * weight;
            match positions.get(&item.item_id) {
                Some(&index) => merged[index].score += score,
                None => {
                    positions.insert(item.item_id, merged.len());
                    merged.push(ScoredItem::new(item.item_id, score));
                }
            }
        }
    }

    // sort_by is stable, so first-seen order survives among equal scores
    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged
}

struct CompositeEntry {
    item_id: ItemId,
    co_purchases: u64,
    view_to_purchases: u64,
    sessions: BTreeSet<SessionId>,
    last_seen: Option<DateTime<Utc>>,
}

impl CompositeEntry {
    fn score(&self) -> f64 {
        self.co_purchases as f64 * CO_PURCHASE_WEIGHT
            + self.sessions.len() as f64 * UNIQUE_SESSION_WEIGHT
            + self.view_to_purchases as f64 * VIEW_TO_PURCHASE_WEIGHT
    }
}

/// Combines co-purchase and view-to-purchase tallies into one weighted score
///
/// Ties are broken by the most recent interaction, candidates without a timestamp
/// last, then by first-seen order.
pub fn composite(
    co_purchase: &[CandidateTally],
    view_to_purchase: &[CandidateTally],
) -> Vec<ScoredItem> {
    let mut entries: Vec<CompositeEntry> = Vec::new();
    let mut positions: HashMap<ItemId, usize> = HashMap::new();

    let tagged = co_purchase
        .iter()
        .map(|t| (t, true))
        .chain(view_to_purchase.iter().map(|t| (t, false)));

    for (tally, is_co_purchase) in tagged {
        let index = *positions.entry(tally.item_id).or_insert_with(|| {
            entries.push(CompositeEntry {
                item_id: tally.item_id,
                co_purchases: 0,
                view_to_purchases: 0,
                sessions: BTreeSet::new(),
                last_seen: None,
            });
            entries.len() - 1
        });

        let entry = &mut entries[index];
        if is_co_purchase {
            entry.co_purchases += tally.count;
        } else {
            entry.view_to_purchases += tally.count;
        }
        entry.sessions.extend(tally.sessions.iter().copied());
        entry.last_seen = entry.last_seen.max(tally.last_seen);
    }

    let mut scored: Vec<(ScoredItem, Option<DateTime<Utc>>)> = entries
        .iter()
        .map(|e| (ScoredItem::new(e.item_id, e.score()), e.last_seen))
        .collect();

    // Option orders None below Some, so descending puts undated candidates last
    scored.sort_by(|(a, a_seen), (b, b_seen)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b_seen.cmp(a_seen))
    });

    scored.into_iter().map(|(item, _)| item).collect()
}
