use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    db::EventStore,
    error::{AppError, AppResult},
    models::{EventKind, EventQuery, InteractionEvent, ItemId, ScoredItem, SessionId, Signal},
};

/// Per-candidate counters gathered by one signal
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTally {
    pub item_id: ItemId,
    /// Number of qualifying events of the candidate
    pub count: u64,
    /// Sessions in which those events occurred
    pub sessions: BTreeSet<SessionId>,
    /// Most recent qualifying event
    pub last_seen: Option<DateTime<Utc>>,
}

impl CandidateTally {
    fn new(item_id: ItemId) -> Self {
        Self {
            item_id,
            count: 0,
            sessions: BTreeSet::new(),
            last_seen: None,
        }
    }

    fn record(&mut self, event: &InteractionEvent) {
        self.count += 1;
        self.sessions.insert(event.session_id);
        self.last_seen = self.last_seen.max(Some(event.timestamp));
    }

    pub fn to_scored(&self) -> ScoredItem {
        ScoredItem::new(self.item_id, self.count as f64)
    }
}

/// Accumulates tallies and ranks them by descending count, then ascending item id
#[derive(Default)]
struct TallyBook {
    tallies: HashMap<ItemId, CandidateTally>,
}

impl TallyBook {
    fn record(&mut self, event: &InteractionEvent) {
        self.tallies
            .entry(event.item_id)
            .or_insert_with(|| CandidateTally::new(event.item_id))
            .record(event);
    }

    fn into_ranked(self) -> Vec<CandidateTally> {
        let mut ranked: Vec<CandidateTally> = self.tallies.into_values().collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.item_id.cmp(&b.item_id)));
        ranked
    }
}

/// Caps ranked tallies at `limit` and converts them to scores
pub fn into_scored(tallies: &[CandidateTally], limit: usize) -> Vec<ScoredItem> {
    tallies
        .iter()
        .take(limit)
        .map(CandidateTally::to_scored)
        .collect()
}

/// Scores candidate items for a set of seed items using one signal
///
/// Seed items never appear in the output. A seed without relevant events simply
/// contributes nothing.
pub struct SignalExtractor<'a> {
    store: &'a dyn EventStore,
    signal: Signal,
    /// Only seed events at or after this instant anchor the signal
    since: Option<DateTime<Utc>>,
}

impl<'a> SignalExtractor<'a> {
    pub fn new(store: &'a dyn EventStore, signal: Signal) -> Self {
        Self {
            store,
            signal,
            since: None,
        }
    }

    /// Restricts seed events to the `days` before `now`
    ///
    /// A window reaching past the representable date range imposes no lower bound.
    pub fn within_days(mut self, days: Option<i64>, now: DateTime<Utc>) -> Self {
        self.since = days
            .and_then(Duration::try_days)
            .and_then(|window| now.checked_sub_signed(window));
        self
    }

    /// Returns at most `limit` candidates ordered by descending count
    pub async fn score(
        &self,
        seed_item_ids: &[ItemId],
        limit: usize,
    ) -> AppResult<Vec<ScoredItem>> {
        if limit == 0 {
            return Err(AppError::InvalidInput("Limit must be positive".to_string()));
        }

        let tallies = self.tally(seed_item_ids).await?;
        Ok(into_scored(&tallies, limit))
    }

    /// Returns every candidate with its counters, ranked
    pub async fn tally(&self, seed_item_ids: &[ItemId]) -> AppResult<Vec<CandidateTally>> {
        if seed_item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ranked = match self.signal {
            Signal::CoPurchase => self.co_purchase(seed_item_ids).await?,
            Signal::ViewToPurchase => {
                self.after_seed_view(seed_item_ids, EventKind::Purchase)
                    .await?
            }
            Signal::SequentialView => {
                self.after_seed_view(seed_item_ids, EventKind::View)
                    .await?
            }
        };

        tracing::debug!(
            signal = %self.signal,
            seeds = seed_item_ids.len(),
            candidates = ranked.len(),
            "Signal extracted"
        );

        Ok(ranked)
    }

    /// Purchases of other items in sessions where a seed was purchased
    async fn co_purchase(&self, seeds: &[ItemId]) -> AppResult<Vec<CandidateTally>> {
        let seed_purchases = self
            .store
            .query_events(&EventQuery::purchases().for_items(seeds).since(self.since))
            .await?;

        let sessions: BTreeSet<SessionId> =
            seed_purchases.iter().map(|e| e.session_id).collect();
        if sessions.is_empty() {
            return Ok(Vec::new());
        }

        let purchases = self
            .store
            .query_events(&EventQuery::purchases().in_sessions(sessions.into_iter().collect()))
            .await?;

        let mut book = TallyBook::default();
        for event in purchases.iter().filter(|e| !seeds.contains(&e.item_id)) {
            book.record(event);
        }

        Ok(book.into_ranked())
    }

    /// Events of `kind` for other items strictly after the session's earliest seed view
    async fn after_seed_view(
        &self,
        seeds: &[ItemId],
        kind: EventKind,
    ) -> AppResult<Vec<CandidateTally>> {
        let seed_views = self
            .store
            .query_events(&EventQuery::views().for_items(seeds).since(self.since))
            .await?;

        let mut anchors: BTreeMap<SessionId, DateTime<Utc>> = BTreeMap::new();
        for view in &seed_views {
            anchors
                .entry(view.session_id)
                .and_modify(|t| *t = (*t).min(view.timestamp))
                .or_insert(view.timestamp);
        }
        if anchors.is_empty() {
            return Ok(Vec::new());
        }

        let events = self
            .store
            .query_events(&EventQuery::new(kind).in_sessions(anchors.keys().copied().collect()))
            .await?;

        let mut book = TallyBook::default();
        for event in &events {
            if seeds.contains(&event.item_id) {
                continue;
            }
            let follows_seed = anchors
                .get(&event.session_id)
                .is_some_and(|anchor| event.timestamp > *anchor);
            if follows_seed {
                book.record(event);
            }
        }

        Ok(book.into_ranked())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryEventStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    fn minutes(n: i64) -> DateTime<Utc> {
        t0() + Duration::minutes(n)
    }

    /// Three sessions around item 1: two view-then-buy sessions and one basket
    fn scenario_store() -> MemoryEventStore {
        MemoryEventStore::new(vec![
            InteractionEvent::view(1, 1, t0()),
            InteractionEvent::purchase(1, 2, minutes(5)),
            InteractionEvent::view(2, 1, t0()),
            InteractionEvent::purchase(2, 3, minutes(5)),
            InteractionEvent::purchase(3, 1, t0()),
            InteractionEvent::purchase(3, 3, t0()),
        ])
    }

    fn ids(items: &[ScoredItem]) -> Vec<ItemId> {
        items.iter().map(|i| i.item_id).collect()
    }

    #[tokio::test]
    async fn test_co_purchase_counts_same_session_purchases() {
        let store = scenario_store();
        let scores = SignalExtractor::new(&store, Signal::CoPurchase)
            .within_days(Some(90), minutes(60))
            .score(&[1], 5)
            .await
            .unwrap();

        assert_eq!(scores, vec![ScoredItem::new(3, 1.0)]);
    }

    #[tokio::test]
    async fn test_view_to_purchase_counts_later_purchases() {
        let store = scenario_store();
        let scores = SignalExtractor::new(&store, Signal::ViewToPurchase)
            .score(&[1], 5)
            .await
            .unwrap();

        assert_eq!(
            scores,
            vec![ScoredItem::new(2, 1.0), ScoredItem::new(3, 1.0)]
        );
    }

    #[tokio::test]
    async fn test_view_to_purchase_ignores_purchases_before_the_view() {
        let store = MemoryEventStore::new(vec![
            InteractionEvent::purchase(1, 7, t0()),
            InteractionEvent::view(1, 1, minutes(1)),
            InteractionEvent::purchase(1, 8, minutes(1)),
            InteractionEvent::purchase(1, 9, minutes(2)),
        ]);

        let scores = SignalExtractor::new(&store, Signal::ViewToPurchase)
            .score(&[1], 5)
            .await
            .unwrap();

        assert_eq!(ids(&scores), vec![9]);
    }

    #[tokio::test]
    async fn test_sequential_view_respects_recency_window() {
        let old = t0() - Duration::days(45);
        let store = MemoryEventStore::new(vec![
            InteractionEvent::view(1, 1, old),
            InteractionEvent::view(1, 4, old + Duration::minutes(1)),
            InteractionEvent::view(2, 1, t0()),
            InteractionEvent::view(2, 5, minutes(1)),
            InteractionEvent::view(2, 6, minutes(2)),
            InteractionEvent::view(3, 5, t0()),
            InteractionEvent::view(3, 1, minutes(3)),
        ]);

        let scores = SignalExtractor::new(&store, Signal::SequentialView)
            .within_days(Some(30), minutes(10))
            .score(&[1], 5)
            .await
            .unwrap();

        assert_eq!(
            scores,
            vec![ScoredItem::new(5, 1.0), ScoredItem::new(6, 1.0)]
        );
    }

    #[tokio::test]
    async fn test_co_purchase_window_applies_to_seed_purchase() {
        let store = MemoryEventStore::new(vec![
            InteractionEvent::purchase(1, 1, t0() - Duration::days(120)),
            InteractionEvent::purchase(1, 2, t0() - Duration::days(120)),
            InteractionEvent::purchase(2, 1, t0()),
            InteractionEvent::purchase(2, 3, t0()),
        ]);

        let windowed = SignalExtractor::new(&store, Signal::CoPurchase)
            .within_days(Some(90), t0())
            .score(&[1], 5)
            .await
            .unwrap();
        assert_eq!(ids(&windowed), vec![3]);

        let unbounded = SignalExtractor::new(&store, Signal::CoPurchase)
            .within_days(None, t0())
            .score(&[1], 5)
            .await
            .unwrap();
        assert_eq!(ids(&unbounded), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_out_of_range_window_has_no_lower_bound() {
        let store = MemoryEventStore::new(vec![
            InteractionEvent::purchase(1, 1, t0() - Duration::days(120)),
            InteractionEvent::purchase(1, 2, t0() - Duration::days(120)),
        ]);

        for days in [200_000_000, i64::MAX] {
            let scores = SignalExtractor::new(&store, Signal::CoPurchase)
                .within_days(Some(days), t0())
                .score(&[1], 5)
                .await
                .unwrap();
            assert_eq!(ids(&scores), vec![2]);
        }
    }

    #[tokio::test]
    async fn test_multiple_seeds_are_excluded_and_capped() {
        let store = MemoryEventStore::new(vec![
            InteractionEvent::purchase(1, 1, t0()),
            InteractionEvent::purchase(1, 2, t0()),
            InteractionEvent::purchase(1, 3, t0()),
            InteractionEvent::purchase(2, 2, t0()),
            InteractionEvent::purchase(2, 3, t0()),
            InteractionEvent::purchase(2, 4, t0()),
            InteractionEvent::purchase(3, 1, t0()),
            InteractionEvent::purchase(3, 4, t0()),
        ]);

        let scores = SignalExtractor::new(&store, Signal::CoPurchase)
            .score(&[1, 2], 2)
            .await
            .unwrap();

        assert_eq!(
            scores,
            vec![ScoredItem::new(3, 2.0), ScoredItem::new(4, 2.0)]
        );
    }

    #[tokio::test]
    async fn test_seed_without_events_yields_empty() {
        let store = scenario_store();
        for signal in Signal::ALL {
            let scores = SignalExtractor::new(&store, signal)
                .score(&[99], 5)
                .await
                .unwrap();
            assert!(scores.is_empty(), "{} should be empty", signal);
        }
    }

    #[tokio::test]
    async fn test_zero_limit_is_invalid() {
        let store = scenario_store();
        let result = SignalExtractor::new(&store, Signal::CoPurchase)
            .score(&[1], 0)
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_tally_tracks_sessions_and_last_seen() {
        let store = MemoryEventStore::new(vec![
            InteractionEvent::view(1, 1, t0()),
            InteractionEvent::purchase(1, 2, minutes(1)),
            InteractionEvent::view(2, 1, t0()),
            InteractionEvent::purchase(2, 2, minutes(9)),
        ]);

        let tallies = SignalExtractor::new(&store, Signal::ViewToPurchase)
            .tally(&[1])
            .await
            .unwrap();

        assert_eq!(tallies.len(), 1);
        assert_eq!(tallies[0].count, 2);
        assert_eq!(tallies[0].sessions.len(), 2);
        assert_eq!(tallies[0].last_seen, Some(minutes(9)));
    }
}
