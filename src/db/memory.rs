use std::collections::BTreeSet;

use crate::{
    db::EventStore,
    error::AppResult,
    models::{EventQuery, InteractionEvent, ItemId},
};

/// Event store backed by an in-process list of events
///
/// Used for fixtures and tests. Events are kept sorted the same way the SQL adapter
/// returns them: by session, then timestamp, then item.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStore {
    events: Vec<InteractionEvent>,
}

impl MemoryEventStore {
    pub fn new(mut events: Vec<InteractionEvent>) -> Self {
        events.sort_by(|a, b| {
            (a.session_id, a.timestamp, a.item_id).cmp(&(b.session_id, b.timestamp, b.item_id))
        });
        Self { events }
    }

    fn known_items(&self) -> BTreeSet<ItemId> {
        self.events.iter().map(|e| e.item_id).collect()
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryEventStore {
    async fn item_exists(&self, item_id: ItemId) -> AppResult<bool> {
        Ok(self.events.iter().any(|e| e.item_id == item_id))
    }

    async fn items_exist(&self, item_ids: &[ItemId]) -> AppResult<(bool, Vec<ItemId>)> {
        if item_ids.is_empty() {
            return Ok((false, Vec::new()));
        }

        let known = self.known_items();
        let requested: BTreeSet<ItemId> = item_ids.iter().copied().collect();

        let mut found = Vec::new();
        for id in item_ids {
            if known.contains(id) && !found.contains(id) {
                found.push(*id);
            }
        }

        Ok((found.len() == requested.len(), found))
    }

    async fn query_events(&self, query: &EventQuery) -> AppResult<Vec<InteractionEvent>> {
        Ok(self
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    /// Deterministic: the `count` lowest item ids, so fixtures get stable reports
    async fn sample_items(&self, count: usize) -> AppResult<Vec<ItemId>> {
        Ok(self.known_items().into_iter().take(count).collect())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
