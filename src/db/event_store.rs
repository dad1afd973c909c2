//! Event store abstraction
//!
//! The recommendation core only reads interaction events through this trait, so the
//! PostgreSQL adapter and the in-memory adapter are interchangeable. Implementations
//! are injected per request; none of them hold per-call state.

use crate::{
    error::AppResult,
    models::{EventQuery, InteractionEvent, ItemId},
};

/// Read-only access to recorded views and purchases
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// True if the item appears in at least one view or purchase
    async fn item_exists(&self, item_id: ItemId) -> AppResult<bool>;

    /// Checks several items at once
    ///
    /// Returns whether every requested item exists, plus the existing ones in request
    /// order. An empty request yields `(false, [])`.
    async fn items_exist(&self, item_ids: &[ItemId]) -> AppResult<(bool, Vec<ItemId>)>;

    /// Fetches events matching the query, ordered by session, timestamp and item
    async fn query_events(&self, query: &EventQuery) -> AppResult<Vec<InteractionEvent>>;

    /// Up to `count` distinct items that have any recorded event
    ///
    /// The SQL adapter samples at random; other adapters may choose deterministically.
    async fn sample_items(&self, count: usize) -> AppResult<Vec<ItemId>>;

    /// Verifies the store is reachable
    async fn ping(&self) -> AppResult<()>;

    /// Adapter name for logging
    fn name(&self) -> &'static str;
}
