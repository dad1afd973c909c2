use serde::{Deserialize, Serialize};

use super::{ItemId, ScoredItem};

/// Interaction statistics for a single item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemStats {
    pub item_id: ItemId,
    pub total_views: u64,
    pub total_purchases: u64,
    /// Share of view events whose session also purchased the item
    pub view_to_purchase_rate: f64,
    pub top_recommendation: Option<ScoredItem>,
}
