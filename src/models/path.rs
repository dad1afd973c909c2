use serde::{Deserialize, Serialize};

use super::ItemId;

/// A view sequence ending in the purchased item, with the number of sessions it occurred in
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PurchasePath {
    pub path: Vec<ItemId>,
    pub frequency: u32,
}

impl PurchasePath {
    /// The purchased item terminating the path
    pub fn purchased_item(&self) -> Option<ItemId> {
        self.path.last().copied()
    }
}
