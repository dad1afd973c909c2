use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::ItemId;

/// An item together with a score produced by one signal or a merge
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub item_id: ItemId,
    pub score: f64,
}

impl ScoredItem {
    pub fn new(item_id: ItemId, score: f64) -> Self {
        Self { item_id, score }
    }
}

/// Independent scoring strategy over session events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// Items bought in the same session as a seed item
    CoPurchase,
    /// Items bought after a seed item was viewed in the same session
    ViewToPurchase,
    /// Items viewed after a seed item in the same session
    SequentialView,
}

impl Signal {
    pub const ALL: [Signal; 3] = [
        Signal::CoPurchase,
        Signal::ViewToPurchase,
        Signal::SequentialView,
    ];
}

impl Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::CoPurchase => write!(f, "co_purchase"),
            Signal::ViewToPurchase => write!(f, "view_to_purchase"),
            Signal::SequentialView => write!(f, "sequential_view"),
        }
    }
}

/// How signal outputs are combined into one ranking
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// Sum of every signal's counts, each scaled by its configured weight
    #[default]
    Additive,
    /// Fixed-weight composite of co-purchase, distinct-session and view-to-purchase counts
    Weighted,
}

impl Display for ScoringPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringPolicy::Additive => write!(f, "additive"),
            ScoringPolicy::Weighted => write!(f, "weighted"),
        }
    }
}

/// Ranked recommendations for a set of seed items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationResult {
    pub policy: ScoringPolicy,
    pub items: Vec<ScoredItem>,
    /// True when at least one signal source failed and was left out
    pub partial: bool,
    pub failed_signals: Vec<Signal>,
}

impl RecommendationResult {
    pub fn new(policy: ScoringPolicy, items: Vec<ScoredItem>) -> Self {
        Self {
            policy,
            items,
            partial: false,
            failed_signals: Vec::new(),
        }
    }

    pub fn with_failures(mut self, failed_signals: Vec<Signal>) -> Self {
        self.partial = !failed_signals.is_empty();
        self.failed_signals = failed_signals;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
