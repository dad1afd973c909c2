mod event;
mod path;
mod recommendation;
mod stats;

pub use event::{EventKind, EventQuery, InteractionEvent, ItemId, SessionId};
pub use path::PurchasePath;
pub use recommendation::{RecommendationResult, ScoredItem, ScoringPolicy, Signal};
pub use stats::ItemStats;
