use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Identifier of a catalog item
pub type ItemId = i64;

/// Identifier of a browsing session
pub type SessionId = i64;

/// Kind of recorded interaction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    View,
    Purchase,
}

impl Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::View => write!(f, "view"),
            EventKind::Purchase => write!(f, "purchase"),
        }
    }
}

/// A single view or purchase recorded within a session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionEvent {
    pub session_id: SessionId,
    pub item_id: ItemId,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl InteractionEvent {
    pub fn view(session_id: SessionId, item_id: ItemId, timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id,
            item_id,
            timestamp,
            kind: EventKind::View,
        }
    }

    pub fn purchase(session_id: SessionId, item_id: ItemId, timestamp: DateTime<Utc>) -> Self {
        Self {
            session_id,
            item_id,
            timestamp,
            kind: EventKind::Purchase,
        }
    }
}

/// Filter passed to an event store
///
/// `items`, `sessions` and `since` are optional and combine with AND.
/// An empty `items` or `sessions` list matches nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQuery {
    pub kind: EventKind,
    pub items: Option<Vec<ItemId>>,
    pub sessions: Option<Vec<SessionId>>,
    pub since: Option<DateTime<Utc>>,
}

impl EventQuery {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            items: None,
            sessions: None,
            since: None,
        }
    }

    pub fn views() -> Self {
        Self::new(EventKind::View)
    }

    pub fn purchases() -> Self {
        Self::new(EventKind::Purchase)
    }

    pub fn for_items(mut self, items: &[ItemId]) -> Self {
        self.items = Some(items.to_vec());
        self
    }

    pub fn in_sessions(mut self, sessions: Vec<SessionId>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    pub fn since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self
    }

    /// Returns true if the event satisfies every filter of this query
    pub fn matches(&self, event: &InteractionEvent) -> bool {
        event.kind == self.kind
            && self
                .items
                .as_ref()
                .map_or(true, |items| items.contains(&event.item_id))
            && self
                .sessions
                .as_ref()
                .map_or(true, |sessions| sessions.contains(&event.session_id))
            && self.since.map_or(true, |since| event.timestamp >= since)
    }
}
