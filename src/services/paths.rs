use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    error::AppResult,
    models::{EventKind, EventQuery, InteractionEvent, ItemId, PurchasePath, SessionId},
    services::{recommendations::Recommender, validator::ItemValidator},
};

/// Views and purchases of one session, each in ascending timestamp order
#[derive(Default)]
struct SessionTimeline {
    views: Vec<(DateTime<Utc>, ItemId)>,
    purchases: Vec<(DateTime<Utc>, ItemId)>,
}

/// Extracts frequent view sequences leading to a purchase
///
/// Nothing is indexed between calls; each call rescans the sessions that viewed
/// the item.
pub struct PathMiner<'a> {
    recommender: &'a Recommender,
}

impl<'a> PathMiner<'a> {
    pub fn new(recommender: &'a Recommender) -> Self {
        Self { recommender }
    }

    pub async fn mine(
        &self,
        item_id: ItemId,
        max_path_length: usize,
        min_support: u32,
    ) -> AppResult<Vec<PurchasePath>> {
        let store = self.recommender.store();

        self.recommender.check_cancelled()?;
        if !ItemValidator::new(store).exists(item_id).await? {
            tracing::info!(item_id, "No interactions recorded for item, no paths to mine");
            return Ok(Vec::new());
        }

        self.recommender.check_cancelled()?;
        let anchor_views = store
            .query_events(&EventQuery::views().for_items(&[item_id]))
            .await?;
        let sessions: Vec<SessionId> = anchor_views
            .iter()
            .map(|e| e.session_id)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if sessions.is_empty() {
            return Ok(Vec::new());
        }
        let session_count = sessions.len();

        self.recommender.check_cancelled()?;
        let views = store
            .query_events(&EventQuery::views().in_sessions(sessions.clone()))
            .await?;

        self.recommender.check_cancelled()?;
        let purchases = store
            .query_events(&EventQuery::purchases().in_sessions(sessions))
            .await?;

        let timelines = group_by_session(views.iter().chain(purchases.iter()));
        let session_paths: Vec<Vec<ItemId>> = timelines
            .values()
            .filter_map(|timeline| session_path(timeline, max_path_length))
            .collect();

        let paths = count_paths(session_paths, min_support);

        tracing::info!(
            item_id,
            sessions = session_count,
            paths = paths.len(),
            max_path_length,
            min_support,
            "Purchase paths mined"
        );

        Ok(paths)
    }
}

fn group_by_session<'e, I>(events: I) -> BTreeMap<SessionId, SessionTimeline>
where
    I: IntoIterator<Item = &'e InteractionEvent>,
{
    let mut timelines: BTreeMap<SessionId, SessionTimeline> = BTreeMap::new();
    for event in events {
        let timeline = timelines.entry(event.session_id).or_default();
        let entry = (event.timestamp, event.item_id);
        match event.kind {
            EventKind::View => timeline.views.push(entry),
            EventKind::Purchase => timeline.purchases.push(entry),
        }
    }

    for timeline in timelines.values_mut() {
        timeline.views.sort();
        timeline.purchases.sort();
    }
    timelines
}

/// Builds the single path a session contributes, if any
///
/// The session's first purchase preceded by at least one view anchors the path.
/// Views strictly before it are kept in order (repeat views of an item collapse to
/// the first), truncated to `max_path_length`, then the purchased item is appended.
fn session_path(timeline: &SessionTimeline, max_path_length: usize) -> Option<Vec<ItemId>> {
    timeline.purchases.iter().find_map(|&(purchased_at, purchased)| {
        let mut path: Vec<ItemId> = Vec::new();
        for &(viewed_at, viewed) in &timeline.views {
            if viewed_at >= purchased_at {
                break;
            }
            if !path.contains(&viewed) {
                path.push(viewed);
            }
        }

        if path.is_empty() {
            return None;
        }

        path.truncate(max_path_length);
        path.push(purchased);
        Some(path)
    })
}

/// Counts identical paths and keeps those seen at least `min_support` times
///
/// Sorted by descending frequency; equal frequencies keep first-seen order.
fn count_paths<I>(paths: I, min_support: u32) -> Vec<PurchasePath>
where
    I: IntoIterator<Item = Vec<ItemId>>,
{
    let mut counted: Vec<PurchasePath> = Vec::new();
    let mut positions: HashMap<Vec<ItemId>, usize> = HashMap::new();

    for path in paths {
        match positions.get(&path) {
            Some(&index) => counted[index].frequency += 1,
            None => {
                positions.insert(path.clone(), counted.len());
                counted.push(PurchasePath { path, frequency: 1 });
            }
        }
    }

    counted.retain(|p| p.frequency >= min_support);
    counted.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    counted
}
