use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::{
    error::{AppError, AppResult},
    models::{EventQuery, ItemId, ItemStats, SessionId},
    services::{recommendations::Recommender, validator::ItemValidator},
};

const REPORT_HEADER: [&str; 6] = [
    "item_id",
    "total_views",
    "total_purchases",
    "view_to_purchase_rate",
    "top_recommendation",
    "top_recommendation_score",
];

#[derive(Serialize)]
struct ReportRow {
    item_id: ItemId,
    total_views: u64,
    total_purchases: u64,
    view_to_purchase_rate: f64,
    top_recommendation: Option<ItemId>,
    top_recommendation_score: Option<f64>,
}

impl From<&ItemStats> for ReportRow {
    fn from(stats: &ItemStats) -> Self {
        Self {
            item_id: stats.item_id,
            total_views: stats.total_views,
            total_purchases: stats.total_purchases,
            view_to_purchase_rate: stats.view_to_purchase_rate,
            top_recommendation: stats.top_recommendation.map(|top| top.item_id),
            top_recommendation_score: stats.top_recommendation.map(|top| top.score),
        }
    }
}

/// Renders statistics as CSV, one row per item after a header row
///
/// Items without a recommendation leave the last two columns empty.
pub fn render_csv(stats: &[ItemStats]) -> AppResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(REPORT_HEADER).map_err(csv_error)?;
    for item in stats {
        writer.serialize(ReportRow::from(item)).map_err(csv_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to flush report: {e}")))?;
    String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("Report is not UTF-8: {e}")))
}

fn csv_error(e: csv::Error) -> AppError {
    AppError::Internal(format!("Failed to write report: {e}"))
}

/// Per-item interaction statistics for reporting
pub struct StatsAnalyzer<'a> {
    recommender: &'a Recommender,
}

impl<'a> StatsAnalyzer<'a> {
    pub fn new(recommender: &'a Recommender) -> Self {
        Self { recommender }
    }

    /// Picks up to `count` items that have recorded interactions
    pub async fn sample_items(&self, count: usize) -> AppResult<Vec<ItemId>> {
        let items = self.recommender.store().sample_items(count).await?;
        tracing::debug!(requested = count, sampled = items.len(), "Sampled items");
        Ok(items)
    }

    /// Statistics for each requested item with recorded interactions
    ///
    /// Unknown ids are skipped. The top recommendation uses the default scoring policy.
    pub async fn item_stats(&self, item_ids: &[ItemId]) -> AppResult<Vec<ItemStats>> {
        let store = self.recommender.store();
        let (_, items) = ItemValidator::new(store).filter_existing(item_ids).await?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        self.recommender.check_cancelled()?;
        let views = store
            .query_events(&EventQuery::views().for_items(&items))
            .await?;
        let purchases = store
            .query_events(&EventQuery::purchases().for_items(&items))
            .await?;

        let mut purchase_counts: HashMap<ItemId, u64> = HashMap::new();
        let mut purchased_in: HashSet<(SessionId, ItemId)> = HashSet::new();
        for purchase in &purchases {
            *purchase_counts.entry(purchase.item_id).or_default() += 1;
            purchased_in.insert((purchase.session_id, purchase.item_id));
        }

        let mut view_counts: HashMap<ItemId, (u64, u64)> = HashMap::new();
        for view in &views {
            let (total, converted) = view_counts.entry(view.item_id).or_default();
            *total += 1;
            if purchased_in.contains(&(view.session_id, view.item_id)) {
                *converted += 1;
            }
        }

        let policy = self.recommender.settings().default_policy;
        let mut stats = Vec::with_capacity(items.len());
        for item_id in items {
            let top_recommendation = self
                .recommender
                .recommend(&[item_id], 1, policy)
                .await?
                .items
                .first()
                .copied();

            let (total_views, converted) = view_counts.get(&item_id).copied().unwrap_or((0, 0));
            let view_to_purchase_rate = if total_views == 0 {
                0.0
            } else {
                converted as f64 / total_views as f64
            };

            stats.push(ItemStats {
                item_id,
                total_views,
                total_purchases: purchase_counts.get(&item_id).copied().unwrap_or(0),
                view_to_purchase_rate,
                top_recommendation,
            });
        }

        tracing::info!(items = stats.len(), "Item statistics computed");

        Ok(stats)
    }

    /// Statistics for a random sample of items
    pub async fn report(&self, count: usize) -> AppResult<Vec<ItemStats>> {
        let items = self.sample_items(count).await?;
        self.item_stats(&items).await
    }
}
