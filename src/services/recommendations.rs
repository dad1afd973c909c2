use chrono::{DateTime, Utc};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    db::EventStore,
    error::{AppError, AppResult},
    models::{ItemId, PurchasePath, RecommendationResult, ScoringPolicy, Signal},
    services::{
        merger::{composite, merge_weighted},
        paths::PathMiner,
        signals::{into_scored, CandidateTally, SignalExtractor},
        validator::ItemValidator,
    },
};

/// Per-signal multipliers used by the additive policy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
    pub co_purchase: f64,
    pub view_to_purchase: f64,
    pub sequential_view: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            co_purchase: 1.0,
            view_to_purchase: 1.0,
            sequential_view: 1.0,
        }
    }
}

impl SignalWeights {
    pub fn weight(&self, signal: Signal) -> f64 {
        match signal {
            Signal::CoPurchase => self.co_purchase,
            Signal::ViewToPurchase => self.view_to_purchase,
            Signal::SequentialView => self.sequential_view,
        }
    }
}

/// Scoring parameters shared by all requests
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Recency window for seed purchases in the co-purchase signal
    pub co_purchase_window_days: Option<i64>,
    /// Recency window for seed views in the sequential-view signal
    pub sequential_view_window_days: i64,
    pub default_policy: ScoringPolicy,
    pub weights: SignalWeights,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            co_purchase_window_days: Some(90),
            sequential_view_window_days: 30,
            default_policy: ScoringPolicy::Additive,
            weights: SignalWeights::default(),
        }
    }
}

/// Signal outputs that succeeded, plus the signals whose store queries failed
struct Gathered {
    tallies: Vec<(Signal, Vec<CandidateTally>)>,
    failed: Vec<Signal>,
}

impl Gathered {
    fn tallies_for(&self, wanted: Signal) -> &[CandidateTally] {
        self.tallies
            .iter()
            .find(|(signal, _)| *signal == wanted)
            .map(|(_, tallies)| tallies.as_slice())
            .unwrap_or(&[])
    }
}

/// Recommendation and path-mining entry point
///
/// Built per request around an injected event store. Holds no mutable state, so
/// concurrent requests never share working data.
pub struct Recommender {
    store: Arc<dyn EventStore>,
    settings: EngineSettings,
    cancel_flag: Option<Arc<AtomicBool>>,
    reference_time: Option<DateTime<Utc>>,
}

impl Recommender {
    pub fn new(store: Arc<dyn EventStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            settings,
            cancel_flag: None,
            reference_time: None,
        }
    }

    /// Aborts work with `AppError::Cancelled` once the flag is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    /// Evaluates recency windows relative to `now` instead of the wall clock
    pub fn with_reference_time(mut self, now: DateTime<Utc>) -> Self {
        self.reference_time = Some(now);
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    pub(crate) fn check_cancelled(&self) -> AppResult<()> {
        if let Some(ref flag) = self.cancel_flag {
            if flag.load(Ordering::SeqCst) {
                tracing::info!("Operation cancelled by caller");
                return Err(AppError::Cancelled);
            }
        }
        Ok(())
    }

    /// Ranks items related to the seed items under the given policy
    ///
    /// Every seed must have recorded interactions. Seeds never appear in the result.
    /// If some signal sources fail while others succeed, the result is tagged partial.
    pub async fn recommend(
        &self,
        seed_item_ids: &[ItemId],
        num_recommendations: usize,
        policy: ScoringPolicy,
    ) -> AppResult<RecommendationResult> {
        if seed_item_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "Must provide at least one seed item".to_string(),
            ));
        }
        if num_recommendations == 0 {
            return Err(AppError::InvalidInput(
                "Number of recommendations must be positive".to_string(),
            ));
        }

        self.check_cancelled()?;

        let seeds = ItemValidator::new(self.store()).require_all(seed_item_ids).await?;
        let now = self.reference_time.unwrap_or_else(Utc::now);

        tracing::info!(
            seeds = ?seeds,
            num_recommendations,
            policy = %policy,
            "Computing recommendations"
        );

        let mut result = match policy {
            ScoringPolicy::Additive => {
                let gathered = self.gather(&Signal::ALL, &seeds, now).await?;

                let lists: Vec<(f64, Vec<_>)> = gathered
                    .tallies
                    .iter()
                    .map(|(signal, tallies)| {
                        (
                            self.settings.weights.weight(*signal),
                            into_scored(tallies, num_recommendations),
                        )
                    })
                    .collect();

                let items = merge_weighted(lists.iter().map(|(w, list)| (*w, list.as_slice())));
                RecommendationResult::new(policy, items).with_failures(gathered.failed)
            }
            ScoringPolicy::Weighted => {
                let gathered = self
                    .gather(&[Signal::CoPurchase, Signal::ViewToPurchase], &seeds, now)
                    .await?;

                let items = composite(
                    gathered.tallies_for(Signal::CoPurchase),
                    gathered.tallies_for(Signal::ViewToPurchase),
                );
                RecommendationResult::new(policy, items).with_failures(gathered.failed)
            }
        };

        result.items.retain(|item| !seeds.contains(&item.item_id));
        result.items.truncate(num_recommendations);

        tracing::info!(
            returned = result.items.len(),
            partial = result.partial,
            "Recommendations computed"
        );

        Ok(result)
    }

    /// Runs each signal in turn, checking for cancellation between them
    ///
    /// Store failures of individual signals are recorded and skipped. If every signal
    /// fails, the first failure is returned.
    async fn gather(
        &self,
        signals: &[Signal],
        seeds: &[ItemId],
        now: DateTime<Utc>,
    ) -> AppResult<Gathered> {
        let mut gathered = Gathered {
            tallies: Vec::new(),
            failed: Vec::new(),
        };
        let mut first_error = None;

        for &signal in signals {
            self.check_cancelled()?;

            match self.extractor(signal, now).tally(seeds).await {
                Ok(tallies) => gathered.tallies.push((signal, tallies)),
                Err(e) if e.is_adapter_failure() => {
                    tracing::warn!(signal = %signal, error = %e, "Signal source failed");
                    gathered.failed.push(signal);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) => return Err(e),
            }
        }

        self.check_cancelled()?;

        if gathered.tallies.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        if !gathered.failed.is_empty() {
            tracing::warn!(
                success_count = gathered.tallies.len(),
                error_count = gathered.failed.len(),
                "Partial signal failure"
            );
        }

        Ok(gathered)
    }

    fn extractor(&self, signal: Signal, now: DateTime<Utc>) -> SignalExtractor<'_> {
        let window = match signal {
            Signal::CoPurchase => self.settings.co_purchase_window_days,
            Signal::ViewToPurchase => None,
            Signal::SequentialView => Some(self.settings.sequential_view_window_days),
        };
        SignalExtractor::new(self.store(), signal).within_days(window, now)
    }

    /// Frequent view sequences that end in a purchase, for sessions that viewed the item
    pub async fn mine_paths(
        &self,
        item_id: ItemId,
        max_path_length: usize,
        min_support: u32,
    ) -> AppResult<Vec<PurchasePath>> {
        if max_path_length == 0 {
            return Err(AppError::InvalidInput(
                "max_path_length must be at least 1".to_string(),
            ));
        }
        if min_support == 0 {
            return Err(AppError::InvalidInput(
                "min_support must be at least 1".to_string(),
            ));
        }

        PathMiner::new(self).mine(item_id, max_path_length, min_support).await
    }
}
