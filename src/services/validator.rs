use crate::{
    db::EventStore,
    error::{AppError, AppResult},
    models::ItemId,
};

/// Confirms that item ids appear in recorded interactions
///
/// An item exists when it has at least one view or purchase. Store failures are
/// propagated as errors and never reported as a missing item.
pub struct ItemValidator<'a> {
    store: &'a dyn EventStore,
}

impl<'a> ItemValidator<'a> {
    pub fn new(store: &'a dyn EventStore) -> Self {
        Self { store }
    }

    pub async fn exists(&self, item_id: ItemId) -> AppResult<bool> {
        let exists = self.store.item_exists(item_id).await?;
        tracing::debug!(item_id, exists, "Validated item");
        Ok(exists)
    }

    /// Splits the requested ids into those with recorded interactions
    ///
    /// Returns `(false, [])` for an empty request, meaning there was nothing to
    /// validate. Duplicates are collapsed and the valid ids keep request order.
    pub async fn filter_existing(&self, item_ids: &[ItemId]) -> AppResult<(bool, Vec<ItemId>)> {
        if item_ids.is_empty() {
            tracing::debug!("No items to validate");
            return Ok((false, Vec::new()));
        }

        let mut unique = Vec::with_capacity(item_ids.len());
        for id in item_ids {
            if !unique.contains(id) {
                unique.push(*id);
            }
        }

        let (all_exist, valid) = self.store.items_exist(&unique).await?;

        tracing::debug!(
            found = valid.len(),
            requested = unique.len(),
            store = self.store.name(),
            "Validated items"
        );

        Ok((all_exist, valid))
    }

    /// Requires every id to exist, returning them de-duplicated
    pub async fn require_all(&self, item_ids: &[ItemId]) -> AppResult<Vec<ItemId>> {
        if item_ids.is_empty() {
            return Err(AppError::InvalidInput(
                "Must provide at least one item".to_string(),
            ));
        }

        let (all_exist, valid) = self.filter_existing(item_ids).await?;
        if all_exist {
            return Ok(valid);
        }

        let mut missing = Vec::new();
        for id in item_ids {
            if !valid.contains(id) && !missing.contains(id) {
                missing.push(*id);
            }
        }

        tracing::warn!(missing = ?missing, "Requested items have no recorded interactions");
        Err(AppError::ItemNotFound(missing))
    }
}
