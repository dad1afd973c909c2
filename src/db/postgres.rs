use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, QueryBuilder};
use std::{future::Future, time::Duration};

use crate::{
    db::EventStore,
    error::{AppError, AppResult},
    models::{EventKind, EventQuery, InteractionEvent, ItemId},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// Acquiring a connection is bounded by the same timeout as queries.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(acquire_timeout)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct EventRow {
    session_id: i64,
    item_id: i64,
    occurred_at: DateTime<Utc>,
}

/// Table and timestamp column holding each event kind
fn event_table(kind: EventKind) -> (&'static str, &'static str) {
    match kind {
        EventKind::View => ("item_views", "viewed_at"),
        EventKind::Purchase => ("item_purchases", "purchased_at"),
    }
}

/// Event store reading the `item_views` and `item_purchases` tables
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgEventStore {
    pub fn new(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Runs a query under the configured timeout
    ///
    /// Both query errors and timeouts are reported as adapter failures.
    async fn timed<T, F>(&self, operation: &'static str, query: F) -> AppResult<T>
    where
        T: Send,
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        match tokio::time::timeout(self.query_timeout, query).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::error!(operation, error = %e, "Event store query failed");
                Err(AppError::Database(e))
            }
            Err(_) => {
                tracing::error!(
                    operation,
                    timeout_ms = self.query_timeout.as_millis() as u64,
                    "Event store query timed out"
                );
                Err(AppError::AdapterUnavailable(format!(
                    "{} timed out after {}ms",
                    operation,
                    self.query_timeout.as_millis()
                )))
            }
        }
    }
}

/// Builds the SELECT for one event kind with the query's optional filters
fn build_event_query(query: &EventQuery) -> QueryBuilder<'static, Postgres> {
    let (table, timestamp) = event_table(query.kind);

    let mut builder = QueryBuilder::new(format!(
        "SELECT session_id, item_id, {timestamp} AS occurred_at FROM {table} WHERE TRUE"
    ));

    if let Some(items) = &query.items {
        builder.push(" AND item_id = ANY(");
        builder.push_bind(items.clone());
        builder.push(")");
    }

    if let Some(sessions) = &query.sessions {
        builder.push(" AND session_id = ANY(");
        builder.push_bind(sessions.clone());
        builder.push(")");
    }

    if let Some(since) = query.since {
        builder.push(format!(" AND {timestamp} >= "));
        builder.push_bind(since);
    }

    builder.push(format!(" ORDER BY session_id, {timestamp}, item_id"));
    builder
}

#[async_trait::async_trait]
impl EventStore for PgEventStore {
    async fn item_exists(&self, item_id: ItemId) -> AppResult<bool> {
        let exists = self
            .timed(
                "item_exists",
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS (SELECT 1 FROM item_views WHERE item_id = $1)
                        OR EXISTS (SELECT 1 FROM item_purchases WHERE item_id = $1)
                    "#,
                )
                .bind(item_id)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(exists)
    }

    async fn items_exist(&self, item_ids: &[ItemId]) -> AppResult<(bool, Vec<ItemId>)> {
        if item_ids.is_empty() {
            return Ok((false, Vec::new()));
        }

        let existing: Vec<ItemId> = self
            .timed(
                "items_exist",
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT item_id FROM item_views WHERE item_id = ANY($1)
                    UNION
                    SELECT item_id FROM item_purchases WHERE item_id = ANY($1)
                    "#,
                )
                .bind(item_ids.to_vec())
                .fetch_all(&self.pool),
            )
            .await?;

        let mut found = Vec::new();
        for id in item_ids {
            if existing.contains(id) && !found.contains(id) {
                found.push(*id);
            }
        }

        let mut requested = item_ids.to_vec();
        requested.sort_unstable();
        requested.dedup();

        Ok((found.len() == requested.len(), found))
    }

    async fn query_events(&self, query: &EventQuery) -> AppResult<Vec<InteractionEvent>> {
        let mut builder = build_event_query(query);
        let rows: Vec<EventRow> = self
            .timed(
                "query_events",
                builder.build_query_as::<EventRow>().fetch_all(&self.pool),
            )
            .await?;

        tracing::debug!(kind = %query.kind, rows = rows.len(), "Fetched events");

        Ok(rows
            .into_iter()
            .map(|row| InteractionEvent {
                session_id: row.session_id,
                item_id: row.item_id,
                timestamp: row.occurred_at,
                kind: query.kind,
            })
            .collect())
    }

    async fn sample_items(&self, count: usize) -> AppResult<Vec<ItemId>> {
        let limit = i64::try_from(count)
            .map_err(|_| AppError::InvalidInput(format!("Sample size {count} is too large")))?;

        let items = self
            .timed(
                "sample_items",
                sqlx::query_scalar::<_, i64>(
                    r#"
                    SELECT item_id FROM (
                        SELECT item_id FROM item_views
                        UNION
                        SELECT item_id FROM item_purchases
                    ) AS combined_items
                    ORDER BY random()
                    LIMIT $1
                    "#,
                )
                .bind(limit)
                .fetch_all(&self.pool),
            )
            .await?;

        Ok(items)
    }

    async fn ping(&self) -> AppResult<()> {
        self.timed("ping", sqlx::query("SELECT 1").execute(&self.pool))
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
