//! PostgreSQL implementation of EntitlementStore and EventDeduplicator.
//!
//! `apply_event` runs in one transaction: the processed-event insert uses
//! `ON CONFLICT DO NOTHING` as the dedup check-and-set, the entitlement row is
//! locked with `FOR UPDATE`, and both writes commit together. A concurrent
//! delivery of the same event id blocks on the primary key until the first
//! transaction finishes, then sees the conflict.
//!
//! `compare_and_swap` is a conditional `UPDATE ... WHERE version = $n`.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::entitlement::{
    state_machine, EntitlementEventType, EntitlementRecord, StoreError, Tier,
};
use crate::domain::foundation::{EventId, Timestamp, UserId};
use crate::ports::{ApplyOutcome, CasOutcome, EntitlementStore, EventDeduplicator, MarkOutcome};

/// PostgreSQL implementation of the ledger ports.
#[derive(Clone)]
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    /// Creates a new store with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_current(&self, user_id: &UserId) -> Result<EntitlementRecord, StoreError> {
        let row: Option<EntitlementRow> = sqlx::query_as(
            r#"
            SELECT credits, tier, version
            FROM entitlements
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to read entitlement", e))?;

        row.map(EntitlementRecord::try_from)
            .transpose()
            .map(Option::unwrap_or_default)
    }
}

/// Database row representation of an entitlement.
#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    credits: i64,
    tier: String,
    version: i64,
}

impl TryFrom<EntitlementRow> for EntitlementRecord {
    type Error = StoreError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let credits = u32::try_from(row.credits)
            .map_err(|_| StoreError::corrupt(format!("credits out of range: {}", row.credits)))?;
        let version = u64::try_from(row.version)
            .map_err(|_| StoreError::corrupt(format!("negative version: {}", row.version)))?;
        let tier = row
            .tier
            .parse::<Tier>()
            .map_err(|e| StoreError::corrupt(e.to_string()))?;

        Ok(EntitlementRecord {
            credits,
            tier,
            version,
        })
    }
}

fn db_error(context: &str, e: sqlx::Error) -> StoreError {
    StoreError::unavailable(format!("{}: {}", context, e))
}

fn version_param(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::corrupt(format!("version overflow: {}", version)))
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn apply_event(
        &self,
        user_id: &UserId,
        event_id: &EventId,
        event_type: &EntitlementEventType,
    ) -> Result<ApplyOutcome, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", e))?;

        // 1. Claim the event id
        let claimed = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, user_id, processed_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id.as_str())
        .bind(event_type.as_str())
        .bind(user_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to record processed event", e))?;

        if claimed.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| db_error("Failed to roll back transaction", e))?;
            return Ok(ApplyOutcome::AlreadyProcessed);
        }

        // 2. Lock (creating if needed) the user's row
        sqlx::query(
            r#"
            INSERT INTO entitlements (user_id, credits, tier, version, updated_at)
            VALUES ($1, 0, 'free', 0, NOW())
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to create entitlement", e))?;

        let row: EntitlementRow = sqlx::query_as(
            r#"
            SELECT credits, tier, version
            FROM entitlements
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to lock entitlement", e))?;
        let current = EntitlementRecord::try_from(row)?;

        // 3. Transition and write
        let next = state_machine::transition(&current, event_type);
        let stored = if next.same_balance(&current) {
            current
        } else {
            let stored = next.with_version(current.version + 1);
            sqlx::query(
                r#"
                UPDATE entitlements SET
                    credits = $2,
                    tier = $3,
                    version = $4,
                    updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(user_id.as_str())
            .bind(i64::from(stored.credits))
            .bind(stored.tier.as_str())
            .bind(version_param(stored.version)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("Failed to update entitlement", e))?;
            stored
        };

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", e))?;

        Ok(ApplyOutcome::Applied(stored))
    }

    async fn read(&self, user_id: &UserId) -> Result<EntitlementRecord, StoreError> {
        self.fetch_current(user_id).await
    }

    async fn compare_and_swap(
        &self,
        user_id: &UserId,
        expected_version: u64,
        new_record: EntitlementRecord,
    ) -> Result<CasOutcome, StoreError> {
        let stored = new_record.with_version(expected_version + 1);

        let result = if expected_version == 0 {
            // An absent row and a never-written row both count as version 0.
            sqlx::query(
                r#"
                INSERT INTO entitlements (user_id, credits, tier, version, updated_at)
                VALUES ($1, $2, $3, 1, NOW())
                ON CONFLICT (user_id) DO UPDATE SET
                    credits = EXCLUDED.credits,
                    tier = EXCLUDED.tier,
                    version = 1,
                    updated_at = NOW()
                WHERE entitlements.version = 0
                "#,
            )
            .bind(user_id.as_str())
            .bind(i64::from(stored.credits))
            .bind(stored.tier.as_str())
            .execute(&self.pool)
            .await
        } else {
            sqlx::query(
                r#"
                UPDATE entitlements SET
                    credits = $2,
                    tier = $3,
                    version = version + 1,
                    updated_at = NOW()
                WHERE user_id = $1 AND version = $4
                "#,
            )
            .bind(user_id.as_str())
            .bind(i64::from(stored.credits))
            .bind(stored.tier.as_str())
            .bind(version_param(expected_version)?)
            .execute(&self.pool)
            .await
        }
        .map_err(|e| db_error("Failed to swap entitlement", e))?;

        if result.rows_affected() == 0 {
            return Ok(CasOutcome::Conflict(self.fetch_current(user_id).await?));
        }
        Ok(CasOutcome::Swapped(stored))
    }
}

#[async_trait]
impl EventDeduplicator for PostgresEntitlementStore {
    async fn has_applied(&self, event_id: &EventId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (SELECT 1 FROM processed_webhook_events WHERE event_id = $1)
            "#,
        )
        .bind(event_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to check processed event", e))?;

        Ok(exists)
    }

    async fn mark_applied(
        &self,
        event_id: &EventId,
        event_type: &EntitlementEventType,
    ) -> Result<MarkOutcome, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (event_id, event_type, processed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id.as_str())
        .bind(event_type.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to record processed event", e))?;

        if result.rows_affected() == 0 {
            Ok(MarkOutcome::AlreadyMarked)
        } else {
            Ok(MarkOutcome::Marked)
        }
    }

    async fn delete_processed_before(&self, cutoff: Timestamp) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM processed_webhook_events
            WHERE processed_at < $1
            "#,
        )
        .bind(cutoff.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to prune processed events", e))?;

        Ok(result.rows_affected())
    }
}
