use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::models::{ConfirmedPurchase, EntitlementRecord, Plan, SubscriptionStatus};
use super::policy;

/// key: entitlement-service -> record lifecycle
/// Every mutation is one transaction that locks the provider's row, so
/// concurrent calls for the same provider serialize and unrelated providers
/// never contend.
#[derive(Clone)]
pub struct EntitlementService {
    pool: PgPool,
}

/// Outcome of a plan activation; `duplicate` marks a replayed confirmation
/// that was answered without touching the record.
#[derive(Clone, Debug)]
pub struct PlanActivation {
    pub record: EntitlementRecord,
    pub duplicate: bool,
}

impl EntitlementService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Idempotent registration hook: creates the default record (`plan =
    /// none`, searchable, counters zero) and leaves an existing one alone.
    pub async fn ensure_record(
        &self,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<EntitlementRecord> {
        sqlx::query(
            r#"
            INSERT INTO entitlement_records (
                provider_id, plan, cycle_start, cycle_end, active,
                used_this_cycle, searchable, version, created_at, updated_at
            ) VALUES ($1, 'none', $2, NULL, FALSE, 0, TRUE, 0, $2, $2)
            ON CONFLICT (provider_id) DO NOTHING
            "#,
        )
        .bind(provider_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, EntitlementRow>(
            "SELECT * FROM entitlement_records WHERE provider_id = $1",
        )
        .bind(provider_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    /// Read path with the lazy renew-on-read side effect: an expired basic
    /// term is renewed and an expired paid term reverted inside the same
    /// row-locked transaction, so concurrent status checks cannot stack
    /// extensions or observe the stale state.
    pub async fn get_status(
        &self,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<SubscriptionStatus> {
        let mut tx = self.pool.begin().await?;
        let record = Self::lock_record(&mut tx, provider_id).await?;
        let record = Self::reconcile_locked(&mut tx, record, now).await?;
        tx.commit().await?;

        Ok(record.status(now))
    }

    /// Applies a plan purchase or the free-plan activation. The term
    /// restarts at `now`; `used_this_cycle` is deliberately left alone so a
    /// mid-cycle upgrade keeps prior usage counted against the new limit.
    ///
    /// Replaying a `confirmation_id` that was already applied commits
    /// nothing and reports the current record with `duplicate = true`.
    pub async fn activate_plan(
        &self,
        provider_id: Uuid,
        plan: Plan,
        confirmation: Option<&ConfirmedPurchase>,
        now: DateTime<Utc>,
    ) -> AppResult<PlanActivation> {
        if plan == Plan::None {
            return Err(AppError::InvalidPlanTransition(
                "a provider cannot be moved back to an unset plan".to_string(),
            ));
        }

        let paid_confirmation = if plan.is_paid() {
            let confirmation = confirmation.ok_or_else(|| {
                AppError::InvalidPlanTransition(format!(
                    "plan `{}` requires a verified payment confirmation",
                    plan.as_str()
                ))
            })?;
            if confirmation.plan != plan {
                return Err(AppError::InvalidPlanTransition(format!(
                    "confirmation `{}` was issued for plan `{}`",
                    confirmation.confirmation_id,
                    confirmation.plan.as_str()
                )));
            }
            Some(confirmation)
        } else {
            None
        };

        let mut tx = self.pool.begin().await?;

        if let Some(confirmation) = paid_confirmation {
            let inserted = sqlx::query(
                r#"
                INSERT INTO payment_confirmations (
                    confirmation_id, provider_id, plan, amount, currency, applied_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (confirmation_id) DO NOTHING
                "#,
            )
            .bind(&confirmation.confirmation_id)
            .bind(provider_id)
            .bind(plan.as_str())
            .bind(&confirmation.amount)
            .bind(&confirmation.currency)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if inserted.rows_affected() == 0 {
                let record = Self::lock_record(&mut tx, provider_id).await?;
                tx.commit().await?;
                info!(
                    %provider_id,
                    confirmation_id = %confirmation.confirmation_id,
                    "duplicate payment confirmation replayed; entitlement unchanged"
                );
                return Ok(PlanActivation {
                    record,
                    duplicate: true,
                });
            }
        }

        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            UPDATE entitlement_records
            SET plan = $2,
                cycle_start = $3,
                cycle_end = $4,
                active = TRUE,
                searchable = TRUE,
                version = version + 1,
                updated_at = $3
            WHERE provider_id = $1
            RETURNING *
            "#,
        )
        .bind(provider_id)
        .bind(plan.as_str())
        .bind(now)
        .bind(now + Duration::days(policy::CYCLE_DAYS))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // rollback also discards the confirmation row
            return Err(AppError::NotFound);
        };

        tx.commit().await?;
        info!(%provider_id, plan = plan.as_str(), "subscription plan activated");

        Ok(PlanActivation {
            record: row.into(),
            duplicate: false,
        })
    }

    /// Consumes one confirmed booking. Expiry is reconciled first; the call
    /// fails with `QuotaExceeded` at the plan limit, and the increment that
    /// reaches the limit is the only write that turns `searchable` off.
    pub async fn consume_booking(
        &self,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<EntitlementRecord> {
        let mut tx = self.pool.begin().await?;
        let record = Self::lock_record(&mut tx, provider_id).await?;
        let record = Self::reconcile_locked(&mut tx, record, now).await?;

        if policy::limit_reached(record.plan, record.used_this_cycle) {
            // keep any expiry reconciliation that just happened
            tx.commit().await?;
            return Err(AppError::QuotaExceeded);
        }

        let used = record.used_this_cycle + 1;
        let hide = policy::limit_reached(record.plan, used);
        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            UPDATE entitlement_records
            SET used_this_cycle = $2,
                searchable = CASE WHEN $3 THEN FALSE ELSE searchable END,
                version = version + 1,
                updated_at = $4
            WHERE provider_id = $1
            RETURNING *
            "#,
        )
        .bind(provider_id)
        .bind(used)
        .bind(hide)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        if hide {
            info!(
                %provider_id,
                plan = record.plan.as_str(),
                used_this_cycle = used,
                "booking limit reached; provider hidden from search"
            );
        }

        Ok(row.into())
    }

    /// Downgrades an expired paid record: `plan = basic`, term cleared,
    /// visibility restored, usage counters untouched. A no-op for records
    /// that are not on a paid plan.
    pub async fn revert(
        &self,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<EntitlementRecord> {
        let mut tx = self.pool.begin().await?;
        let record = Self::lock_record(&mut tx, provider_id).await?;
        let record = if record.plan.is_paid() {
            Self::revert_locked(&mut tx, provider_id, now).await?
        } else {
            record
        };
        tx.commit().await?;

        Ok(record)
    }

    /// Administrative rollover: clean usage ledger at a billing boundary
    /// without touching the plan or term. Rolling the cycle restores
    /// visibility.
    pub async fn reset_cycle(
        &self,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<EntitlementRecord> {
        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            UPDATE entitlement_records
            SET used_this_cycle = 0,
                cycle_start = $2,
                searchable = TRUE,
                version = version + 1,
                updated_at = $2
            WHERE provider_id = $1
            RETURNING *
            "#,
        )
        .bind(provider_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound);
        };

        info!(%provider_id, "usage cycle reset");
        Ok(row.into())
    }

    /// Bulk form of `reset_cycle` for the operator/scheduler path.
    pub async fn reset_all_cycles(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE entitlement_records
            SET used_this_cycle = 0,
                cycle_start = $1,
                searchable = TRUE,
                version = version + 1,
                updated_at = $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        info!(records = result.rows_affected(), "usage cycles reset in bulk");
        Ok(result.rows_affected())
    }

    async fn lock_record(
        tx: &mut Transaction<'_, Postgres>,
        provider_id: Uuid,
    ) -> AppResult<EntitlementRecord> {
        let row = sqlx::query_as::<_, EntitlementRow>(
            "SELECT * FROM entitlement_records WHERE provider_id = $1 FOR UPDATE",
        )
        .bind(provider_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(EntitlementRecord::from).ok_or(AppError::NotFound)
    }

    /// Brings a stale record up to date under the row lock: an expired basic
    /// term rolls over for another cycle, an expired paid term reverts to
    /// basic. Anything else passes through untouched.
    async fn reconcile_locked(
        tx: &mut Transaction<'_, Postgres>,
        record: EntitlementRecord,
        now: DateTime<Utc>,
    ) -> AppResult<EntitlementRecord> {
        if !record.has_expired(now) {
            return Ok(record);
        }

        match record.plan {
            Plan::Basic => Self::renew_basic_locked(tx, record.provider_id, now).await,
            Plan::Standard | Plan::Premium => {
                Self::revert_locked(tx, record.provider_id, now).await
            }
            Plan::None => Ok(record),
        }
    }

    async fn renew_basic_locked(
        tx: &mut Transaction<'_, Postgres>,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<EntitlementRecord> {
        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            UPDATE entitlement_records
            SET cycle_start = $2,
                cycle_end = $3,
                used_this_cycle = 0,
                active = TRUE,
                searchable = TRUE,
                version = version + 1,
                updated_at = $2
            WHERE provider_id = $1
            RETURNING *
            "#,
        )
        .bind(provider_id)
        .bind(now)
        .bind(now + Duration::days(policy::CYCLE_DAYS))
        .fetch_one(&mut **tx)
        .await?;

        info!(%provider_id, "expired basic term auto-renewed");
        Ok(row.into())
    }

    async fn revert_locked(
        tx: &mut Transaction<'_, Postgres>,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<EntitlementRecord> {
        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            UPDATE entitlement_records
            SET plan = 'basic',
                active = FALSE,
                cycle_end = NULL,
                searchable = TRUE,
                version = version + 1,
                updated_at = $2
            WHERE provider_id = $1
            RETURNING *
            "#,
        )
        .bind(provider_id)
        .bind(now)
        .fetch_one(&mut **tx)
        .await?;

        info!(%provider_id, "expired paid plan reverted to basic");
        Ok(row.into())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    provider_id: Uuid,
    plan: String,
    cycle_start: DateTime<Utc>,
    cycle_end: Option<DateTime<Utc>>,
    active: bool,
    used_this_cycle: i64,
    searchable: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<EntitlementRow> for EntitlementRecord {
    fn from(row: EntitlementRow) -> Self {
        EntitlementRecord {
            provider_id: row.provider_id,
            plan: Plan::from_str(&row.plan).unwrap_or(Plan::None),
            cycle_start: row.cycle_start,
            cycle_end: row.cycle_end,
            active: row.active,
            used_this_cycle: row.used_this_cycle,
            searchable: row.searchable,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
