use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::time::{self, Duration as TokioDuration};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config;

use super::models::Plan;
use super::service::EntitlementService;

/// key: entitlement-expiry-sweeper -> automate overdue handling
/// The lazy renew-on-read path covers providers who are being looked at;
/// this sweep covers the ones who are not.
pub fn spawn(pool: PgPool) {
    let interval = TokioDuration::from_secs(*config::EXPIRY_SCAN_INTERVAL_SECS);

    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = process_tick(&pool, Utc::now()).await {
                warn!(?err, "entitlement expiry sweep failed");
            }
        }
    });
}

/// key: entitlement-expiry-sweeper -> tick handler
pub async fn process_tick(pool: &PgPool, now: DateTime<Utc>) -> Result<()> {
    let service = EntitlementService::new(pool.clone());
    let expired = sqlx::query_as::<_, ExpiredRecord>(
        r#"
        SELECT provider_id, plan
        FROM entitlement_records
        WHERE active = TRUE AND cycle_end IS NOT NULL AND cycle_end <= $1
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;

    for record in expired {
        let plan = Plan::from_str(&record.plan).unwrap_or(Plan::None);
        let outcome = match plan {
            // the status read performs the atomic auto-renew
            Plan::Basic => service
                .get_status(record.provider_id, now)
                .await
                .map(|_| "renewed"),
            Plan::Standard | Plan::Premium => service
                .revert(record.provider_id, now)
                .await
                .map(|_| "reverted"),
            Plan::None => continue,
        };

        match outcome {
            Ok(action) => info!(
                provider_id = %record.provider_id,
                plan = plan.as_str(),
                action,
                "expired entitlement reconciled"
            ),
            Err(err) => warn!(
                ?err,
                provider_id = %record.provider_id,
                "failed to reconcile expired entitlement"
            ),
        }
    }

    Ok(())
}

#[derive(Debug, FromRow)]
struct ExpiredRecord {
    provider_id: Uuid,
    plan: String,
}
