use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

use super::adapters::PaymentProviderAdapter;
use super::models::{EntitlementRecord, Plan, SubscriptionStatus};
use super::service::EntitlementService;

/// key: entitlement-api -> rest endpoints
pub fn routes() -> Router {
    Router::new()
        .route("/api/providers/:id/entitlements", post(ensure_record))
        .route("/api/providers/:id/subscription", get(subscription_status))
        .route(
            "/api/providers/:id/subscription/free",
            post(activate_free_plan),
        )
        .route(
            "/api/providers/:id/subscription/checkout",
            post(verified_checkout),
        )
        .route("/api/providers/:id/bookings/consume", post(consume_booking))
        .route(
            "/api/providers/:id/subscription/reset-cycle",
            post(reset_cycle),
        )
        .route(
            "/api/admin/entitlements/reset-cycles",
            post(reset_all_cycles),
        )
}

/// Registration hook: the onboarding workflow calls this once the provider
/// account exists.
async fn ensure_record(
    Extension(pool): Extension<PgPool>,
    Path(provider_id): Path<Uuid>,
) -> AppResult<Json<EntitlementRecord>> {
    let service = EntitlementService::new(pool);
    let record = service.ensure_record(provider_id, Utc::now()).await?;
    Ok(Json(record))
}

async fn subscription_status(
    Extension(pool): Extension<PgPool>,
    Path(provider_id): Path<Uuid>,
) -> AppResult<Json<SubscriptionStatus>> {
    let service = EntitlementService::new(pool);
    let status = service.get_status(provider_id, Utc::now()).await?;
    Ok(Json(status))
}

async fn activate_free_plan(
    Extension(pool): Extension<PgPool>,
    Path(provider_id): Path<Uuid>,
) -> AppResult<Json<ActivationResponse>> {
    let now = Utc::now();
    let service = EntitlementService::new(pool);
    let activation = service
        .activate_plan(provider_id, Plan::Basic, None, now)
        .await?;

    Ok(Json(ActivationResponse {
        subscription: activation.record.status(now),
        duplicate_confirmation: activation.duplicate,
    }))
}

async fn verified_checkout(
    Extension(pool): Extension<PgPool>,
    Extension(adapter): Extension<Arc<dyn PaymentProviderAdapter>>,
    Path(provider_id): Path<Uuid>,
    Json(payload): Json<CheckoutRequest>,
) -> AppResult<Json<ActivationResponse>> {
    let plan = Plan::from_str(&payload.plan)
        .filter(|plan| plan.is_paid())
        .ok_or_else(|| {
            AppError::InvalidPlanTransition(format!(
                "plan `{}` cannot be purchased",
                payload.plan
            ))
        })?;

    // the network-bound verification completes before the engine transaction
    let purchase = adapter
        .verify_order(provider_id, &payload.order_id, plan)
        .await?;

    let now = Utc::now();
    let service = EntitlementService::new(pool);
    let activation = service
        .activate_plan(provider_id, plan, Some(&purchase), now)
        .await?;

    Ok(Json(ActivationResponse {
        subscription: activation.record.status(now),
        duplicate_confirmation: activation.duplicate,
    }))
}

/// Invoked by the booking workflow exactly once per confirmed booking.
async fn consume_booking(
    Extension(pool): Extension<PgPool>,
    Path(provider_id): Path<Uuid>,
) -> AppResult<Json<SubscriptionStatus>> {
    let now = Utc::now();
    let service = EntitlementService::new(pool);
    let record = service.consume_booking(provider_id, now).await?;
    Ok(Json(record.status(now)))
}

async fn reset_cycle(
    Extension(pool): Extension<PgPool>,
    Path(provider_id): Path<Uuid>,
) -> AppResult<Json<SubscriptionStatus>> {
    let now = Utc::now();
    let service = EntitlementService::new(pool);
    let record = service.reset_cycle(provider_id, now).await?;
    Ok(Json(record.status(now)))
}

async fn reset_all_cycles(
    Extension(pool): Extension<PgPool>,
) -> AppResult<Json<BulkResetResponse>> {
    let service = EntitlementService::new(pool);
    let reset_count = service.reset_all_cycles(Utc::now()).await?;
    Ok(Json(BulkResetResponse { reset_count }))
}

#[derive(Debug, Deserialize)]
struct CheckoutRequest {
    order_id: String,
    plan: String,
}

#[derive(Debug, Serialize)]
struct ActivationResponse {
    subscription: SubscriptionStatus,
    duplicate_confirmation: bool,
}

#[derive(Debug, Serialize)]
struct BulkResetResponse {
    reset_count: u64,
}
