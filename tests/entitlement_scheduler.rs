use chrono::{DateTime, Duration, TimeZone, Utc};
use garage_backend::entitlements::run_expiry_sweep_tick;
use sqlx::PgPool;
use uuid::Uuid;

// key: entitlement-sweeper-tests -> bulk expiry handling

fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 15, 12, 0, 0).unwrap()
}

async fn seed_record(
    pool: &PgPool,
    provider_id: Uuid,
    plan: &str,
    cycle_end: Option<DateTime<Utc>>,
    active: bool,
    used_this_cycle: i64,
) {
    sqlx::query(
        "INSERT INTO entitlement_records (provider_id, plan, cycle_start, cycle_end, active, used_this_cycle, searchable) VALUES ($1, $2, $3, $4, $5, $6, TRUE)",
    )
    .bind(provider_id)
    .bind(plan)
    .bind(fixed_now() - Duration::days(40))
    .bind(cycle_end)
    .bind(active)
    .bind(used_this_cycle)
    .execute(pool)
    .await
    .unwrap();
}

#[derive(Debug, sqlx::FromRow)]
struct RawRecord {
    plan: String,
    cycle_end: Option<DateTime<Utc>>,
    active: bool,
    used_this_cycle: i64,
    version: i64,
}

async fn fetch_raw(pool: &PgPool, provider_id: Uuid) -> RawRecord {
    sqlx::query_as(
        "SELECT plan, cycle_end, active, used_this_cycle, version FROM entitlement_records WHERE provider_id = $1",
    )
    .bind(provider_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn sweep_reverts_paid_and_renews_basic(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let now = fixed_now();
    let expired_standard = Uuid::new_v4();
    let expired_basic = Uuid::new_v4();
    let current_premium = Uuid::new_v4();

    seed_record(
        &pool,
        expired_standard,
        "standard",
        Some(now - Duration::days(10)),
        true,
        60,
    )
    .await;
    seed_record(
        &pool,
        expired_basic,
        "basic",
        Some(now - Duration::days(3)),
        true,
        5,
    )
    .await;
    seed_record(
        &pool,
        current_premium,
        "premium",
        Some(now + Duration::days(12)),
        true,
        400,
    )
    .await;

    run_expiry_sweep_tick(&pool, now).await.unwrap();

    let reverted = fetch_raw(&pool, expired_standard).await;
    assert_eq!(reverted.plan, "basic");
    assert!(!reverted.active);
    assert_eq!(reverted.cycle_end, None);
    assert_eq!(reverted.used_this_cycle, 60);

    let renewed = fetch_raw(&pool, expired_basic).await;
    assert_eq!(renewed.plan, "basic");
    assert!(renewed.active);
    assert_eq!(renewed.cycle_end, Some(now + Duration::days(30)));
    assert_eq!(renewed.used_this_cycle, 0);

    let untouched = fetch_raw(&pool, current_premium).await;
    assert_eq!(untouched.plan, "premium");
    assert_eq!(untouched.version, 0, "in-window records must not be written");
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn sweep_is_idempotent_across_ticks(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let now = fixed_now();
    let provider_id = Uuid::new_v4();
    seed_record(
        &pool,
        provider_id,
        "standard",
        Some(now - Duration::days(1)),
        true,
        10,
    )
    .await;

    run_expiry_sweep_tick(&pool, now).await.unwrap();
    let first = fetch_raw(&pool, provider_id).await;

    run_expiry_sweep_tick(&pool, now).await.unwrap();
    let second = fetch_raw(&pool, provider_id).await;

    assert_eq!(first.version, second.version);
    assert_eq!(second.plan, "basic");
}
