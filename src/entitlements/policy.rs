use chrono::{DateTime, Utc};

use super::models::Plan;

/// key: quota-policy -> plan limits,renewal windows
/// Pure decision rules; every function here is side-effect free so the
/// engine can consult them inside a row-scoped transaction.

/// Length of every paid term and usage-counting window.
pub const CYCLE_DAYS: i64 = 30;

pub const BASIC_BOOKING_LIMIT: i64 = 5;
pub const STANDARD_BOOKING_LIMIT: i64 = 50;

/// Paid plans warn the provider this many days before the term lapses.
pub const RENEWAL_WARNING_DAYS: i64 = 5;

/// Bookings allowed per cycle; `None` means unlimited.
pub fn booking_limit(plan: Plan) -> Option<i64> {
    match plan {
        Plan::None => Some(0),
        Plan::Basic => Some(BASIC_BOOKING_LIMIT),
        Plan::Standard => Some(STANDARD_BOOKING_LIMIT),
        Plan::Premium => None,
    }
}

pub fn limit_reached(plan: Plan, used: i64) -> bool {
    match booking_limit(plan) {
        Some(limit) => used >= limit,
        None => false,
    }
}

/// Whole days until the term lapses; 0 once it has, or when no term is set.
pub fn days_remaining(cycle_end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> i64 {
    cycle_end
        .map(|end| (end - now).num_days().max(0))
        .unwrap_or(0)
}

/// Basic never warns; its term renews silently on the next status read.
pub fn should_warn(plan: Plan, days_remaining: i64) -> bool {
    plan.is_paid() && days_remaining <= RENEWAL_WARNING_DAYS
}

/// Expected charge for purchasable plans, as (amount, currency).
pub fn plan_pricing(plan: Plan) -> Option<(&'static str, &'static str)> {
    match plan {
        Plan::Standard => Some(("50.00", "USD")),
        Plan::Premium => Some(("100.00", "USD")),
        Plan::None | Plan::Basic => None,
    }
}
