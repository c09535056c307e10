use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::policy;

/// key: entitlement-plan -> discrete tiers
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    None,
    Basic,
    Standard,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::None => "none",
            Plan::Basic => "basic",
            Plan::Standard => "standard",
            Plan::Premium => "premium",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Plan::None),
            "basic" => Some(Plan::Basic),
            "standard" => Some(Plan::Standard),
            "premium" => Some(Plan::Premium),
            _ => None,
        }
    }

    pub fn is_paid(&self) -> bool {
        matches!(self, Plan::Standard | Plan::Premium)
    }
}

/// key: entitlement-record -> per-provider subscription state
/// One row per provider: current plan, term window, usage counter, and the
/// cached `searchable` flag the search component filters on.
#[derive(Clone, Debug, Serialize)]
pub struct EntitlementRecord {
    pub provider_id: Uuid,
    pub plan: Plan,
    pub cycle_start: DateTime<Utc>,
    pub cycle_end: Option<DateTime<Utc>>,
    pub active: bool,
    pub used_this_cycle: i64,
    pub searchable: bool,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitlementRecord {
    /// A record with `active = true` and a lapsed `cycle_end` is stale and
    /// must be reconciled before any quota decision is made from it.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        match self.cycle_end {
            Some(end) => end <= now,
            None => false,
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> SubscriptionStatus {
        let days_remaining = policy::days_remaining(self.cycle_end, now);
        SubscriptionStatus {
            plan: self.plan,
            booking_limit: policy::booking_limit(self.plan),
            bookings_used: self.used_this_cycle,
            days_remaining,
            is_limit_reached: policy::limit_reached(self.plan, self.used_this_cycle),
            next_renewal_date: self.cycle_end,
            should_warn: policy::should_warn(self.plan, days_remaining),
            searchable: self.searchable,
        }
    }
}

/// key: entitlement-status-view -> provider dashboard contract
/// Flat read model returned by the status endpoint; `booking_limit` is null
/// for unlimited plans and `next_renewal_date` is null when no term is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub plan: Plan,
    pub booking_limit: Option<i64>,
    pub bookings_used: i64,
    pub days_remaining: i64,
    pub is_limit_reached: bool,
    pub next_renewal_date: Option<DateTime<Utc>>,
    pub should_warn: bool,
    pub searchable: bool,
}

/// key: entitlement-confirmed-purchase -> adapter event
/// Produced by a payment adapter only after the order has been validated
/// against the price table; `confirmation_id` dedupes replays.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmedPurchase {
    pub provider_id: Uuid,
    pub plan: Plan,
    pub confirmation_id: String,
    pub amount: String,
    pub currency: String,
}
