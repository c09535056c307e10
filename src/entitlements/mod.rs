pub mod adapters;
pub mod api;
pub mod models;
pub mod policy;
pub mod scheduler;
pub mod service;

pub use adapters::{PaymentProviderAdapter, PaypalAdapter};
pub use models::{ConfirmedPurchase, EntitlementRecord, Plan, SubscriptionStatus};
pub use scheduler::{process_tick as run_expiry_sweep_tick, spawn as spawn_expiry_sweeper};
pub use service::{EntitlementService, PlanActivation};
