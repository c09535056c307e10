use once_cell::sync::Lazy;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| {
    std::env::var("ALLOW_MIGRATION_FAILURE")
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
});

/// PayPal REST endpoint. Defaults to the sandbox host.
pub static PAYPAL_API_BASE: Lazy<String> = Lazy::new(|| {
    std::env::var("PAYPAL_API_BASE")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "https://api-m.sandbox.paypal.com".to_string())
});

/// Client id used for PayPal order verification. Must be set via `PAYPAL_CLIENT_ID`.
pub static PAYPAL_CLIENT_ID: Lazy<String> =
    Lazy::new(|| std::env::var("PAYPAL_CLIENT_ID").expect("PAYPAL_CLIENT_ID must be set"));

/// Client secret used for PayPal order verification. Must be set via `PAYPAL_SECRET`.
pub static PAYPAL_SECRET: Lazy<String> =
    Lazy::new(|| std::env::var("PAYPAL_SECRET").expect("PAYPAL_SECRET must be set"));

/// Optional merchant account that verified orders must have been paid to.
pub static PAYPAL_MERCHANT_EMAIL: Lazy<Option<String>> =
    Lazy::new(|| read_optional_env("PAYPAL_MERCHANT_EMAIL"));

/// key: entitlement-config -> expiry sweep cadence
pub static EXPIRY_SCAN_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("ENTITLEMENT_EXPIRY_SCAN_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(300)
});

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
