use garage_backend::entitlements::{PaymentProviderAdapter, PaypalAdapter, Plan};
use garage_backend::error::AppError;
use httpmock::prelude::*;
use serde_json::json;
use uuid::Uuid;

// key: paypal-adapter-tests -> order verification matrix

fn adapter_for(server: &MockServer, merchant_email: Option<&str>) -> PaypalAdapter {
    PaypalAdapter::new(
        server.base_url(),
        "client-id".to_string(),
        "client-secret".to_string(),
        merchant_email.map(str::to_string),
    )
}

fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(POST).path("/v1/oauth2/token");
        then.status(200).json_body(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
        }));
    })
}

fn order_body(status: &str, amount: &str, currency: &str, payee: &str) -> serde_json::Value {
    json!({
        "id": "ORDER-1",
        "status": status,
        "purchase_units": [{
            "amount": { "value": amount, "currency_code": currency },
            "payee": { "email_address": payee },
        }],
    })
}

#[tokio::test]
async fn completed_order_yields_confirmed_purchase() {
    let server = MockServer::start_async().await;
    let token = mock_token(&server);
    let order = server.mock(|when, then| {
        when.method(GET)
            .path("/v2/checkout/orders/ORDER-1")
            .header("authorization", "Bearer test-token");
        then.status(200)
            .json_body(order_body("COMPLETED", "50.00", "USD", "merchant@example.com"));
    });

    let adapter = adapter_for(&server, Some("merchant@example.com"));
    let provider_id = Uuid::new_v4();
    let confirmed = adapter
        .verify_order(provider_id, "ORDER-1", Plan::Standard)
        .await
        .unwrap();

    assert_eq!(confirmed.provider_id, provider_id);
    assert_eq!(confirmed.plan, Plan::Standard);
    assert_eq!(confirmed.confirmation_id, "ORDER-1");
    assert_eq!(confirmed.amount, "50.00");
    assert_eq!(confirmed.currency, "USD");
    token.assert();
    order.assert();
}

#[tokio::test]
async fn amount_mismatch_is_rejected() {
    let server = MockServer::start_async().await;
    mock_token(&server);
    server.mock(|when, then| {
        when.method(GET).path("/v2/checkout/orders/ORDER-1");
        then.status(200)
            .json_body(order_body("COMPLETED", "10.00", "USD", "merchant@example.com"));
    });

    let adapter = adapter_for(&server, None);
    let err = adapter
        .verify_order(Uuid::new_v4(), "ORDER-1", Plan::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn uncompleted_order_is_rejected() {
    let server = MockServer::start_async().await;
    mock_token(&server);
    server.mock(|when, then| {
        when.method(GET).path("/v2/checkout/orders/ORDER-1");
        then.status(200)
            .json_body(order_body("CREATED", "100.00", "USD", "merchant@example.com"));
    });

    let adapter = adapter_for(&server, None);
    let err = adapter
        .verify_order(Uuid::new_v4(), "ORDER-1", Plan::Premium)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn order_paid_to_another_merchant_is_rejected() {
    let server = MockServer::start_async().await;
    mock_token(&server);
    server.mock(|when, then| {
        when.method(GET).path("/v2/checkout/orders/ORDER-1");
        then.status(200)
            .json_body(order_body("COMPLETED", "50.00", "USD", "other@example.com"));
    });

    let adapter = adapter_for(&server, Some("merchant@example.com"));
    let err = adapter
        .verify_order(Uuid::new_v4(), "ORDER-1", Plan::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[tokio::test]
async fn token_failure_surfaces_as_retryable_error() {
    let server = MockServer::start_async().await;
    server.mock(|when, then| {
        when.method(POST).path("/v1/oauth2/token");
        then.status(500);
    });

    let adapter = adapter_for(&server, None);
    let err = adapter
        .verify_order(Uuid::new_v4(), "ORDER-1", Plan::Standard)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Payment(_)));
}

#[tokio::test]
async fn unpriced_plans_never_reach_the_network() {
    let server = MockServer::start_async().await;
    let token = mock_token(&server);

    let adapter = adapter_for(&server, None);
    let err = adapter
        .verify_order(Uuid::new_v4(), "ORDER-1", Plan::Basic)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidPlanTransition(_)));
    token.assert_hits(0);
}
