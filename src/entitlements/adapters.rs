use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use uuid::Uuid;

use crate::config;
use crate::error::{AppError, AppResult};

use super::models::{ConfirmedPurchase, Plan};
use super::policy;

/// key: payment-adapter -> provider integration
/// Verification runs entirely before the engine transaction begins; on any
/// failure here no subscription state has been touched.
#[async_trait]
pub trait PaymentProviderAdapter: Send + Sync {
    async fn verify_order(
        &self,
        provider_id: Uuid,
        order_id: &str,
        plan: Plan,
    ) -> AppResult<ConfirmedPurchase>;
}

/// key: payment-adapter-paypal -> order verification
pub struct PaypalAdapter {
    http: Client,
    api_base: String,
    client_id: String,
    secret: String,
    merchant_email: Option<String>,
}

impl PaypalAdapter {
    pub fn new(
        api_base: String,
        client_id: String,
        secret: String,
        merchant_email: Option<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            api_base,
            client_id,
            secret,
            merchant_email,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            config::PAYPAL_API_BASE.clone(),
            config::PAYPAL_CLIENT_ID.clone(),
            config::PAYPAL_SECRET.clone(),
            config::PAYPAL_MERCHANT_EMAIL.clone(),
        )
    }

    async fn access_token(&self) -> AppResult<String> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?;

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn order_details(&self, order_id: &str, token: &str) -> AppResult<OrderDetails> {
        let response = self
            .http
            .get(format!("{}/v2/checkout/orders/{order_id}", self.api_base))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentProviderAdapter for PaypalAdapter {
    async fn verify_order(
        &self,
        provider_id: Uuid,
        order_id: &str,
        plan: Plan,
    ) -> AppResult<ConfirmedPurchase> {
        let (expected_amount, expected_currency) =
            policy::plan_pricing(plan).ok_or_else(|| {
                AppError::InvalidPlanTransition(format!(
                    "plan `{}` cannot be purchased",
                    plan.as_str()
                ))
            })?;

        let token = self.access_token().await?;
        let order = self.order_details(order_id, &token).await?;

        if order.status != "COMPLETED" {
            return Err(AppError::BadRequest(format!(
                "order `{order_id}` has status `{}`, expected COMPLETED",
                order.status
            )));
        }

        let unit = order.purchase_units.first().ok_or_else(|| {
            AppError::BadGateway(format!("order `{order_id}` carries no purchase units"))
        })?;

        if unit.amount.value != expected_amount
            || unit.amount.currency_code != expected_currency
        {
            return Err(AppError::BadRequest(
                "payment amount or currency mismatch".to_string(),
            ));
        }

        if let Some(merchant) = &self.merchant_email {
            let payee = unit
                .payee
                .as_ref()
                .and_then(|payee| payee.email_address.as_deref());
            if payee != Some(merchant.as_str()) {
                return Err(AppError::BadRequest(
                    "payment did not reach the configured merchant account".to_string(),
                ));
            }
        }

        Ok(ConfirmedPurchase {
            provider_id,
            plan,
            confirmation_id: order_id.to_string(),
            amount: unit.amount.value.clone(),
            currency: unit.amount.currency_code.clone(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderDetails {
    status: String,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnit>,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnit {
    amount: OrderAmount,
    payee: Option<Payee>,
}

#[derive(Debug, Deserialize)]
struct OrderAmount {
    value: String,
    currency_code: String,
}

#[derive(Debug, Deserialize)]
struct Payee {
    email_address: Option<String>,
}
