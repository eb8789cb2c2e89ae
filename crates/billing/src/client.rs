//! Stripe client and payment provider seam

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stripe::{CancelSubscription, SubscriptionId};
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Price used for relay seat checkouts
    pub price_id: Option<String>,
    pub api_base: String,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;

        Ok(Self {
            secret_key,
            webhook_secret,
            price_id: std::env::var("STRIPE_PRICE_ID").ok().filter(|p| !p.is_empty()),
            api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
        })
    }
}

/// Parameters for a subscription-mode checkout session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub price_id: String,
    pub quantity: i64,
    pub email: String,
    pub relay: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// What the provider reports back after a cancellation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelledSubscription {
    pub id: String,
    pub status: String,
    pub canceled_at: Option<OffsetDateTime>,
}

/// Narrow view of the payment provider used by billing services
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn cancel_subscription(
        &self,
        stripe_subscription: &str,
    ) -> BillingResult<CancelledSubscription>;

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession>;
}

/// Stripe-backed payment provider
#[derive(Clone)]
pub struct StripeClient {
    inner: stripe::Client,
    http: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = stripe::Client::from_url(config.api_base.as_str(), config.secret_key.clone());
        Self {
            inner,
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

fn timestamp(secs: Option<i64>) -> Option<OffsetDateTime> {
    secs.and_then(|s| OffsetDateTime::from_unix_timestamp(s).ok())
}

#[async_trait]
impl PaymentProvider for StripeClient {
    async fn cancel_subscription(
        &self,
        stripe_subscription: &str,
    ) -> BillingResult<CancelledSubscription> {
        let sub_id: SubscriptionId = stripe_subscription.parse().map_err(|_| {
            BillingError::InvalidInput(format!(
                "Malformed Stripe subscription id: {stripe_subscription}"
            ))
        })?;

        let params = CancelSubscription {
            cancellation_details: None,
            invoice_now: None,
            prorate: None,
        };

        let subscription = stripe::Subscription::cancel(&self.inner, &sub_id, params).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Cancelled Stripe subscription"
        );

        Ok(CancelledSubscription {
            id: subscription.id.to_string(),
            status: subscription.status.to_string(),
            canceled_at: timestamp(subscription.canceled_at.or(subscription.cancel_at)),
        })
    }

    /// Checkout sessions go through the form API directly so the metadata and
    /// automatic tax parameters stay explicit
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> BillingResult<CheckoutSession> {
        let quantity = request.quantity.to_string();
        let form_params = [
            ("mode", "subscription"),
            ("line_items[0][price]", request.price_id.as_str()),
            ("line_items[0][quantity]", quantity.as_str()),
            ("success_url", request.success_url.as_str()),
            ("cancel_url", request.cancel_url.as_str()),
            ("automatic_tax[enabled]", "true"),
            ("customer_email", request.email.as_str()),
            ("metadata[email]", request.email.as_str()),
            ("metadata[relay]", request.relay.as_str()),
            ("metadata[quantity]", quantity.as_str()),
        ];

        let url = format!(
            "{}/v1/checkout/sessions",
            self.config.api_base.trim_end_matches('/')
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .form(&form_params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = %status,
                error_body = %error_body,
                "Stripe checkout/sessions API failed"
            );
            return Err(BillingError::StripeApi(format!(
                "Stripe API error ({}): {}",
                status, error_body
            )));
        }

        let session: CheckoutSession = response.json().await.map_err(|e| {
            BillingError::StripeApi(format!("Failed to parse Stripe response: {}", e))
        })?;

        tracing::info!(
            session_id = %session.id,
            relay_id = %request.relay,
            quantity = request.quantity,
            "Created Stripe checkout session"
        );

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_base: String) -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            price_id: Some("price_seat".to_string()),
            api_base,
        }
    }

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            price_id: "price_seat".to_string(),
            quantity: 5,
            email: "owner@example.com".to_string(),
            relay: "relay00000000001".to_string(),
            success_url: "https://relay.example/login".to_string(),
            cancel_url: "https://relay.example/get".to_string(),
        }
    }

    #[tokio::test]
    async fn test_checkout_session_posts_metadata_and_tax() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/checkout/sessions")
            .match_header("authorization", "Bearer sk_test_123")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("mode".into(), "subscription".into()),
                mockito::Matcher::UrlEncoded("automatic_tax[enabled]".into(), "true".into()),
                mockito::Matcher::UrlEncoded(
                    "metadata[email]".into(),
                    "owner@example.com".into(),
                ),
                mockito::Matcher::UrlEncoded("metadata[quantity]".into(), "5".into()),
                mockito::Matcher::UrlEncoded(
                    "success_url".into(),
                    "https://relay.example/login".into(),
                ),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id":"cs_test_1","url":"https://checkout.stripe.com/c/cs_test_1"}"#)
            .create_async()
            .await;

        let client = StripeClient::new(config(server.url()));
        let session = client.create_checkout_session(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url, "https://checkout.stripe.com/c/cs_test_1");
    }

    #[tokio::test]
    async fn test_checkout_session_upstream_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/checkout/sessions")
            .with_status(402)
            .with_body(r#"{"error":{"message":"card declined"}}"#)
            .create_async()
            .await;

        let client = StripeClient::new(config(server.url()));
        let err = client.create_checkout_session(&request()).await.unwrap_err();

        assert!(matches!(err, BillingError::StripeApi(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_cancel_rejects_malformed_id_before_calling_stripe() {
        let client = StripeClient::new(config(DEFAULT_API_BASE.to_string()));
        let err = client.cancel_subscription("not-a-sub").await.unwrap_err();
        assert!(matches!(err, BillingError::InvalidInput(_)));
    }
}
