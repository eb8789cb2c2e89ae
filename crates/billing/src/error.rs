//! Billing error types

use relaybase_shared::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("Invalid webhook signature")]
    WebhookSignatureInvalid,

    #[error("Webhook payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Relay not found: {0}")]
    RelayNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Subscription does not belong to the requesting user")]
    NotOwner,

    #[error("Relay {0} has an active subscription")]
    ActiveSubscription(String),

    #[error("Stripe API error: {0}")]
    StripeApi(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<stripe::StripeError> for BillingError {
    fn from(e: stripe::StripeError) -> Self {
        BillingError::StripeApi(e.to_string())
    }
}

impl From<reqwest::Error> for BillingError {
    fn from(e: reqwest::Error) -> Self {
        BillingError::StripeApi(e.to_string())
    }
}

impl BillingError {
    /// Whether the caller sent something we could not accept (4xx class)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            BillingError::WebhookSignatureInvalid
                | BillingError::PayloadTooLarge { .. }
                | BillingError::InvalidPayload(_)
                | BillingError::InvalidInput(_)
                | BillingError::RelayNotFound(_)
                | BillingError::UserNotFound(_)
                | BillingError::SubscriptionNotFound(_)
                | BillingError::NotOwner
                | BillingError::ActiveSubscription(_)
        )
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
