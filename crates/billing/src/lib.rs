// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Relaybase Billing Module
//!
//! Reconciles relays, users and subscriptions against Stripe.
//!
//! ## Features
//!
//! - **Webhooks**: Verify and apply checkout completion, subscription update and
//!   subscription deletion events
//! - **Cancellation**: Cancel a subscription on behalf of its holder
//! - **Checkout**: Start a seat checkout for a relay
//! - **Invariants**: Audit cross-record consistency

pub mod checkout;
pub mod client;
pub mod error;
pub mod events;
pub mod invariants;
pub mod subscriptions;
pub mod webhooks;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use relaybase_shared::RecordStore;

// Checkout
pub use checkout::CheckoutService;

// Client
pub use client::{
    CancelledSubscription, CheckoutRequest, CheckoutSession, PaymentProvider, StripeClient,
    StripeConfig,
};

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use events::{CheckoutCompleted, SubscriptionChange, WebhookEvent};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Subscriptions
pub use subscriptions::{ExpandedSubscription, SubscriptionExpand, SubscriptionService};

// Webhooks
pub use webhooks::{WebhookHandler, WebhookOutcome, MAX_PAYLOAD_BYTES};

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub checkout: CheckoutService,
    pub subscriptions: SubscriptionService,
    pub webhooks: WebhookHandler,
}

impl BillingService {
    /// Create a new billing service from environment variables
    pub fn from_env(store: Arc<dyn RecordStore>, domain: &str) -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?, domain, store))
    }

    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, domain: &str, store: Arc<dyn RecordStore>) -> Self {
        let webhook_secret = config.webhook_secret.clone();
        let price_id = config.price_id.clone();
        let stripe: Arc<dyn PaymentProvider> = Arc::new(StripeClient::new(config));
        Self::with_provider(stripe, &webhook_secret, price_id, domain, store)
    }

    /// Create a billing service over any payment provider
    pub fn with_provider(
        provider: Arc<dyn PaymentProvider>,
        webhook_secret: &str,
        price_id: Option<String>,
        domain: &str,
        store: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            checkout: CheckoutService::new(provider.clone(), store.clone(), price_id, domain),
            subscriptions: SubscriptionService::new(provider, store.clone()),
            webhooks: WebhookHandler::new(store, webhook_secret),
        }
    }
}
