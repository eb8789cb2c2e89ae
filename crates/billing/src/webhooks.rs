//! Stripe webhook handling
//!
//! Verifies the `Stripe-Signature` header, decodes the payload into a
//! [`WebhookEvent`] and reconciles relays, users and subscriptions against it.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use relaybase_shared::{new_record_id, RecordStore, StoreResult, Subscription, FREE_TIER_USER_LIMIT};
use sha2::Sha256;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};
use crate::events::{CheckoutCompleted, SubscriptionChange, WebhookEvent};

type HmacSha256 = Hmac<Sha256>;

/// Largest webhook body accepted
pub const MAX_PAYLOAD_BYTES: usize = 65536;

/// Allowed clock skew between the signature timestamp and now
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// What a handled event changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    CheckoutRecorded { subscription_id: String },
    SubscriptionsUpdated { count: usize },
    SubscriptionsDeleted { count: usize },
    Ignored,
}

/// Webhook handler for Stripe events
pub struct WebhookHandler {
    store: Arc<dyn RecordStore>,
    webhook_secret: String,
}

/// Map a store lookup miss to a domain error, keep everything else as a store error
fn lookup<T>(result: StoreResult<T>, missing: impl FnOnce() -> BillingError) -> BillingResult<T> {
    match result {
        Err(e) if e.is_not_found() => Err(missing()),
        other => other.map_err(BillingError::from),
    }
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn RecordStore>, webhook_secret: impl Into<String>) -> Self {
        Self {
            store,
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify and decode a Stripe webhook payload
    pub fn verify_event(&self, payload: &[u8], signature: &str) -> BillingResult<WebhookEvent> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.verify_event_at(payload, signature, now)
    }

    pub fn verify_event_at(
        &self,
        payload: &[u8],
        signature: &str,
        now: i64,
    ) -> BillingResult<WebhookEvent> {
        if payload.len() > MAX_PAYLOAD_BYTES {
            tracing::warn!(payload_len = payload.len(), "Webhook payload too large");
            return Err(BillingError::PayloadTooLarge {
                limit: MAX_PAYLOAD_BYTES,
            });
        }

        self.verify_signature(payload, signature, now)?;

        let event = WebhookEvent::decode(payload)?;
        tracing::debug!(
            event_type = %event.event_type(),
            event_id = %event.event_id(),
            "Webhook signature verified"
        );
        Ok(event)
    }

    /// Check a `t=<unix>,v1=<hex>[,v1=<hex>...]` header against the payload
    fn verify_signature(&self, payload: &[u8], header: &str, now: i64) -> BillingResult<()> {
        let mut timestamp: Option<&str> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for part in header.split(',') {
            if let Some((key, value)) = part.trim().split_once('=') {
                match key {
                    "t" => timestamp = Some(value),
                    "v1" => candidates.push(value),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;
        let signed_at: i64 = timestamp.parse().map_err(|_| {
            tracing::warn!("Malformed timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        if candidates.is_empty() {
            tracing::warn!("Missing v1 signature in signature header");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        if now.abs_diff(signed_at) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
            tracing::warn!(
                timestamp = signed_at,
                now = now,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| BillingError::Config("Invalid webhook secret".to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = candidates
            .iter()
            .filter_map(|candidate| hex::decode(candidate).ok())
            .any(|candidate| mac.clone().verify_slice(&candidate).is_ok());

        if !matched {
            tracing::warn!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        Ok(())
    }

    /// Apply a verified event
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<WebhookOutcome> {
        match event {
            WebhookEvent::CheckoutCompleted(checkout) => {
                self.handle_checkout_completed(checkout).await
            }
            WebhookEvent::SubscriptionUpdated(change) => {
                self.handle_subscription_updated(change).await
            }
            WebhookEvent::SubscriptionDeleted(change) => {
                self.handle_subscription_deleted(change).await
            }
            WebhookEvent::Ignored {
                event_id,
                event_type,
            } => {
                tracing::info!(
                    event_type = %event_type,
                    event_id = %event_id,
                    "Received unhandled Stripe event type - no handler configured"
                );
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Redelivery of the same session inserts another row; the invariant
    /// checker reports relays left with more than one active subscription.
    async fn handle_checkout_completed(
        &self,
        checkout: CheckoutCompleted,
    ) -> BillingResult<WebhookOutcome> {
        let relay = lookup(self.store.find_relay(&checkout.relay).await, || {
            BillingError::RelayNotFound(checkout.relay.clone())
        })?;
        let user = lookup(self.store.find_user_by_email(&checkout.email).await, || {
            BillingError::UserNotFound(checkout.email.clone())
        })?;

        self.store
            .set_relay_user_limit(&relay.id, checkout.quantity)
            .await?;

        if !user.paid {
            self.store.set_user_paid(&user.id, true).await?;
        }

        let now = OffsetDateTime::now_utc();
        let subscription = Subscription {
            id: new_record_id(),
            active: true,
            relay: relay.id.clone(),
            user: user.id.clone(),
            stripe_customer: checkout.customer,
            stripe_subscription: checkout.subscription,
            stripe_quantity: checkout.quantity,
            stripe_cancel_at: None,
            created: now,
            updated: now,
        };
        self.store.insert_subscription(&subscription).await?;

        tracing::info!(
            event_id = %checkout.event_id,
            relay_id = %relay.id,
            user_id = %user.id,
            quantity = checkout.quantity,
            subscription_id = %subscription.id,
            "Recorded checkout subscription"
        );

        Ok(WebhookOutcome::CheckoutRecorded {
            subscription_id: subscription.id,
        })
    }

    async fn handle_subscription_updated(
        &self,
        change: SubscriptionChange,
    ) -> BillingResult<WebhookOutcome> {
        let rows = self
            .store
            .find_subscriptions_by_stripe_id(&change.subscription)
            .await?;
        if rows.is_empty() {
            return Err(BillingError::SubscriptionNotFound(change.subscription));
        }

        if change.quantity.is_none() {
            tracing::warn!(
                event_id = %change.event_id,
                stripe_subscription = %change.subscription,
                "Subscription update carries no quantity, keeping stored seat count"
            );
        }

        let count = rows.len();
        for mut row in rows {
            row.active = change.is_active();
            row.stripe_cancel_at = change.cancel_at;
            if let Some(quantity) = change.quantity {
                row.stripe_quantity = quantity;
            }
            self.store.update_subscription(&row).await?;

            if let Some(quantity) = change.quantity {
                self.set_relay_limit_if_present(&row.relay, quantity).await?;
            }
        }

        tracing::info!(
            event_id = %change.event_id,
            stripe_subscription = %change.subscription,
            status = %change.status,
            quantity = ?change.quantity,
            rows = count,
            "Synced subscription update"
        );

        Ok(WebhookOutcome::SubscriptionsUpdated { count })
    }

    async fn handle_subscription_deleted(
        &self,
        change: SubscriptionChange,
    ) -> BillingResult<WebhookOutcome> {
        let rows = self
            .store
            .find_subscriptions_by_stripe_id(&change.subscription)
            .await?;
        if rows.is_empty() {
            return Err(BillingError::SubscriptionNotFound(change.subscription));
        }

        let count = rows.len();
        for row in rows {
            self.store.delete_subscription(&row.id).await?;
            self.set_relay_limit_if_present(&row.relay, FREE_TIER_USER_LIMIT)
                .await?;
        }

        tracing::info!(
            event_id = %change.event_id,
            stripe_subscription = %change.subscription,
            rows = count,
            "Removed deleted subscription"
        );

        Ok(WebhookOutcome::SubscriptionsDeleted { count })
    }

    async fn set_relay_limit_if_present(&self, relay_id: &str, user_limit: i64) -> BillingResult<()> {
        match self.store.set_relay_user_limit(relay_id, user_limit).await {
            Err(e) if e.is_not_found() => {
                tracing::warn!(
                    relay_id = %relay_id,
                    "Subscription points at a relay that no longer exists"
                );
                Ok(())
            }
            other => other.map_err(BillingError::from),
        }
    }
}
