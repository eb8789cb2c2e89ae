//! Typed webhook events
//!
//! Payloads are decoded once, up front, into the three event shapes the
//! reconciler acts on. Anything else becomes [`WebhookEvent::Ignored`].

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{BillingError, BillingResult};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted(CheckoutCompleted),
    SubscriptionUpdated(SubscriptionChange),
    SubscriptionDeleted(SubscriptionChange),
    Ignored { event_id: String, event_type: String },
}

/// Completed checkout session for a relay seat purchase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCompleted {
    pub event_id: String,
    pub email: String,
    pub relay: String,
    pub quantity: i64,
    pub customer: String,
    pub subscription: String,
}

/// Provider-side state of a subscription at event time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub event_id: String,
    pub subscription: String,
    pub status: String,
    pub quantity: Option<i64>,
    pub cancel_at: Option<OffsetDateTime>,
}

impl SubscriptionChange {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

impl WebhookEvent {
    pub fn event_type(&self) -> &str {
        match self {
            WebhookEvent::CheckoutCompleted(_) => CHECKOUT_SESSION_COMPLETED,
            WebhookEvent::SubscriptionUpdated(_) => SUBSCRIPTION_UPDATED,
            WebhookEvent::SubscriptionDeleted(_) => SUBSCRIPTION_DELETED,
            WebhookEvent::Ignored { event_type, .. } => event_type,
        }
    }

    pub fn event_id(&self) -> &str {
        match self {
            WebhookEvent::CheckoutCompleted(e) => &e.event_id,
            WebhookEvent::SubscriptionUpdated(e) | WebhookEvent::SubscriptionDeleted(e) => {
                &e.event_id
            }
            WebhookEvent::Ignored { event_id, .. } => event_id,
        }
    }

    /// Decode a raw (already verified) webhook payload
    pub fn decode(payload: &[u8]) -> BillingResult<Self> {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| BillingError::InvalidPayload(format!("malformed event: {e}")))?;

        match envelope.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                let session: RawCheckoutSession = envelope.object()?;
                Ok(WebhookEvent::CheckoutCompleted(
                    session.into_checkout(envelope.id)?,
                ))
            }
            SUBSCRIPTION_UPDATED => {
                let subscription: RawSubscription = envelope.object()?;
                Ok(WebhookEvent::SubscriptionUpdated(
                    subscription.into_change(envelope.id),
                ))
            }
            SUBSCRIPTION_DELETED => {
                let subscription: RawSubscription = envelope.object()?;
                Ok(WebhookEvent::SubscriptionDeleted(
                    subscription.into_change(envelope.id),
                ))
            }
            _ => Ok(WebhookEvent::Ignored {
                event_id: envelope.id,
                event_type: envelope.event_type,
            }),
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: Value,
}

impl Envelope {
    fn object<T: serde::de::DeserializeOwned>(&self) -> BillingResult<T> {
        let object = self.data.as_ref().map(|d| d.object.clone()).ok_or_else(|| {
            BillingError::InvalidPayload(format!("{} event has no data.object", self.event_type))
        })?;
        serde_json::from_value(object).map_err(|e| {
            BillingError::InvalidPayload(format!("{} object: {e}", self.event_type))
        })
    }
}

#[derive(Deserialize)]
struct RawCheckoutSession {
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl RawCheckoutSession {
    fn metadata_str(&self, key: &str) -> BillingResult<String> {
        match self.metadata.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(BillingError::InvalidPayload(format!(
                "checkout session metadata is missing {key}"
            ))),
        }
    }

    /// Metadata values are strings on the wire, but hand-built sessions may carry numbers
    fn metadata_quantity(&self) -> BillingResult<i64> {
        let quantity = match self.metadata.get("quantity") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        };
        match quantity {
            Some(q) if q >= 1 => Ok(q),
            _ => Err(BillingError::InvalidPayload(
                "checkout session metadata quantity must be a positive integer".to_string(),
            )),
        }
    }

    fn into_checkout(self, event_id: String) -> BillingResult<CheckoutCompleted> {
        let email = self.metadata_str("email")?;
        let relay = self.metadata_str("relay")?;
        let quantity = self.metadata_quantity()?;
        let subscription = self.subscription.clone().filter(|s| !s.is_empty()).ok_or_else(
            || BillingError::InvalidPayload("checkout session has no subscription".to_string()),
        )?;

        Ok(CheckoutCompleted {
            event_id,
            email,
            relay,
            quantity,
            customer: self.customer.unwrap_or_default(),
            subscription,
        })
    }
}

#[derive(Deserialize)]
struct RawSubscription {
    id: String,
    status: String,
    #[serde(default)]
    quantity: Option<i64>,
    #[serde(default)]
    cancel_at: Option<i64>,
    #[serde(default)]
    items: Option<RawItems>,
}

#[derive(Deserialize)]
struct RawItems {
    #[serde(default)]
    data: Vec<RawItem>,
}

#[derive(Deserialize)]
struct RawItem {
    #[serde(default)]
    quantity: Option<i64>,
}

impl RawSubscription {
    fn into_change(self, event_id: String) -> SubscriptionChange {
        let quantity = self.quantity.or_else(|| {
            self.items
                .as_ref()
                .and_then(|items| items.data.first())
                .and_then(|item| item.quantity)
        });

        SubscriptionChange {
            event_id,
            subscription: self.id,
            status: self.status,
            quantity,
            cancel_at: self
                .cancel_at
                .and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok()),
        }
    }
}
