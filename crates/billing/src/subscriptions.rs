//! Subscription management

use std::sync::Arc;

use relaybase_shared::{RecordStore, Relay, Subscription, User};
use serde::Serialize;
use time::OffsetDateTime;

use crate::client::PaymentProvider;
use crate::error::{BillingError, BillingResult};

/// Subscription with its user and relay records inlined
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpandedSubscription {
    #[serde(flatten)]
    pub subscription: Subscription,
    pub expand: SubscriptionExpand,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionExpand {
    pub user: User,
    /// Absent when the relay was deleted after the subscription lapsed
    pub relay: Option<Relay>,
}

pub struct SubscriptionService {
    provider: Arc<dyn PaymentProvider>,
    store: Arc<dyn RecordStore>,
}

impl SubscriptionService {
    pub fn new(provider: Arc<dyn PaymentProvider>, store: Arc<dyn RecordStore>) -> Self {
        Self { provider, store }
    }

    /// Cancel a subscription on behalf of the user who holds it
    ///
    /// Ownership is checked before Stripe is called, so a foreign id never
    /// reaches the provider.
    pub async fn cancel_for_user(
        &self,
        subscription_id: &str,
        user_id: &str,
    ) -> BillingResult<ExpandedSubscription> {
        let mut subscription = match self.store.find_subscription(subscription_id).await {
            Ok(s) => s,
            Err(e) if e.is_not_found() => {
                return Err(BillingError::SubscriptionNotFound(
                    subscription_id.to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        if subscription.user != user_id {
            tracing::warn!(
                subscription_id = %subscription_id,
                user_id = %user_id,
                "Cancellation requested by a user who does not hold the subscription"
            );
            return Err(BillingError::NotOwner);
        }

        let cancelled = self
            .provider
            .cancel_subscription(&subscription.stripe_subscription)
            .await?;

        subscription.active = false;
        subscription.stripe_cancel_at = cancelled
            .canceled_at
            .or_else(|| Some(OffsetDateTime::now_utc()));
        self.store.update_subscription(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.id,
            stripe_subscription = %cancelled.id,
            status = %cancelled.status,
            relay_id = %subscription.relay,
            "Cancelled subscription"
        );

        self.expand(subscription).await
    }

    /// Refuse to let a relay go while it is still being billed
    pub async fn ensure_relay_deletable(&self, relay_id: &str) -> BillingResult<()> {
        let active = self.store.count_active_subscriptions(relay_id).await?;
        if active > 0 {
            tracing::info!(
                relay_id = %relay_id,
                active_subscriptions = active,
                "Relay deletion blocked by active subscription"
            );
            return Err(BillingError::ActiveSubscription(relay_id.to_string()));
        }
        Ok(())
    }

    pub async fn expand(&self, subscription: Subscription) -> BillingResult<ExpandedSubscription> {
        let user = match self.store.find_user(&subscription.user).await {
            Ok(u) => u,
            Err(e) if e.is_not_found() => {
                return Err(BillingError::UserNotFound(subscription.user.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        let relay = match self.store.find_relay(&subscription.relay).await {
            Ok(r) => Some(r),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        Ok(ExpandedSubscription {
            subscription,
            expand: SubscriptionExpand { user, relay },
        })
    }
}
