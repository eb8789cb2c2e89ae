//! Billing Invariants Module
//!
//! Runnable consistency checks across relays, subscriptions and memberships.
//! Webhook reconciliation and seat admission are both read-then-write with no
//! lock spanning the two steps, so duplicate deliveries and racing
//! admissions can leave state these checks will flag.
//!
//! Checks only read, never write.

use std::collections::HashMap;
use std::sync::Arc;

use relaybase_shared::{RecordStore, RoleFilter, Subscription};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::BillingResult;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Relay(s) affected
    pub relay_ids: Vec<String>,
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Customer may be charged twice
    Critical,
    /// Seat count disagrees with what is being billed
    High,
    /// Potential issue, should investigate
    Medium,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    pub checks_run: usize,
    pub checks_passed: usize,
    pub checks_failed: usize,
    pub violations: Vec<InvariantViolation>,
    pub healthy: bool,
}

const CHECKS: [&str; 3] = [
    "single_active_subscription",
    "user_limit_matches_subscription",
    "membership_within_user_limit",
];

/// Service for running billing invariant checks
pub struct InvariantChecker {
    store: Arc<dyn RecordStore>,
}

impl InvariantChecker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(&self) -> BillingResult<InvariantCheckSummary> {
        let now = OffsetDateTime::now_utc();
        let mut violations = Vec::new();

        violations.extend(self.check_single_active_subscription().await?);
        violations.extend(self.check_user_limit_matches_subscription().await?);
        violations.extend(self.check_membership_within_user_limit().await?);

        let checks_run = CHECKS.len();
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    async fn active_by_relay(&self) -> BillingResult<HashMap<String, Vec<Subscription>>> {
        let mut by_relay: HashMap<String, Vec<Subscription>> = HashMap::new();
        for sub in self.store.list_active_subscriptions().await? {
            by_relay.entry(sub.relay.clone()).or_default().push(sub);
        }
        Ok(by_relay)
    }

    /// Invariant 1: At most 1 active subscription per relay
    ///
    /// A redelivered checkout completion inserts a second row.
    async fn check_single_active_subscription(&self) -> BillingResult<Vec<InvariantViolation>> {
        let mut violations: Vec<InvariantViolation> = self
            .active_by_relay()
            .await?
            .into_iter()
            .filter(|(_, subs)| subs.len() > 1)
            .map(|(relay_id, subs)| InvariantViolation {
                invariant: "single_active_subscription".to_string(),
                description: format!(
                    "Relay has {} active subscriptions (expected 1)",
                    subs.len()
                ),
                context: serde_json::json!({
                    "subscription_count": subs.len(),
                    "stripe_subscriptions": subs
                        .iter()
                        .map(|s| s.stripe_subscription.as_str())
                        .collect::<Vec<_>>(),
                }),
                relay_ids: vec![relay_id],
                severity: ViolationSeverity::Critical,
            })
            .collect();
        violations.sort_by(|a, b| a.relay_ids.cmp(&b.relay_ids));
        Ok(violations)
    }

    /// Invariant 2: A billed relay's seat limit equals the billed quantity
    async fn check_user_limit_matches_subscription(
        &self,
    ) -> BillingResult<Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        for (relay_id, subs) in self.active_by_relay().await? {
            let Some(latest) = subs.iter().max_by_key(|s| s.created) else {
                continue;
            };
            let relay = match self.store.find_relay(&relay_id).await {
                Ok(r) => r,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };

            if relay.user_limit != latest.stripe_quantity {
                violations.push(InvariantViolation {
                    invariant: "user_limit_matches_subscription".to_string(),
                    relay_ids: vec![relay.id.clone()],
                    description: format!(
                        "Relay '{}' allows {} seats but is billed for {}",
                        relay.name, relay.user_limit, latest.stripe_quantity
                    ),
                    context: serde_json::json!({
                        "user_limit": relay.user_limit,
                        "stripe_quantity": latest.stripe_quantity,
                        "stripe_subscription": latest.stripe_subscription,
                    }),
                    severity: ViolationSeverity::High,
                });
            }
        }

        violations.sort_by(|a, b| a.relay_ids.cmp(&b.relay_ids));
        Ok(violations)
    }

    /// Invariant 3: Membership never exceeds the seat limit
    ///
    /// Two admissions racing for the last seat can both pass the count check.
    async fn check_membership_within_user_limit(&self) -> BillingResult<Vec<InvariantViolation>> {
        let mut violations = Vec::new();

        for relay in self.store.list_relays().await? {
            let members = self.store.count_roles(&RoleFilter::relay(&relay.id)).await?;
            if members > relay.user_limit {
                violations.push(InvariantViolation {
                    invariant: "membership_within_user_limit".to_string(),
                    relay_ids: vec![relay.id.clone()],
                    description: format!(
                        "Relay '{}' has {} members but a limit of {}",
                        relay.name, members, relay.user_limit
                    ),
                    context: serde_json::json!({
                        "members": members,
                        "user_limit": relay.user_limit,
                    }),
                    severity: ViolationSeverity::Medium,
                });
            }
        }

        Ok(violations)
    }

    /// Run a single invariant check by name
    pub async fn run_check(&self, name: &str) -> BillingResult<Vec<InvariantViolation>> {
        match name {
            "single_active_subscription" => self.check_single_active_subscription().await,
            "user_limit_matches_subscription" => {
                self.check_user_limit_matches_subscription().await
            }
            "membership_within_user_limit" => self.check_membership_within_user_limit().await,
            _ => Ok(vec![]),
        }
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        CHECKS.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_relay, seed_subscription, seed_user};
    use relaybase_shared::{new_record_id, MemoryStore, RelayRole, RoleName};

    #[test]
    fn test_violation_severity_display() {
        assert_eq!(ViolationSeverity::Critical.to_string(), "CRITICAL");
        assert_eq!(ViolationSeverity::High.to_string(), "HIGH");
        assert_eq!(ViolationSeverity::Medium.to_string(), "MEDIUM");
    }

    #[test]
    fn test_available_checks() {
        let checks = InvariantChecker::available_checks();
        assert_eq!(checks.len(), 3);
        assert!(checks.contains(&"single_active_subscription"));
        assert!(checks.contains(&"membership_within_user_limit"));
    }

    #[tokio::test]
    async fn test_clean_store_is_healthy() {
        let store = Arc::new(MemoryStore::new());
        let owner = seed_user(&store, "owner@example.com").await;
        let relay = seed_relay(&store, &owner).await;
        store.set_relay_user_limit(&relay.id, 5).await.unwrap();
        seed_subscription(&store, &relay, &owner, "sub_1", true).await;

        let summary = InvariantChecker::new(store).run_all_checks().await.unwrap();

        assert!(summary.healthy, "{:?}", summary.violations);
        assert_eq!(summary.checks_passed, 3);
    }

    #[tokio::test]
    async fn test_duplicate_active_subscriptions_flagged() {
        let store = Arc::new(MemoryStore::new());
        let owner = seed_user(&store, "owner@example.com").await;
        let relay = seed_relay(&store, &owner).await;
        store.set_relay_user_limit(&relay.id, 5).await.unwrap();
        seed_subscription(&store, &relay, &owner, "sub_1", true).await;
        seed_subscription(&store, &relay, &owner, "sub_1", true).await;

        let checker = InvariantChecker::new(store);
        let violations = checker
            .run_check("single_active_subscription")
            .await
            .unwrap();

        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].relay_ids, vec![relay.id]);
        assert_eq!(violations[0].severity, ViolationSeverity::Critical);
    }

    #[tokio::test]
    async fn test_limit_drift_and_overfull_relay_flagged() {
        let store = Arc::new(MemoryStore::new());
        let owner = seed_user(&store, "owner@example.com").await;
        let relay = seed_relay(&store, &owner).await;
        // seeded subscriptions bill 5 seats, relay still has the free limit
        seed_subscription(&store, &relay, &owner, "sub_1", true).await;

        let now = OffsetDateTime::now_utc();
        for _ in 0..4 {
            store
                .insert_role(&RelayRole {
                    id: new_record_id(),
                    relay: relay.id.clone(),
                    user: new_record_id(),
                    role: RoleName::Member,
                    created: now,
                    updated: now,
                })
                .await
                .unwrap();
        }

        let summary = InvariantChecker::new(store).run_all_checks().await.unwrap();

        assert!(!summary.healthy);
        assert_eq!(summary.checks_failed, 2);
        let names: Vec<_> = summary.violations.iter().map(|v| v.invariant.as_str()).collect();
        assert!(names.contains(&"user_limit_matches_subscription"));
        assert!(names.contains(&"membership_within_user_limit"));
    }
}
