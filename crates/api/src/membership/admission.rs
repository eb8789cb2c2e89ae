//! Membership admission control
//!
//! Enforces the per-owner relay cap and the per-relay seat limit. Both checks
//! are read-count-then-write with no lock held across the two steps; racing
//! admissions for the last seat can both succeed and are reported by the
//! invariant checker.

use std::sync::Arc;

use relaybase_billing::{BillingError, SubscriptionService};
use relaybase_shared::{
    new_record_id, RecordStore, Relay, RelayInvitation, RelayRole, RoleFilter, RoleName,
    StoreError, User, FREE_TIER_USER_LIMIT,
};
use serde::Serialize;
use time::OffsetDateTime;

use super::invitation_key::generate_invitation_key;

/// Maximum number of relays a single identity may own
pub const MAX_OWNED_RELAYS: i64 = 25;

const INVITATION_KEY_ATTEMPTS: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("You can own at most {limit} relays")]
    OwnerLimit { limit: i64 },
    #[error("Relay has reached its limit of {limit} members")]
    SeatLimit { relay: String, limit: i64 },
    #[error("Only relay owners and admins can manage members")]
    NotRelayManager,
    #[error("Only the relay owner can do this")]
    NotRelayOwner,
    #[error("Relay not found: {0}")]
    RelayNotFound(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error("Invitation not found")]
    InvitationNotFound,
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Relay plus the records created alongside it
#[derive(Debug, Clone, Serialize)]
pub struct CreatedRelay {
    #[serde(flatten)]
    pub relay: Relay,
    pub owner_role: RelayRole,
    pub invitation: RelayInvitation,
}

/// Relay with its memberships and invitations inlined
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedRelay {
    #[serde(flatten)]
    pub relay: Relay,
    pub expand: RelayExpand,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayExpand {
    pub relay_roles: Vec<RelayRole>,
    pub relay_invitations: Vec<RelayInvitation>,
}

pub struct AdmissionController {
    store: Arc<dyn RecordStore>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    async fn find_relay(&self, relay_id: &str) -> Result<Relay, AdmissionError> {
        match self.store.find_relay(relay_id).await {
            Err(e) if e.is_not_found() => Err(AdmissionError::RelayNotFound(relay_id.to_string())),
            other => Ok(other?),
        }
    }

    /// Create a relay owned by `creator`
    ///
    /// The owner cap is checked before anything is written. The Owner role and
    /// the default Member invitation are written after the relay exists.
    pub async fn create_relay(
        &self,
        creator: &User,
        name: &str,
    ) -> Result<CreatedRelay, AdmissionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AdmissionError::InvalidInput("relay name is required".to_string()));
        }

        let owned = self
            .store
            .count_roles(&RoleFilter::user(&creator.id).with_role(RoleName::Owner))
            .await?;
        if owned >= MAX_OWNED_RELAYS {
            tracing::info!(
                user_id = %creator.id,
                owned = owned,
                "Relay creation rejected: owner limit reached"
            );
            return Err(AdmissionError::OwnerLimit {
                limit: MAX_OWNED_RELAYS,
            });
        }

        let now = OffsetDateTime::now_utc();
        let relay = Relay {
            id: new_record_id(),
            name: name.to_string(),
            user_limit: FREE_TIER_USER_LIMIT,
            creator: creator.id.clone(),
            created: now,
            updated: now,
        };
        self.store.insert_relay(&relay).await?;

        let owner_role = RelayRole {
            id: new_record_id(),
            relay: relay.id.clone(),
            user: creator.id.clone(),
            role: RoleName::Owner,
            created: now,
            updated: now,
        };
        if let Err(e) = self.store.insert_role(&owner_role).await {
            tracing::error!(relay_id = %relay.id, error = %e, "Failed to create owner role");
            return Err(e.into());
        }

        let invitation = self.create_invitation(&relay.id, RoleName::Member).await?;

        tracing::info!(
            relay_id = %relay.id,
            user_id = %creator.id,
            "Created relay"
        );

        Ok(CreatedRelay {
            relay,
            owner_role,
            invitation,
        })
    }

    async fn create_invitation(
        &self,
        relay_id: &str,
        role: RoleName,
    ) -> Result<RelayInvitation, AdmissionError> {
        let mut last_error = None;

        for _ in 0..INVITATION_KEY_ATTEMPTS {
            let now = OffsetDateTime::now_utc();
            let invitation = RelayInvitation {
                id: new_record_id(),
                relay: relay_id.to_string(),
                role,
                key: generate_invitation_key(),
                created: now,
                updated: now,
            };
            match self.store.insert_invitation(&invitation).await {
                Ok(()) => return Ok(invitation),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(relay_id = %relay_id, "Invitation key collision, retrying");
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::error!(relay_id = %relay_id, error = %e, "Failed to create invitation");
                    return Err(e.into());
                }
            }
        }

        Err(last_error
            .map(AdmissionError::from)
            .unwrap_or_else(|| AdmissionError::InvalidInput("no invitation key".to_string())))
    }

    /// Bind `user_id` to a relay if a seat is free
    ///
    /// Rejects when the pre-insertion membership count is already at
    /// `user_limit`, so a relay never admits more than `user_limit` members.
    pub async fn admit(
        &self,
        relay_id: &str,
        user_id: &str,
        role: RoleName,
    ) -> Result<RelayRole, AdmissionError> {
        let relay = self.find_relay(relay_id).await?;

        let members = self.store.count_roles(&RoleFilter::relay(&relay.id)).await?;
        if members >= relay.user_limit {
            tracing::info!(
                relay_id = %relay.id,
                members = members,
                user_limit = relay.user_limit,
                "Membership rejected: seat limit reached"
            );
            return Err(AdmissionError::SeatLimit {
                relay: relay.id,
                limit: relay.user_limit,
            });
        }

        let now = OffsetDateTime::now_utc();
        let binding = RelayRole {
            id: new_record_id(),
            relay: relay.id,
            user: user_id.to_string(),
            role,
            created: now,
            updated: now,
        };
        self.store.insert_role(&binding).await?;

        tracing::info!(
            relay_id = %binding.relay,
            user_id = %binding.user,
            role = %binding.role,
            "Admitted member"
        );

        Ok(binding)
    }

    async fn role_of(&self, relay_id: &str, user_id: &str) -> Result<Vec<RoleName>, AdmissionError> {
        Ok(self
            .store
            .list_roles(&RoleFilter::relay(relay_id).with_user(user_id))
            .await?
            .into_iter()
            .map(|r| r.role)
            .collect())
    }

    /// Explicit role creation by a relay manager
    pub async fn create_role(
        &self,
        requester: &User,
        relay_id: &str,
        user_id: &str,
        role: RoleName,
    ) -> Result<RelayRole, AdmissionError> {
        let relay = self.find_relay(relay_id).await?;

        if !self
            .role_of(&relay.id, &requester.id)
            .await?
            .iter()
            .any(RoleName::can_manage)
        {
            return Err(AdmissionError::NotRelayManager);
        }

        match self.store.find_user(user_id).await {
            Err(e) if e.is_not_found() => {
                return Err(AdmissionError::UserNotFound(user_id.to_string()))
            }
            other => other?,
        };

        self.admit(&relay.id, user_id, role).await
    }

    /// Join the relay an invitation key points at
    ///
    /// Accepting twice is a no-op for the second call.
    pub async fn accept_invitation(
        &self,
        user: &User,
        key: &str,
    ) -> Result<ExpandedRelay, AdmissionError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(AdmissionError::InvalidInput("key is required".to_string()));
        }

        let invitation = match self.store.find_invitation_by_key(key).await {
            Err(e) if e.is_not_found() => return Err(AdmissionError::InvitationNotFound),
            other => other?,
        };

        let existing = self
            .store
            .count_roles(
                &RoleFilter::relay(&invitation.relay)
                    .with_user(&user.id)
                    .with_role(invitation.role),
            )
            .await?;

        if existing == 0 {
            self.admit(&invitation.relay, &user.id, invitation.role)
                .await?;
        }

        self.expand_relay(&invitation.relay).await
    }

    pub async fn expand_relay(&self, relay_id: &str) -> Result<ExpandedRelay, AdmissionError> {
        let relay = self.find_relay(relay_id).await?;
        let relay_roles = self.store.list_roles(&RoleFilter::relay(&relay.id)).await?;
        let relay_invitations = self.store.list_invitations(&relay.id).await?;

        Ok(ExpandedRelay {
            relay,
            expand: RelayExpand {
                relay_roles,
                relay_invitations,
            },
        })
    }

    /// Delete a relay on behalf of its owner
    ///
    /// The billing guard runs before anything is removed.
    pub async fn delete_relay(
        &self,
        requester: &User,
        relay_id: &str,
        billing: &SubscriptionService,
    ) -> Result<(), AdmissionError> {
        let relay = self.find_relay(relay_id).await?;

        if !self
            .role_of(&relay.id, &requester.id)
            .await?
            .contains(&RoleName::Owner)
        {
            return Err(AdmissionError::NotRelayOwner);
        }

        billing.ensure_relay_deletable(&relay.id).await?;
        self.store.delete_relay(&relay.id).await?;

        tracing::info!(relay_id = %relay.id, user_id = %requester.id, "Deleted relay");
        Ok(())
    }
}
