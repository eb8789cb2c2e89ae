//! User profile sync and the expanded user record
//!
//! The web client posts the raw OAuth2 provider response after login; its
//! `name` and `picture` are copied onto the user. Admin tooling reads users
//! back with their relay memberships inlined.

use std::sync::Arc;

use relaybase_shared::{RecordStore, Relay, RelayRole, RoleFilter, StoreError, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("Invalid OAuth2 response: {0}")]
    InvalidProfile(String),
    #[error("User not found: {0}")]
    UserNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Profile fields read from an OAuth2 provider response
///
/// Absent fields read as empty strings and overwrite the stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
}

impl ProviderProfile {
    /// Accepts the response either as a JSON object or as a JSON-encoded string
    pub fn from_response(response: Value) -> Result<Self, UserError> {
        let parsed = match response {
            Value::String(raw) => serde_json::from_str(&raw),
            other => serde_json::from_value(other),
        };
        parsed.map_err(|e| UserError::InvalidProfile(e.to_string()))
    }
}

/// Membership with its relay inlined
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedRole {
    #[serde(flatten)]
    pub role: RelayRole,
    pub expand: RoleExpand,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleExpand {
    pub relay: Relay,
}

/// User with every membership and its relay inlined
#[derive(Debug, Clone, Serialize)]
pub struct ExpandedUser {
    #[serde(flatten)]
    pub user: User,
    pub expand: UserExpand,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserExpand {
    pub relay_roles_via_user: Vec<ExpandedRole>,
}

pub struct UserService {
    store: Arc<dyn RecordStore>,
}

impl UserService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Copy the provider's name and picture onto the user
    pub async fn sync_profile(
        &self,
        user_id: &str,
        profile: &ProviderProfile,
    ) -> Result<User, UserError> {
        match self
            .store
            .set_user_profile(user_id, &profile.name, &profile.picture)
            .await
        {
            Err(e) if e.is_not_found() => {
                return Err(UserError::UserNotFound(user_id.to_string()))
            }
            other => other?,
        }

        tracing::info!(user_id = %user_id, "Synced user profile from OAuth2 provider");
        Ok(self.store.find_user(user_id).await?)
    }

    pub async fn expand_user(&self, user: User) -> Result<ExpandedUser, UserError> {
        let roles = self.store.list_roles(&RoleFilter::user(&user.id)).await?;

        let mut relay_roles_via_user = Vec::with_capacity(roles.len());
        for role in roles {
            match self.store.find_relay(&role.relay).await {
                Ok(relay) => relay_roles_via_user.push(ExpandedRole {
                    role,
                    expand: RoleExpand { relay },
                }),
                Err(e) if e.is_not_found() => {
                    tracing::warn!(
                        user_id = %user.id,
                        relay_id = %role.relay,
                        "Role points at a missing relay, skipping"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(ExpandedUser {
            user,
            expand: UserExpand {
                relay_roles_via_user,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaybase_shared::{new_record_id, MemoryStore, RoleName};
    use serde_json::json;
    use time::OffsetDateTime;

    use crate::membership::AdmissionController;
    use crate::test_support::seed_user;

    #[test]
    fn test_profile_from_string_and_object() {
        let expected = ProviderProfile {
            name: "Ada".to_string(),
            picture: "https://img.example/ada.png".to_string(),
        };

        let raw = json!({ "name": "Ada", "picture": "https://img.example/ada.png", "sub": "1" });
        assert_eq!(
            ProviderProfile::from_response(Value::String(raw.to_string())).unwrap(),
            expected
        );
        assert_eq!(ProviderProfile::from_response(raw).unwrap(), expected);
        assert_eq!(
            ProviderProfile::from_response(json!({})).unwrap(),
            ProviderProfile::default()
        );
    }

    #[test]
    fn test_profile_rejects_unreadable_response() {
        for bad in [json!("not json"), json!(42), json!({ "name": 7 })] {
            assert!(matches!(
                ProviderProfile::from_response(bad),
                Err(UserError::InvalidProfile(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_sync_profile_overwrites_name_and_picture() {
        let store = Arc::new(MemoryStore::new());
        let user = seed_user(&store, "ada@example.com").await;
        let service = UserService::new(store.clone());

        let synced = service
            .sync_profile(
                &user.id,
                &ProviderProfile {
                    name: "Ada Lovelace".to_string(),
                    picture: "https://img.example/ada.png".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(synced.name, "Ada Lovelace");
        assert_eq!(synced.picture, "https://img.example/ada.png");
        assert!(!synced.paid);
        assert_eq!(store.find_user(&user.id).await.unwrap(), synced);

        assert!(matches!(
            service
                .sync_profile("missing", &ProviderProfile::default())
                .await,
            Err(UserError::UserNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expand_user_inlines_roles_and_relays() {
        let store = Arc::new(MemoryStore::new());
        let owner = seed_user(&store, "owner@example.com").await;
        let member = seed_user(&store, "member@example.com").await;
        let admission = AdmissionController::new(store.clone());
        let created = admission.create_relay(&owner, "Team").await.unwrap();
        admission
            .accept_invitation(&member, &created.invitation.key)
            .await
            .unwrap();

        let now = OffsetDateTime::now_utc();
        store
            .insert_role(&RelayRole {
                id: new_record_id(),
                relay: "gone".to_string(),
                user: member.id.clone(),
                role: RoleName::Member,
                created: now,
                updated: now,
            })
            .await
            .unwrap();

        let expanded = UserService::new(store)
            .expand_user(member.clone())
            .await
            .unwrap();
        let roles = &expanded.expand.relay_roles_via_user;
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].role.role, RoleName::Member);
        assert_eq!(roles[0].expand.relay.id, created.relay.id);

        let body = serde_json::to_value(&expanded).unwrap();
        assert_eq!(body["id"], member.id);
        assert_eq!(
            body["expand"]["relay_roles_via_user"][0]["expand"]["relay"]["name"],
            "Team"
        );
    }
}
