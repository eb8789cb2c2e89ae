//! PostgreSQL-backed record store

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::store::{RecordStore, StoreError, StoreResult};
use crate::types::{
    CodeExchange, Relay, RelayInvitation, RelayRole, RoleFilter, Subscription, User,
};

const SUBSCRIPTION_COLUMNS: &str = "id, active, relay, user_id, stripe_customer, \
     stripe_subscription, stripe_quantity, stripe_cancel_at, created, updated";

#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Translate a sqlx error into the store taxonomy for one collection/key
fn store_error(collection: &'static str, key: &str, e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::RowNotFound => StoreError::not_found(collection, key),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::conflict(collection, key)
        }
        _ => {
            tracing::error!(
                collection = collection,
                key = %key,
                error = %e,
                "Record store query failed"
            );
            StoreError::Database(e.to_string())
        }
    }
}

fn require_affected(
    rows: u64,
    collection: &'static str,
    key: &str,
) -> StoreResult<()> {
    if rows == 0 {
        return Err(StoreError::not_found(collection, key));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn insert_relay(&self, relay: &Relay) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO relays (id, name, user_limit, creator, created, updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&relay.id)
        .bind(&relay.name)
        .bind(relay.user_limit)
        .bind(&relay.creator)
        .bind(relay.created)
        .bind(relay.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("relays", &relay.id, e))?;
        Ok(())
    }

    async fn find_relay(&self, id: &str) -> StoreResult<Relay> {
        sqlx::query_as::<_, Relay>(
            "SELECT id, name, user_limit, creator, created, updated FROM relays WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("relays", id, e))
    }

    async fn list_relays(&self) -> StoreResult<Vec<Relay>> {
        sqlx::query_as::<_, Relay>(
            "SELECT id, name, user_limit, creator, created, updated FROM relays ORDER BY created",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("relays", "*", e))
    }

    async fn set_relay_user_limit(&self, id: &str, user_limit: i64) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE relays SET user_limit = $1, updated = NOW() WHERE id = $2")
                .bind(user_limit)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("relays", id, e))?;
        require_affected(result.rows_affected(), "relays", id)
    }

    async fn delete_relay(&self, id: &str) -> StoreResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| store_error("relays", id, e))?;

        sqlx::query("DELETE FROM relay_roles WHERE relay = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("relay_roles", id, e))?;

        sqlx::query("DELETE FROM relay_invitations WHERE relay = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("relay_invitations", id, e))?;

        let result = sqlx::query("DELETE FROM relays WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| store_error("relays", id, e))?;
        require_affected(result.rows_affected(), "relays", id)?;

        tx.commit().await.map_err(|e| store_error("relays", id, e))
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, picture, paid, created, updated)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(&user.picture)
        .bind(user.paid)
        .bind(user.created)
        .bind(user.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("users", &user.email, e))?;
        Ok(())
    }

    async fn find_user(&self, id: &str) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, picture, paid, created, updated FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("users", id, e))
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT id, email, name, picture, paid, created, updated FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("users", email, e))
    }

    async fn set_user_paid(&self, id: &str, paid: bool) -> StoreResult<()> {
        let result = sqlx::query("UPDATE users SET paid = $1, updated = NOW() WHERE id = $2")
            .bind(paid)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("users", id, e))?;
        require_affected(result.rows_affected(), "users", id)
    }

    async fn set_user_profile(&self, id: &str, name: &str, picture: &str) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET name = $1, picture = $2, updated = NOW() WHERE id = $3",
        )
        .bind(name)
        .bind(picture)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("users", id, e))?;
        require_affected(result.rows_affected(), "users", id)
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, active, relay, user_id, stripe_customer, stripe_subscription,
                stripe_quantity, stripe_cancel_at, created, updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&subscription.id)
        .bind(subscription.active)
        .bind(&subscription.relay)
        .bind(&subscription.user)
        .bind(&subscription.stripe_customer)
        .bind(&subscription.stripe_subscription)
        .bind(subscription.stripe_quantity)
        .bind(subscription.stripe_cancel_at)
        .bind(subscription.created)
        .bind(subscription.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("subscriptions", &subscription.id, e))?;
        Ok(())
    }

    async fn find_subscription(&self, id: &str) -> StoreResult<Subscription> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("subscriptions", id, e))
    }

    async fn find_subscriptions_by_stripe_id(
        &self,
        stripe_subscription: &str,
    ) -> StoreResult<Vec<Subscription>> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions \
             WHERE stripe_subscription = $1 ORDER BY created"
        ))
        .bind(stripe_subscription)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("subscriptions", stripe_subscription, e))
    }

    async fn list_active_subscriptions(&self) -> StoreResult<Vec<Subscription>> {
        sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE active = TRUE ORDER BY created"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("subscriptions", "*", e))
    }

    async fn count_active_subscriptions(&self, relay: &str) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM subscriptions WHERE relay = $1 AND active = TRUE",
        )
        .bind(relay)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("subscriptions", relay, e))?;
        Ok(count)
    }

    async fn update_subscription(&self, subscription: &Subscription) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET active = $1,
                stripe_quantity = $2,
                stripe_cancel_at = $3,
                updated = NOW()
            WHERE id = $4
            "#,
        )
        .bind(subscription.active)
        .bind(subscription.stripe_quantity)
        .bind(subscription.stripe_cancel_at)
        .bind(&subscription.id)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("subscriptions", &subscription.id, e))?;
        require_affected(result.rows_affected(), "subscriptions", &subscription.id)
    }

    async fn delete_subscription(&self, id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("subscriptions", id, e))?;
        require_affected(result.rows_affected(), "subscriptions", id)
    }

    async fn insert_role(&self, role: &RelayRole) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO relay_roles (id, relay, user_id, role, created, updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&role.id)
        .bind(&role.relay)
        .bind(&role.user)
        .bind(role.role.as_str())
        .bind(role.created)
        .bind(role.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("relay_roles", &role.id, e))?;
        Ok(())
    }

    async fn count_roles(&self, filter: &RoleFilter) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM relay_roles
            WHERE ($1::TEXT IS NULL OR relay = $1)
              AND ($2::TEXT IS NULL OR user_id = $2)
              AND ($3::TEXT IS NULL OR role = $3)
            "#,
        )
        .bind(filter.relay.as_deref())
        .bind(filter.user.as_deref())
        .bind(filter.role.map(|r| r.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("relay_roles", "count", e))?;
        Ok(count)
    }

    async fn list_roles(&self, filter: &RoleFilter) -> StoreResult<Vec<RelayRole>> {
        sqlx::query_as::<_, RelayRole>(
            r#"
            SELECT id, relay, user_id, role, created, updated FROM relay_roles
            WHERE ($1::TEXT IS NULL OR relay = $1)
              AND ($2::TEXT IS NULL OR user_id = $2)
              AND ($3::TEXT IS NULL OR role = $3)
            ORDER BY created
            "#,
        )
        .bind(filter.relay.as_deref())
        .bind(filter.user.as_deref())
        .bind(filter.role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("relay_roles", "list", e))
    }

    async fn insert_invitation(&self, invitation: &RelayInvitation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO relay_invitations (id, relay, role, key, created, updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&invitation.id)
        .bind(&invitation.relay)
        .bind(invitation.role.as_str())
        .bind(&invitation.key)
        .bind(invitation.created)
        .bind(invitation.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("relay_invitations", &invitation.key, e))?;
        Ok(())
    }

    async fn find_invitation_by_key(&self, key: &str) -> StoreResult<RelayInvitation> {
        sqlx::query_as::<_, RelayInvitation>(
            "SELECT id, relay, role, key, created, updated FROM relay_invitations WHERE key = $1",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("relay_invitations", key, e))
    }

    async fn list_invitations(&self, relay: &str) -> StoreResult<Vec<RelayInvitation>> {
        sqlx::query_as::<_, RelayInvitation>(
            r#"
            SELECT id, relay, role, key, created, updated FROM relay_invitations
            WHERE relay = $1 ORDER BY created
            "#,
        )
        .bind(relay)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| store_error("relay_invitations", relay, e))
    }

    async fn insert_code_exchange(&self, record: &CodeExchange) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO code_exchange (id, state, code, otp, created)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&record.id)
        .bind(&record.state)
        .bind(&record.code)
        .bind(&record.otp)
        .bind(record.created)
        .execute(&self.pool)
        .await
        .map_err(|e| store_error("code_exchange", &record.id, e))?;
        Ok(())
    }

    async fn find_code_exchange(&self, id: &str) -> StoreResult<CodeExchange> {
        sqlx::query_as::<_, CodeExchange>(
            "SELECT id, state, code, otp, created FROM code_exchange WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| store_error("code_exchange", id, e))
    }

    async fn delete_code_exchanges_before(&self, cutoff: OffsetDateTime) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM code_exchange WHERE created < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| store_error("code_exchange", "expired", e))?;
        Ok(result.rows_affected())
    }
}
