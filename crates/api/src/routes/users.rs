//! User profile and admin lookup routes

use axum::{
    extract::{Extension, State},
    Json,
};
use relaybase_shared::User;
use serde::{Deserialize, Serialize};

use super::FormOrJson;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
    users::{ExpandedUser, ProviderProfile},
};

#[derive(Debug, Deserialize)]
pub struct OAuth2ResponseRequest {
    /// Raw provider response, as a JSON object or a JSON-encoded string
    pub oauth_response: serde_json::Value,
}

/// Copy name and picture from the OAuth2 provider response onto the caller
pub async fn sync_oauth2_profile(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    FormOrJson(req): FormOrJson<OAuth2ResponseRequest>,
) -> ApiResult<Json<User>> {
    let profile = ProviderProfile::from_response(req.oauth_response)?;
    let user = state
        .users
        .sync_profile(&auth_user.user.id, &profile)
        .await?;
    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
pub struct AuthnRequest {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct AuthnResponse {
    pub token: String,
    pub record: ExpandedUser,
}

/// Admin lookup of the user behind an auth token, memberships expanded
pub async fn authn(
    State(state): State<AppState>,
    FormOrJson(req): FormOrJson<AuthnRequest>,
) -> ApiResult<Json<AuthnResponse>> {
    let claims = state.jwt_manager.validate_token(&req.token).map_err(|e| {
        tracing::debug!(error = %e, "authn: token validation failed");
        ApiError::Unauthorized
    })?;

    let user = match state.store.find_user(&claims.sub).await {
        Err(e) if e.is_not_found() => return Err(ApiError::Unauthorized),
        other => other?,
    };

    let record = state.users.expand_user(user).await?;
    Ok(Json(AuthnResponse {
        token: req.token,
        record,
    }))
}
