//! Relay, role and invitation routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use relaybase_shared::{RelayRole, RoleName};
use serde::Deserialize;

use super::{FormOrJson, JsonBody};
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    membership::{CreatedRelay, ExpandedRelay},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct CreateRelayRequest {
    pub name: String,
}

pub async fn create_relay(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    JsonBody(req): JsonBody<CreateRelayRequest>,
) -> ApiResult<(StatusCode, Json<CreatedRelay>)> {
    let created = state
        .admission
        .create_relay(&auth_user.user, &req.name)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn delete_relay(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(relay_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .admission
        .delete_relay(&auth_user.user, &relay_id, &state.billing.subscriptions)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub relay: String,
    pub user: String,
    pub role: String,
}

pub async fn create_role(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    JsonBody(req): JsonBody<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RelayRole>)> {
    let role = RoleName::try_from(req.role).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let binding = state
        .admission
        .create_role(&auth_user.user, &req.relay, &req.user, role)
        .await?;
    Ok((StatusCode::CREATED, Json(binding)))
}

#[derive(Debug, Deserialize)]
pub struct AcceptInvitationRequest {
    #[serde(default)]
    pub key: String,
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    FormOrJson(req): FormOrJson<AcceptInvitationRequest>,
) -> ApiResult<Json<ExpandedRelay>> {
    let relay = state
        .admission
        .accept_invitation(&auth_user.user, &req.key)
        .await?;
    Ok(Json(relay))
}
