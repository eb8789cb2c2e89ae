//! Billing routes: Stripe webhook, checkout and cancellation

use axum::{
    body::Bytes,
    extract::{Extension, Query, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use relaybase_billing::ExpandedSubscription;
use serde::Deserialize;

use super::JsonBody;
use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Stripe webhook endpoint
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<&'static str> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    let event = state
        .billing
        .webhooks
        .verify_event(&body, signature)
        .map_err(|e| {
            tracing::warn!(error = %e, payload_len = body.len(), "Rejected webhook");
            e
        })?;

    let event_id = event.event_id().to_string();
    let event_type = event.event_type().to_string();

    let outcome = state
        .billing
        .webhooks
        .handle_event(event)
        .await
        .map_err(|e| {
            tracing::warn!(
                event_id = %event_id,
                event_type = %event_type,
                error = %e,
                "Webhook event failed"
            );
            e
        })?;

    tracing::info!(
        event_id = %event_id,
        event_type = %event_type,
        outcome = ?outcome,
        "Webhook event processed"
    );

    Ok("OK")
}

#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    pub relay: String,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// Start a Stripe checkout and send the browser there
pub async fn checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<CheckoutQuery>,
) -> ApiResult<Response> {
    let session = state
        .billing
        .checkout
        .create_session(&auth_user.user, &query.relay, query.quantity)
        .await?;

    Ok((StatusCode::SEE_OTHER, [(LOCATION, session.url)]).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelSubscriptionRequest {
    pub subscription_id: String,
}

/// Cancel a subscription held by the authenticated user
pub async fn cancel_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    JsonBody(req): JsonBody<CancelSubscriptionRequest>,
) -> ApiResult<Json<ExpandedSubscription>> {
    if req.subscription_id.trim().is_empty() {
        return Err(ApiError::BadRequest("subscriptionId is required".to_string()));
    }

    let expanded = state
        .billing
        .subscriptions
        .cancel_for_user(req.subscription_id.trim(), &auth_user.user.id)
        .await?;

    Ok(Json(expanded))
}
