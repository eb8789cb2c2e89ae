//! HTTP routes

pub mod billing;
pub mod content;
pub mod oauth2;
pub mod realtime;
pub mod relays;
pub mod users;

use axum::{
    extract::{DefaultBodyLimit, FromRequest, Request},
    http::header::CONTENT_TYPE,
    middleware,
    routing::{delete, get, post},
    Form, Json, Router,
};
use relaybase_billing::MAX_PAYLOAD_BYTES;
use serde::de::DeserializeOwned;

use crate::{
    auth::{require_admin, require_auth, require_login, require_paid},
    error::ApiError,
    state::AppState,
};

/// Body accepted as JSON or as an urlencoded form, chosen by content type
#[derive(Debug, Clone)]
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            Ok(Self(value))
        }
    }
}

/// JSON body whose rejection renders as an `ApiError` JSON body
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

pub async fn health() -> &'static str {
    "OK"
}

pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let public = Router::new()
        .route("/health", get(health))
        .route(
            "/webhook",
            post(billing::webhook).layer(DefaultBodyLimit::max(MAX_PAYLOAD_BYTES)),
        )
        .route(
            "/api/oauth2-redirect",
            get(oauth2::redirect_get).post(oauth2::redirect_post),
        )
        .route("/api/code-exchange/{id}", get(oauth2::poll_code_exchange))
        .route(
            "/api/realtime",
            get(realtime::connect).post(realtime::set_subscriptions),
        );

    let authenticated = Router::new()
        .route("/api/cancel-subscription", post(billing::cancel_subscription))
        .route("/api/accept-invitation", post(relays::accept_invitation))
        .route("/api/relays", post(relays::create_relay))
        .route("/api/relays/{id}", delete(relays::delete_relay))
        .route("/api/relay-roles", post(relays::create_role))
        .route("/api/oauth2-response", post(users::sync_oauth2_profile))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_auth,
        ));

    let login = Router::new()
        .route("/checkout", get(billing::checkout))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_login,
        ));

    let admin = Router::new()
        .route("/authn", post(users::authn))
        .route_layer(middleware::from_fn_with_state(
            auth_state.clone(),
            require_admin,
        ));

    let paid = Router::new()
        .route("/content/{*file}", get(content::serve))
        .route_layer(middleware::from_fn_with_state(auth_state, require_paid));

    public
        .merge(authenticated)
        .merge(login)
        .merge(paid)
        .merge(admin)
        .with_state(state)
}
