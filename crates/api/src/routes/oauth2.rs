//! OAuth2 redirect and code-exchange polling routes

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header::LOCATION, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use super::FormOrJson;
use crate::{
    error::{ApiError, ApiResult},
    oauth2::{CodeExchangeResponse, RedirectData, REDIRECT_FAILURE_PATH},
    state::AppState,
};

fn redirect(status: StatusCode, location: &'static str) -> Response {
    (status, [(LOCATION, location)]).into_response()
}

/// Spawn delivery and answer right away; the task is detached
fn handle_redirect(state: &AppState, status: StatusCode, data: RedirectData) -> Response {
    if state.oauth2.dispatch(data.clone()).is_none() {
        return redirect(status, REDIRECT_FAILURE_PATH);
    }

    let target = data.redirect_target();
    if target == REDIRECT_FAILURE_PATH {
        tracing::debug!(
            client_id = %data.state,
            error = %data.error,
            "OAuth2 redirect failed with an error or missing code"
        );
    }
    redirect(status, target)
}

pub async fn redirect_get(
    State(state): State<AppState>,
    query: Result<Query<RedirectData>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(data)) => handle_redirect(&state, StatusCode::TEMPORARY_REDIRECT, data),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read OAuth2 redirect data");
            redirect(StatusCode::TEMPORARY_REDIRECT, REDIRECT_FAILURE_PATH)
        }
    }
}

pub async fn redirect_post(
    State(state): State<AppState>,
    body: Result<FormOrJson<RedirectData>, ApiError>,
) -> Response {
    match body {
        Ok(FormOrJson(data)) => handle_redirect(&state, StatusCode::SEE_OTHER, data),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to read OAuth2 redirect data");
            redirect(StatusCode::SEE_OTHER, REDIRECT_FAILURE_PATH)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PollQuery {
    #[serde(default)]
    pub state: String,
}

/// Fallback for clients that missed the realtime delivery
pub async fn poll_code_exchange(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<PollQuery>,
) -> ApiResult<Json<CodeExchangeResponse>> {
    state
        .oauth2
        .poll(&id, &query.state)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Code exchange not found".to_string()))
}
