//! Realtime SSE endpoint backing the client broker

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::JsonBody;
use crate::{
    error::{ApiError, ApiResult},
    oauth2::{Broker, BrokerClient},
    state::AppState,
};

/// Unregisters the client when the SSE stream is dropped
struct ClientGuard {
    broker: Arc<Broker>,
    client_id: String,
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.broker.unregister(&self.client_id);
    }
}

/// Open a realtime connection; the first event carries the client id
pub async fn connect(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (client, rx) = state.broker.register();
    let client_id = client.id().to_string();

    tracing::debug!(client_id = %client_id, "Realtime connection opened");

    let connect_event = Event::default()
        .id(client_id.clone())
        .event("PB_CONNECT")
        .data(json!({ "clientId": client_id }).to_string());

    let guard = ClientGuard {
        broker: state.broker.clone(),
        client_id,
    };

    let messages = UnboundedReceiverStream::new(rx).map(move |message| {
        let _guard = &guard;
        Ok::<_, Infallible>(Event::default().event(message.name).data(message.data))
    });

    let stream = stream::once(async move { Ok::<_, Infallible>(connect_event) }).chain(messages);

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSubscriptionsRequest {
    pub client_id: String,
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

/// Replace the topic set of a connected client
pub async fn set_subscriptions(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SetSubscriptionsRequest>,
) -> ApiResult<StatusCode> {
    if !state
        .broker
        .set_subscriptions(&req.client_id, &req.subscriptions)
    {
        return Err(ApiError::NotFound("Missing or invalid client id".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}
