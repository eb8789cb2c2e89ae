//! OAuth2 code-exchange bridge
//!
//! Hands the authorization code from a provider redirect to the client that
//! started the flow. The client is found in the realtime broker by the OAuth2
//! `state`; when it is not connected the code is also stored for polling.

use std::sync::Arc;
use std::time::Duration;

use relaybase_shared::{CodeExchange, RecordStore, StoreError, RECORD_ID_LEN};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::broker::{ClientBroker, Message};

pub const OAUTH2_TOPIC: &str = "@oauth2";
pub const REDIRECT_FAILURE_PATH: &str = "../_/#/auth/oauth2-redirect-failure";
pub const REDIRECT_SUCCESS_PATH: &str = "../_/#/auth/oauth2-redirect-success";

/// Fixed placeholder until one-time passwords are issued per exchange
const PLACEHOLDER_OTP: &str = "123456";

/// Redirect parameters sent by the OAuth2 provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectData {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl RedirectData {
    /// Success only when a code arrived without an error
    pub fn redirect_target(&self) -> &'static str {
        if self.error.is_empty() && !self.code.is_empty() {
            REDIRECT_SUCCESS_PATH
        } else {
            REDIRECT_FAILURE_PATH
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub window: Duration,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pushed to the live client on the given attempt
    Delivered { attempts: u32 },
    /// No client showed up within the window
    Expired { attempts: u32, persisted: bool },
}

/// Polling response for a stored exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeExchangeResponse {
    pub state: String,
    pub code: String,
}

/// Record id derived from the OAuth2 state
pub fn code_exchange_id(state: &str) -> String {
    state.chars().take(RECORD_ID_LEN).collect()
}

#[derive(Clone)]
pub struct CodeExchangeBridge {
    broker: Arc<dyn ClientBroker>,
    store: Arc<dyn RecordStore>,
    policy: RetryPolicy,
}

impl CodeExchangeBridge {
    pub fn new(broker: Arc<dyn ClientBroker>, store: Arc<dyn RecordStore>) -> Self {
        Self::with_policy(broker, store, RetryPolicy::default())
    }

    pub fn with_policy(
        broker: Arc<dyn ClientBroker>,
        store: Arc<dyn RecordStore>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            broker,
            store,
            policy,
        }
    }

    /// Start delivery of a redirect
    ///
    /// Returns `None` without spawning anything when `state` is empty. The task
    /// runs even when the redirect carries an error so the client learns of it.
    pub fn dispatch(&self, data: RedirectData) -> Option<JoinHandle<DeliveryOutcome>> {
        if data.state.is_empty() {
            tracing::debug!("Missing OAuth2 state parameter");
            return None;
        }

        let payload = match serde_json::to_string(&data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to encode OAuth2 redirect data");
                return None;
            }
        };

        let bridge = self.clone();
        Some(tokio::spawn(async move { bridge.deliver(data, payload).await }))
    }

    async fn deliver(self, data: RedirectData, payload: String) -> DeliveryOutcome {
        let deadline = Instant::now() + self.policy.window;
        let mut attempts = 0;
        let mut save_attempted = false;
        let mut persisted = false;

        while Instant::now() < deadline {
            attempts += 1;

            if let Some(client) = self.broker.client_by_id(&data.state) {
                if !client.is_discarded() && client.has_subscription(OAUTH2_TOPIC) {
                    client.send(Message {
                        name: OAUTH2_TOPIC.to_string(),
                        data: payload,
                    });
                    client.unsubscribe(OAUTH2_TOPIC);
                    tracing::debug!(
                        client_id = %data.state,
                        attempts = attempts,
                        "Sent OAuth2 code to subscribed client"
                    );
                    return DeliveryOutcome::Delivered { attempts };
                }
            }

            if !save_attempted {
                save_attempted = true;
                match self.save_code_exchange(&data).await {
                    Ok(()) => persisted = true,
                    Err(e) if e.is_conflict() => {
                        tracing::debug!(client_id = %data.state, "Code exchange already stored");
                        persisted = true;
                    }
                    Err(e) => {
                        tracing::error!(client_id = %data.state, error = %e, "Failed to save code exchange record");
                    }
                }
            }

            tokio::time::sleep(self.policy.interval).await;
        }

        tracing::debug!(
            client_id = %data.state,
            attempts = attempts,
            persisted = persisted,
            "No OAuth2 subscription client found before the retry window closed"
        );
        DeliveryOutcome::Expired {
            attempts,
            persisted,
        }
    }

    async fn save_code_exchange(&self, data: &RedirectData) -> Result<(), StoreError> {
        let record = CodeExchange {
            id: code_exchange_id(&data.state),
            state: data.state.clone(),
            code: data.code.clone(),
            otp: PLACEHOLDER_OTP.to_string(),
            created: OffsetDateTime::now_utc(),
        };
        self.store.insert_code_exchange(&record).await
    }

    /// Look up a stored exchange; the full state must match
    pub async fn poll(
        &self,
        id: &str,
        state: &str,
    ) -> Result<Option<CodeExchangeResponse>, StoreError> {
        match self.store.find_code_exchange(id).await {
            Ok(record) if !state.is_empty() && record.state == state => {
                Ok(Some(CodeExchangeResponse {
                    state: record.state,
                    code: record.code,
                }))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
