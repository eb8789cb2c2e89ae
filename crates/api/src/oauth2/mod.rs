//! OAuth2 redirect handling and the realtime broker it delivers through

pub mod bridge;
pub mod broker;

pub use bridge::{
    code_exchange_id, CodeExchangeBridge, CodeExchangeResponse, DeliveryOutcome, RedirectData,
    RetryPolicy, OAUTH2_TOPIC, REDIRECT_FAILURE_PATH, REDIRECT_SUCCESS_PATH,
};
pub use broker::{Broker, BrokerClient, Client, ClientBroker, Message};
