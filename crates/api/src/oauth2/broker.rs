//! In-process realtime client broker
//!
//! Tracks live SSE connections and the topics each one listens on. Clients are
//! addressed by id; the OAuth2 bridge uses the OAuth2 `state` as the id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

/// A named message pushed to one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub name: String,
    pub data: String,
}

/// One live connection as seen by code that pushes to it
pub trait BrokerClient: Send + Sync {
    fn id(&self) -> &str;
    fn is_discarded(&self) -> bool;
    fn has_subscription(&self, topic: &str) -> bool;
    fn unsubscribe(&self, topic: &str);
    /// Returns false when the connection is gone
    fn send(&self, message: Message) -> bool;
}

/// Lookup side of the broker
pub trait ClientBroker: Send + Sync {
    fn client_by_id(&self, id: &str) -> Option<Arc<dyn BrokerClient>>;
}

pub struct Client {
    id: String,
    subscriptions: DashSet<String>,
    discarded: AtomicBool,
    tx: mpsc::UnboundedSender<Message>,
}

impl Client {
    fn new(id: String, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            subscriptions: DashSet::new(),
            discarded: AtomicBool::new(false),
            tx,
        }
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.subscriptions.iter().map(|t| t.key().clone()).collect();
        topics.sort();
        topics
    }

    pub fn discard(&self) {
        self.discarded.store(true, Ordering::SeqCst);
    }
}

impl BrokerClient for Client {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_discarded(&self) -> bool {
        self.discarded.load(Ordering::SeqCst) || self.tx.is_closed()
    }

    fn has_subscription(&self, topic: &str) -> bool {
        self.subscriptions.contains(topic)
    }

    fn unsubscribe(&self, topic: &str) {
        self.subscriptions.remove(topic);
    }

    fn send(&self, message: Message) -> bool {
        if self.is_discarded() {
            return false;
        }
        self.tx.send(message).is_ok()
    }
}

/// Registry of live clients
#[derive(Default)]
pub struct Broker {
    clients: DashMap<String, Arc<Client>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client under a fresh id
    pub fn register(&self) -> (Arc<Client>, mpsc::UnboundedReceiver<Message>) {
        self.register_with_id(Uuid::new_v4().simple().to_string())
    }

    /// Register a client under a caller-chosen id, replacing any previous holder
    pub fn register_with_id(
        &self,
        id: impl Into<String>,
    ) -> (Arc<Client>, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Client::new(id.into(), tx));

        if let Some(previous) = self.clients.insert(client.id.clone(), client.clone()) {
            previous.discard();
        }

        tracing::debug!(
            client_id = %client.id,
            total_clients = self.clients.len(),
            "Realtime client registered"
        );

        (client, rx)
    }

    /// Remove and discard a client
    pub fn unregister(&self, id: &str) {
        if let Some((_, client)) = self.clients.remove(id) {
            client.discard();
            tracing::debug!(
                client_id = %id,
                total_clients = self.clients.len(),
                "Realtime client unregistered"
            );
        }
    }

    pub fn client(&self, id: &str) -> Option<Arc<Client>> {
        self.clients.get(id).map(|entry| entry.value().clone())
    }

    /// Replace a client's topic set; false when the client is unknown
    pub fn set_subscriptions(&self, id: &str, topics: &[String]) -> bool {
        let Some(client) = self.client(id) else {
            return false;
        };

        client.subscriptions.clear();
        for topic in topics.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            client.subscriptions.insert(topic.to_string());
        }

        tracing::debug!(client_id = %id, topics = ?client.subscriptions(), "Realtime subscriptions set");
        true
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}

impl ClientBroker for Broker {
    fn client_by_id(&self, id: &str) -> Option<Arc<dyn BrokerClient>> {
        self.client(id).map(|client| client as Arc<dyn BrokerClient>)
    }
}
