//! Application state

use std::sync::Arc;

use relaybase_billing::BillingService;
use relaybase_shared::RecordStore;

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
    membership::AdmissionController,
    oauth2::{Broker, CodeExchangeBridge},
    users::UserService,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn RecordStore>,
    pub jwt_manager: JwtManager,
    pub billing: Arc<BillingService>,
    pub admission: Arc<AdmissionController>,
    pub users: Arc<UserService>,
    /// Realtime clients, also the delivery target of the OAuth2 bridge
    pub broker: Arc<Broker>,
    pub oauth2: Arc<CodeExchangeBridge>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RecordStore>) -> Self {
        let billing = BillingService::new(config.stripe.clone(), &config.domain_name, store.clone());
        tracing::info!(api_base = %config.stripe.api_base, "Stripe billing service initialized");
        if config.stripe.price_id.is_none() {
            tracing::warn!("STRIPE_PRICE_ID not set, checkout is disabled");
        }
        Self::with_billing(config, store, billing)
    }

    /// Build state around an already constructed billing service
    pub fn with_billing(
        config: Config,
        store: Arc<dyn RecordStore>,
        billing: BillingService,
    ) -> Self {
        let jwt_manager = JwtManager::new(&config.auth_token_secret, config.auth_token_expiry_hours);
        let broker = Arc::new(Broker::new());
        let oauth2 = Arc::new(CodeExchangeBridge::new(broker.clone(), store.clone()));

        Self {
            admission: Arc::new(AdmissionController::new(store.clone())),
            users: Arc::new(UserService::new(store.clone())),
            billing: Arc::new(billing),
            broker,
            oauth2,
            jwt_manager,
            store,
            config,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            store: self.store.clone(),
            admin_api_key: self.config.admin_api_key.clone(),
        }
    }
}
