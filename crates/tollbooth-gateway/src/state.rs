use std::sync::Arc;

use x402::FacilitatorClient;

use crate::cache::EndpointCache;
use crate::config::GatewayConfig;
use crate::store::EndpointStore;
use crate::vault::CredentialVault;

/// Shared application state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<EndpointStore>,
    pub cache: Arc<EndpointCache>,
    pub vault: Arc<CredentialVault>,
    pub facilitator: FacilitatorClient,
    /// Client for origin forwards. Redirects are disabled so a compromised
    /// origin cannot bounce credentialed requests to an attacker host.
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: GatewayConfig, store: EndpointStore) -> Self {
        let facilitator = FacilitatorClient::new(
            config.facilitator_url.clone(),
            config.facilitator_timeout,
            config.hmac_secret.clone(),
        );
        let vault = CredentialVault::new(&config.vault_key);
        let cache = EndpointCache::new(config.cache_ttl);
        let http_client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("failed to create HTTP client");

        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            cache: Arc::new(cache),
            vault: Arc::new(vault),
            facilitator,
            http_client,
        }
    }
}
