//! Backend routing and the client registry.
//!
//! Routing is a pure decision over (selected backend, model id). The
//! registry holds the codec instances that could actually be built from
//! stored credentials; a route that resolves to an unregistered backend is
//! a configuration problem, not a routing one, and the caller reports it
//! as such.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::anthropic::AnthropicMessagesClient;
use super::anthropic_completion::AnthropicCompletionClient;
use super::openrouter::OpenRouterClient;
use super::AiClient;
use crate::credentials::CredentialStore;
use crate::types::Backend;

/// Decide which backend must service a request.
///
/// A model id qualified by an aggregator namespace ("vendor/model") can
/// only be served by OpenRouter, whatever backend is selected. Plain ids
/// follow the selection.
pub fn route(selected: Backend, model: &str) -> Backend {
    if model.contains('/') {
        Backend::OpenRouter
    } else {
        selected
    }
}

/// Registry of backend codecs, keyed by backend.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<Backend, Arc<dyn AiClient>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one codec per backend that has a stored credential.
    pub fn from_credentials(store: &dyn CredentialStore) -> Self {
        let mut registry = Self::new();
        for backend in Backend::all() {
            let api_key = match store.get(backend) {
                Ok(Some(key)) => key,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Could not read credential for {}: {e:#}", backend.label());
                    continue;
                }
            };
            let client: Arc<dyn AiClient> = match backend {
                Backend::AnthropicCompletion => {
                    Arc::new(AnthropicCompletionClient::new(api_key, None))
                }
                Backend::AnthropicMessages => {
                    Arc::new(AnthropicMessagesClient::new(api_key, None))
                }
                Backend::OpenRouter => Arc::new(OpenRouterClient::new(api_key, None)),
            };
            registry.register(client);
            info!("Registered {} client", backend.label());
        }
        if registry.clients.is_empty() {
            warn!("No backends configured. Store an API key to start chatting.");
        }
        registry
    }

    /// Register a codec under the backend it reports.
    pub fn register(&mut self, client: Arc<dyn AiClient>) {
        self.clients.insert(client.backend(), client);
    }

    pub fn get(&self, backend: Backend) -> Option<Arc<dyn AiClient>> {
        self.clients.get(&backend).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
