//! Application state - shared across all handlers.

use std::sync::Arc;

use crate::auth::{IdentityProvider, TokenService};
use crate::config::Environment;
use crate::store::{MemoryStore, TaskStore, UserStore};

/// Shared application state, built once in `main` (or a test) and handed to
/// actix through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskStore>,
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<TokenService>,
    /// `None` when GitHub login is not configured.
    pub identity: Option<Arc<dyn IdentityProvider>>,
    pub environment: Environment,
}

impl AppState {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        users: Arc<dyn UserStore>,
        tokens: Arc<TokenService>,
    ) -> Self {
        Self {
            tasks,
            users,
            tokens,
            identity: None,
            environment: Environment::Production,
        }
    }

    /// Both collections backed by one fresh `MemoryStore`.
    pub fn in_memory(tokens: Arc<TokenService>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::new(store.clone(), store, tokens)
    }

    pub fn with_identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}
