//! Long-lived service handles.
//!
//! A [`Backend`] bundles the authentication handle and the database handle a
//! page uses for its whole lifetime. Both REST clients share one ID token so
//! database requests run as the signed-in user.

use std::sync::Arc;

use crate::auth::emulator::EmulatorIdentity;
use crate::auth::toolkit::IdentityToolkitClient;
use crate::auth::{AuthGateway, IdTokenCell};
use crate::config::{BackendConfig, DEFAULT_RESTAURANT_CACHE_TTL};
use crate::db::{DocumentStore, EmulatorStore, FirestoreClient};
use crate::repository::OrderRepository;

/// Authentication and database handles.
#[derive(Clone)]
pub struct Backend {
    auth: AuthGateway,
    orders: OrderRepository,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

impl Backend {
    /// Handles for the hosted services described by `config`.
    #[must_use]
    pub fn connect(config: &BackendConfig) -> Self {
        let token = IdTokenCell::new();
        let identity = IdentityToolkitClient::new(config, token.clone());
        let store = FirestoreClient::new(config, token);

        tracing::info!(
            project_id = %config.project_id,
            auth_endpoint = %config.auth_endpoint,
            database_endpoint = %config.database_endpoint,
            "Backend handles created"
        );

        Self {
            auth: AuthGateway::new(Arc::new(identity)),
            orders: OrderRepository::new(Arc::new(store), config.restaurant_cache_ttl),
        }
    }

    /// In-process handles with empty state.
    ///
    /// Returns the store as well so callers can seed restaurants and coupons.
    #[must_use]
    pub fn emulator() -> (Self, EmulatorStore) {
        let store = EmulatorStore::new();
        let backend = Self::with_handles(
            Arc::new(EmulatorIdentity::new()),
            Arc::new(store.clone()),
            DEFAULT_RESTAURANT_CACHE_TTL,
        );
        (backend, store)
    }

    /// Build handles from arbitrary providers.
    #[must_use]
    pub fn with_handles(
        identity: Arc<dyn crate::auth::IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        restaurant_cache_ttl: std::time::Duration,
    ) -> Self {
        Self {
            auth: AuthGateway::new(identity),
            orders: OrderRepository::new(store, restaurant_cache_ttl),
        }
    }

    /// Authentication handle.
    #[must_use]
    pub const fn auth(&self) -> &AuthGateway {
        &self.auth
    }

    /// Database handle.
    #[must_use]
    pub const fn orders(&self) -> &OrderRepository {
        &self.orders
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emulator_clones_share_state() {
        let (backend, _) = Backend::emulator();
        let other = backend.clone();

        backend
            .auth()
            .sign_up("diner@example.com", "hunter22")
            .await
            .unwrap();
        assert!(other.auth().current_user().is_some());
    }

    #[test]
    fn test_connect_does_not_touch_network() {
        let backend = Backend::connect(&BackendConfig::emulator("/tmp").unwrap());
        assert!(backend.auth().current_user().is_none());
    }
}
