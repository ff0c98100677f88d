//! Identity provider contract.

use std::sync::Arc;

use async_trait::async_trait;
use qr_table_core::{Email, Uid};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use super::AuthError;

/// Identity of a signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    /// Opaque, stable user identifier.
    pub uid: Uid,
    pub email: Email,
}

/// External email/password authentication service.
///
/// Implementations never retry; every failure goes straight back to the
/// caller.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Sign in an existing account.
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, AuthError>;

    /// Create an account and sign it in.
    async fn sign_up_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, AuthError>;

    /// End the current session.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// ID token of the signed-in user, shared with the database client so its
/// requests run as that user.
#[derive(Debug, Clone, Default)]
pub struct IdTokenCell {
    inner: Arc<RwLock<Option<SecretString>>>,
}

impl IdTokenCell {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, token: SecretString) {
        *self.inner.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    /// Current token, if a user is signed in.
    pub async fn get(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|t| t.expose_secret().to_owned())
    }
}
