//! Authentication gateway.
//!
//! Wraps an [`IdentityProvider`] and keeps the "current user" that the rest of
//! the page observes. Observers are push-based: every sign-in, sign-up and
//! sign-out publishes the new state to them.

pub mod emulator;
mod error;
mod identity;
pub mod toolkit;

use std::sync::Arc;

use qr_table_core::Email;
use tokio::sync::watch;
use tracing::instrument;

pub use error::AuthError;
pub use identity::{AuthUser, IdTokenCell, IdentityProvider};

use crate::subscription::Subscription;
use crate::telemetry;

/// Sign-in, sign-up, sign-out and auth state observation.
///
/// Cheap to clone; clones share the same current user.
#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<AuthGatewayInner>,
}

struct AuthGatewayInner {
    provider: Arc<dyn IdentityProvider>,
    state: watch::Sender<Option<AuthUser>>,
}

impl std::fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGateway")
            .field("current_user", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl AuthGateway {
    /// Create a gateway with nobody signed in.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(AuthGatewayInner { provider, state }),
        }
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::InvalidCredentials` if the account is unknown or the
    /// password is wrong. Backend failures are returned unchanged.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = Email::parse(email)?;
        let user = self
            .inner
            .provider
            .sign_in_with_password(&email, password)
            .await?;

        self.publish_signed_in(&user, "Signed in");
        Ok(user)
    }

    /// Create an account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidEmail` if the email format is invalid.
    /// Returns `AuthError::WeakPassword` if the password is rejected.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, AuthError> {
        let email = Email::parse(email)?;
        let user = self
            .inner
            .provider
            .sign_up_with_password(&email, password)
            .await?;

        self.publish_signed_in(&user, "Signed up");
        Ok(user)
    }

    /// End the session. Observers receive `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to end the session; the local
    /// state is cleared regardless.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.inner.provider.sign_out().await;

        if self.inner.state.send_replace(None).is_some() {
            tracing::info!("Signed out");
        }
        telemetry::clear_sentry_user();

        result
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<AuthUser> {
        self.inner.state.borrow().clone()
    }

    /// Observe auth state. The first `next()` yields the current state.
    #[must_use]
    pub fn watch(&self) -> AuthStateWatch {
        let mut rx = self.inner.state.subscribe();
        rx.mark_changed();
        AuthStateWatch { rx }
    }

    /// Register `callback` for auth state changes.
    ///
    /// The callback runs once right away with the current state, then again
    /// after every sign-in and sign-out until the returned subscription is
    /// cancelled or dropped.
    pub fn on_auth_state_changed<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(Option<AuthUser>) + Send + 'static,
    {
        let mut rx = self.inner.state.subscribe();
        callback(rx.borrow_and_update().clone());

        let mut watch = AuthStateWatch { rx };
        let task = tokio::spawn(async move {
            while let Some(user) = watch.next().await {
                callback(user);
            }
        });
        Subscription::new(&task)
    }

    fn publish_signed_in(&self, user: &AuthUser, message: &str) {
        tracing::info!(uid = %user.uid, "{message}");
        telemetry::set_sentry_user(&user.uid, Some(user.email.as_str()));
        self.inner.state.send_replace(Some(user.clone()));
    }
}

/// Stream of auth state values.
#[derive(Debug)]
pub struct AuthStateWatch {
    rx: watch::Receiver<Option<AuthUser>>,
}

impl AuthStateWatch {
    /// Wait for the next auth state. `None` once the gateway is gone.
    ///
    /// Intermediate states may be skipped if several changes happen before
    /// this is polled; the latest state is always delivered.
    pub async fn next(&mut self) -> Option<Option<AuthUser>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Take a pending state change without waiting.
    pub fn try_next(&mut self) -> Option<Option<AuthUser>> {
        if self.rx.has_changed().unwrap_or(false) {
            Some(self.rx.borrow_and_update().clone())
        } else {
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;

    use super::emulator::EmulatorIdentity;
    use super::*;

    fn gateway() -> AuthGateway {
        AuthGateway::new(Arc::new(EmulatorIdentity::new()))
    }

    #[tokio::test]
    async fn test_sign_up_sets_current_user() {
        let auth = gateway();
        assert!(auth.current_user().is_none());

        let user = auth.sign_up("Diner@Example.com", "hunter22").await.unwrap();
        assert_eq!(user.email.as_str(), "diner@example.com");
        assert_eq!(auth.current_user(), Some(user));
    }

    #[tokio::test]
    async fn test_invalid_email_rejected_locally() {
        let auth = gateway();
        let result = auth.sign_in("not-an-email", "hunter22").await;
        assert!(matches!(result, Err(AuthError::InvalidEmail(_))));
    }

    #[tokio::test]
    async fn test_failed_sign_in_keeps_state() {
        let auth = gateway();
        let user = auth.sign_up("diner@example.com", "hunter22").await.unwrap();

        let result = auth.sign_in("diner@example.com", "wrong-pass").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert_eq!(auth.current_user(), Some(user));
    }

    #[tokio::test]
    async fn test_watch_yields_current_state_first() {
        let auth = gateway();
        let user = auth.sign_up("diner@example.com", "hunter22").await.unwrap();

        let mut watch = auth.watch();
        assert_eq!(watch.next().await, Some(Some(user)));

        auth.sign_out().await.unwrap();
        assert_eq!(watch.next().await, Some(None));
        assert!(watch.try_next().is_none());
    }

    #[tokio::test]
    async fn test_callback_invoked_immediately_and_on_change() {
        let auth = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = auth.on_auth_state_changed(move |user| {
            let _ = tx.send(user);
        });
        assert_eq!(rx.try_recv().unwrap(), None);

        let user = auth.sign_up("diner@example.com", "hunter22").await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(seen, Some(Some(user)));

        auth.sign_out().await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(seen, Some(None));

        subscription.cancel();
    }

    #[tokio::test]
    async fn test_cancelled_callback_stops() {
        let auth = gateway();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let subscription = auth.on_auth_state_changed(move |user| {
            let _ = tx.send(user);
        });
        assert_eq!(rx.try_recv().unwrap(), None);
        subscription.cancel();

        auth.sign_up("diner@example.com", "hunter22").await.unwrap();

        // The aborted task drops the sender, closing the channel.
        let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(closed, None);
    }
}
