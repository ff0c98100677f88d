//! Identity Toolkit REST client.
//!
//! Talks to the hosted email/password auth service (or its emulator) and
//! keeps the returned ID token in an [`IdTokenCell`] for the database client.

use std::sync::Arc;

use async_trait::async_trait;
use qr_table_core::{Email, Uid};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use super::{AuthError, AuthUser, IdTokenCell, IdentityProvider};
use crate::config::BackendConfig;
use crate::error::BackendError;

/// Client for the Identity Toolkit `accounts:*` endpoints.
#[derive(Clone)]
pub struct IdentityToolkitClient {
    inner: Arc<IdentityToolkitInner>,
}

struct IdentityToolkitInner {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    token: IdTokenCell,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    email: String,
    id_token: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl IdentityToolkitClient {
    /// Create a client sharing `token` with the database client.
    #[must_use]
    pub fn new(config: &BackendConfig, token: IdTokenCell) -> Self {
        let endpoint = format!(
            "{}/v1",
            config.auth_endpoint.as_str().trim_end_matches('/')
        );

        Self {
            inner: Arc::new(IdentityToolkitInner {
                client: reqwest::Client::new(),
                endpoint,
                api_key: config.api_key.clone(),
                token,
            }),
        }
    }

    /// Call an `accounts:<method>` endpoint with email and password.
    async fn password_call(
        &self,
        method: &str,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let url = format!("{}/accounts:{method}", self.inner.endpoint);
        let response = self
            .inner
            .client
            .post(&url)
            .query(&[("key", self.inner.api_key.expose_secret())])
            .json(&PasswordRequest {
                email: email.as_str(),
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(BackendError::from)?;

        let status = response.status();
        let body = response.text().await.map_err(BackendError::from)?;

        if !status.is_success() {
            tracing::debug!(status = %status, method, "Identity Toolkit rejected request");
            return Err(map_error(status.as_u16(), &body));
        }

        let parsed: PasswordResponse = serde_json::from_str(&body).map_err(BackendError::from)?;
        let uid = Uid::parse(&parsed.local_id).map_err(|e| BackendError::Malformed {
            path: format!("accounts:{method}"),
            reason: e.to_string(),
        })?;
        let email = Email::parse(&parsed.email)?;

        self.inner.token.set(SecretString::from(parsed.id_token)).await;

        Ok(AuthUser { uid, email })
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        self.password_call("signInWithPassword", email, password)
            .await
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_up_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        self.password_call("signUp", email, password).await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        // ID tokens are bearer tokens; forgetting it ends the session.
        self.inner.token.clear().await;
        Ok(())
    }
}

/// Translate an Identity Toolkit error response into an [`AuthError`].
fn map_error(status: u16, body: &str) -> AuthError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());

    // Messages look like "WEAK_PASSWORD : Password should be at least 6 characters"
    let (code, detail) = message
        .split_once(" : ")
        .map_or((message.as_str(), None), |(c, d)| (c, Some(d)));

    match code.trim() {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "INVALID_EMAIL" => {
            AuthError::InvalidCredentials
        }
        "EMAIL_EXISTS" => AuthError::UserAlreadyExists,
        "WEAK_PASSWORD" => AuthError::WeakPassword(
            detail.unwrap_or("Password is too weak").trim().to_string(),
        ),
        "USER_DISABLED" => AuthError::UserDisabled,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::TooManyAttempts,
        _ => AuthError::Backend(BackendError::Status {
            status,
            message: message.clone(),
        }),
    }
}
