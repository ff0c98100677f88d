//! In-process identity provider.
//!
//! Behaves like the hosted email/password service: passwords shorter than
//! six characters are rejected, duplicate sign-ups fail, and a wrong password
//! is indistinguishable from an unknown account. Passwords are stored as
//! Argon2id hashes.

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use qr_table_core::{Email, Uid};
use tokio::sync::RwLock;

use super::{AuthError, AuthUser, IdentityProvider};

/// Minimum password length enforced by the hosted service.
pub const MIN_PASSWORD_LENGTH: usize = 6;

struct Account {
    uid: Uid,
    password_hash: String,
}

/// Email/password accounts held in memory.
#[derive(Clone, Default)]
pub struct EmulatorIdentity {
    accounts: Arc<RwLock<HashMap<Email, Account>>>,
}

impl EmulatorIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered accounts.
    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait]
impl IdentityProvider for EmulatorIdentity {
    async fn sign_in_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        let accounts = self.accounts.read().await;
        let account = accounts.get(email).ok_or(AuthError::InvalidCredentials)?;
        verify_password(password, &account.password_hash)?;
        Ok(AuthUser {
            uid: account.uid.clone(),
            email: email.clone(),
        })
    }

    async fn sign_up_with_password(
        &self,
        email: &Email,
        password: &str,
    ) -> Result<AuthUser, AuthError> {
        validate_password(password)?;

        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(email) {
            return Err(AuthError::UserAlreadyExists);
        }

        let uid = Uid::parse(&uuid::Uuid::new_v4().simple().to_string())
            .map_err(|_| AuthError::PasswordHash)?;
        let password_hash = hash_password(password)?;
        accounts.insert(
            email.clone(),
            Account {
                uid: uid.clone(),
                password_hash,
            },
        );

        Ok(AuthUser {
            uid,
            email: email.clone(),
        })
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "Password should be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Argon2id with small parameters; the emulator trades strength for speed.
fn hasher() -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(4096, 1, 1, None).map_err(|_| AuthError::PasswordHash)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    hasher()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    hasher()?
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
