//! Authentication error types.

use thiserror::Error;

use crate::error::BackendError;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] qr_table_core::EmailError),

    /// Invalid credentials (wrong password or unknown account).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("user already exists")]
    UserAlreadyExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The account has been disabled by an administrator.
    #[error("user disabled")]
    UserDisabled,

    /// The service is throttling this client.
    #[error("too many attempts, try again later")]
    TooManyAttempts,

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// Network or service failure, passed through unchanged.
    #[error("auth backend error: {0}")]
    Backend(#[from] BackendError),
}

impl AuthError {
    /// Message suitable for showing next to the sign-in form.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidEmail(_) => "Invalid email address".to_string(),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::UserAlreadyExists => "An account with this email already exists".to_string(),
            Self::WeakPassword(msg) => msg.clone(),
            Self::UserDisabled => "This account has been disabled".to_string(),
            Self::TooManyAttempts => "Too many attempts, please try again later".to_string(),
            Self::PasswordHash | Self::Backend(_) => "Authentication error".to_string(),
        }
    }
}
