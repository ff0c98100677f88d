//! Unified error handling with Sentry integration.
//!
//! Every page-level operation returns `Result<T, ClientError>`. Auth and
//! validation failures are meant for the diner to correct; backend failures
//! are passed through untouched (no retry) and captured to Sentry.

use thiserror::Error;

use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::context::ContextError;
use crate::storage::StorageError;

/// Transport-level failure talking to the hosted services.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message reported by the service.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A document did not have the expected shape.
    #[error("malformed document {path}: {reason}")]
    Malformed {
        /// Document path or collection name.
        path: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Input rejected before anything was written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Order submitted with no line items.
    #[error("cart is empty")]
    EmptyCart,

    /// Order submitted without choosing how to pay.
    #[error("select a payment mode before ordering")]
    PaymentModeUnset,

    /// Menu item is not on this restaurant's menu.
    #[error("unknown menu item: {0}")]
    UnknownItem(String),

    /// Menu item exists but is currently not served.
    #[error("{0} is not available right now")]
    ItemUnavailable(String),

    /// Quantity outside the accepted range.
    #[error("quantity must be between 1 and {max}")]
    Quantity {
        /// Largest quantity accepted on one line.
        max: u32,
    },

    /// Coupon code is blank.
    #[error("enter a coupon code")]
    EmptyCouponCode,
}

/// Client-level error type.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Document does not exist (restaurant, coupon, order).
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Hosted service failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Page URL did not identify a restaurant.
    #[error("Page URL error: {0}")]
    Context(#[from] ContextError),

    /// Page fragment failed to render.
    #[error("Template error: {0}")]
    Render(#[from] askama::Error),

    /// Local storage could not be opened.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// Whether the diner can fix this by changing their input.
    #[must_use]
    pub const fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Validation(_) | Self::NotFound(_))
    }

    /// Message suitable for showing on the page.
    ///
    /// Backend and configuration details are not exposed to the diner.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Backend(_) | Self::Render(_) | Self::Storage(_) => {
                "Something went wrong, please try again".to_string()
            }
            Self::Config(_) => {
                "Ordering is unavailable right now, please ask the staff".to_string()
            }
            Self::Context(_) => {
                "This table link is not valid, please rescan the QR code".to_string()
            }
            Self::Auth(err) => err.user_message(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Validation(err) => err.to_string(),
        }
    }

    /// Capture server-side failures to Sentry and log them.
    pub fn report(&self) {
        if matches!(
            self,
            Self::Backend(_) | Self::Config(_) | Self::Render(_) | Self::Storage(_)
        ) {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Client error"
            );
        }
    }
}

/// Result type alias for `ClientError`.
pub type Result<T> = std::result::Result<T, ClientError>;
