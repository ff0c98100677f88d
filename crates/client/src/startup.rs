//! Page startup.
//!
//! Loads configuration, installs logging and error tracking, opens the cart
//! storage directory, connects to the hosted services and mounts the page.
//! A bad configuration aborts startup with `ClientError::Config` before any
//! network or storage access.

use crate::config::{BackendConfig, ConfigError};
use crate::error::{ClientError, Result};
use crate::page::OrderPage;
use crate::telemetry::{self, TelemetryGuard};

/// A mounted page plus the telemetry guard that must outlive it.
pub struct Started {
    pub page: OrderPage,
    pub telemetry: TelemetryGuard,
}

impl std::fmt::Debug for Started {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Started")
            .field("page", &self.page)
            .finish_non_exhaustive()
    }
}

/// Start the page for `page_url` using the process environment (and `.env`).
///
/// # Errors
///
/// Returns `ClientError::Config` for missing or malformed configuration,
/// otherwise the errors of [`OrderPage::open`].
pub async fn start(page_url: &str) -> Result<Started> {
    start_with(page_url, BackendConfig::from_env()).await
}

/// Start the page reading configuration through `lookup`.
///
/// # Errors
///
/// Same as [`start`].
pub async fn start_with_lookup<F>(page_url: &str, lookup: F) -> Result<Started>
where
    F: Fn(&str) -> Option<String>,
{
    start_with(page_url, BackendConfig::from_lookup(lookup)).await
}

async fn start_with(
    page_url: &str,
    config: std::result::Result<BackendConfig, ConfigError>,
) -> Result<Started> {
    let config = config
        .map_err(ClientError::from)
        .inspect_err(ClientError::report)?;

    let telemetry = telemetry::init(&config);
    tracing::info!(
        project_id = %config.project_id,
        storage_dir = %config.storage_dir.display(),
        "Starting ordering page"
    );

    let page = OrderPage::open(page_url, &config)
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Ordering page failed to start"))?;

    Ok(Started { page, telemetry })
}
