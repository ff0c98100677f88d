//! Integration tests for the QR table ordering client.
//!
//! Every test runs a full page against the in-process emulator backend, so
//! no hosted services are needed:
//!
//! ```bash
//! cargo test -p qr-table-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_persistence` - Write-through cart storage across page loads
//! - `ordering_flow` - Coupons, order submission and the live order list
//! - `auth_and_points` - Sign-in state and loyalty points

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;
use std::time::Duration;

use qr_table_client::db::{DocumentStore, EmulatorStore, RESTAURANTS};
use qr_table_client::{Backend, LocalStorage, MemoryStorage, OrderPage, PageEvent};
use serde_json::json;

/// Restaurant seeded into every test backend.
pub const RESTAURANT_ID: &str = "rest123";

/// Page URL for table 05 of the seeded restaurant.
pub const TABLE_05_URL: &str = "https://order.example.com/menu?resId=rest123&table=05";

/// How long tests wait for a live update before failing.
pub const LIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// Emulator backend plus the storage a "browser" would keep between loads.
pub struct TestContext {
    pub backend: Backend,
    pub store: EmulatorStore,
    pub storage: MemoryStorage,
}

impl TestContext {
    /// Backend seeded with one restaurant and its menu.
    ///
    /// # Panics
    ///
    /// Panics if seeding the emulator fails.
    #[allow(clippy::unwrap_used)]
    pub async fn new() -> Self {
        let (backend, store) = Backend::emulator();
        store
            .set(
                RESTAURANTS,
                RESTAURANT_ID,
                json!({
                    "name": "Dosa Corner",
                    "currency": "INR",
                    "menu": [
                        {"id": "masala-dosa", "name": "Masala Dosa", "price": 120},
                        {"id": "idli", "name": "Idli", "price": "60.50"},
                        {"id": "filter-coffee", "name": "Filter Coffee", "price": 40},
                        {"id": "vada", "name": "Vada", "price": 50, "available": false}
                    ]
                }),
            )
            .await
            .unwrap();

        Self {
            backend,
            store,
            storage: MemoryStorage::new(),
        }
    }

    /// Mount a page; every page shares this context's storage.
    ///
    /// # Panics
    ///
    /// Panics if the page fails to mount.
    #[allow(clippy::unwrap_used)]
    pub async fn mount(&self, url: &str) -> OrderPage {
        let storage: Arc<dyn LocalStorage> = Arc::new(self.storage.clone());
        OrderPage::mount(url, self.backend.clone(), storage)
            .await
            .unwrap()
    }
}

/// Wait for the next order list update, skipping other events.
///
/// # Panics
///
/// Panics if no update arrives within [`LIVE_TIMEOUT`].
#[allow(clippy::expect_used)]
pub async fn next_orders(page: &mut OrderPage) {
    let wait = async {
        loop {
            if page.next_event().await == PageEvent::OrdersUpdated {
                break;
            }
        }
    };
    tokio::time::timeout(LIVE_TIMEOUT, wait)
        .await
        .expect("no order update arrived");
}
