//! The ordering page.
//!
//! An [`OrderPage`] is mounted from the URL a QR code points at. It owns the
//! session store and the live order query for its table, keeps the session's
//! user in step with the auth gateway, and renders the page after each
//! change. Unmounting (or dropping) the page releases the live query.

use std::sync::Arc;

use askama::Template;
use qr_table_core::{MenuItemId, OrderId, PaymentMode};
use rust_decimal::Decimal;
use tracing::instrument;

use crate::auth::{AuthStateWatch, AuthUser};
use crate::backend::Backend;
use crate::cart::MAX_LINE_QUANTITY;
use crate::config::BackendConfig;
use crate::context::RestaurantContext;
use crate::error::{BackendError, ClientError, Result, ValidationError};
use crate::repository::{Order, Restaurant};
use crate::session::SessionStore;
use crate::storage::{FileStorage, LocalStorage};
use crate::subscription::LiveQuery;
use crate::view::{AccountTemplate, CartTemplate, OrdersTemplate, PageTemplate, PageView};

/// What changed when [`OrderPage::next_event`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageEvent {
    /// A new order list snapshot arrived.
    OrdersUpdated,
    /// The live order query reported an error; it keeps running.
    OrdersFailed,
    /// The live order query ended.
    OrdersClosed,
    /// The signed-in user changed.
    AuthChanged,
}

enum Incoming {
    Orders(Option<std::result::Result<Vec<Order>, BackendError>>),
    Auth(Option<Option<AuthUser>>),
}

/// One mounted ordering page.
pub struct OrderPage {
    backend: Backend,
    session: SessionStore,
    restaurant: Restaurant,
    orders: Vec<Order>,
    order_updates: Option<LiveQuery<Vec<Order>>>,
    auth_updates: AuthStateWatch,
    /// Set while the live order query keeps failing.
    orders_failing: bool,
    last_error: Option<String>,
}

impl std::fmt::Debug for OrderPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderPage")
            .field("session", &self.session)
            .field("restaurant", &self.restaurant.id)
            .field("orders", &self.orders.len())
            .field("live", &self.order_updates.is_some())
            .finish_non_exhaustive()
    }
}

impl OrderPage {
    /// Mount the page for `page_url`.
    ///
    /// Resolves the restaurant and table from the URL, hydrates the cart
    /// from `storage`, loads the restaurant, starts the live order query and
    /// picks up whoever is already signed in.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Context` if the URL has no usable `resId`, and
    /// `ClientError::NotFound` if the restaurant does not exist.
    #[instrument(skip(backend, storage))]
    pub async fn mount(
        page_url: &str,
        backend: Backend,
        storage: Arc<dyn LocalStorage>,
    ) -> Result<Self> {
        let context = RestaurantContext::from_url(page_url)?;
        let session = SessionStore::new(context, storage);

        let restaurant = backend
            .orders()
            .get_restaurant(session.context().restaurant_id())
            .await
            .inspect_err(ClientError::report)?;

        let order_updates = backend
            .orders()
            .watch_orders(session.context().restaurant_id(), session.context().table_no());
        let auth_updates = backend.auth().watch();

        let mut page = Self {
            backend,
            session,
            restaurant,
            orders: Vec::new(),
            order_updates: Some(order_updates),
            auth_updates,
            orders_failing: false,
            last_error: None,
        };
        page.sync_auth().await;

        tracing::info!(
            restaurant_id = %page.session.context().restaurant_id(),
            table_no = %page.session.context().table_no(),
            "Page mounted"
        );
        Ok(page)
    }

    /// Mount against the hosted services, keeping the cart in
    /// `config.storage_dir`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Storage` if the storage directory cannot be
    /// created, otherwise the same errors as [`OrderPage::mount`].
    pub async fn open(page_url: &str, config: &BackendConfig) -> Result<Self> {
        let storage = FileStorage::open(config.storage_dir.clone())?;
        Self::mount(page_url, Backend::connect(config), Arc::new(storage)).await
    }

    /// Release the live order query and tear the page down.
    pub fn unmount(mut self) {
        if let Some(updates) = self.order_updates.take() {
            updates.cancel();
        }
        tracing::debug!("Page unmounted");
    }

    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub const fn restaurant(&self) -> &Restaurant {
        &self.restaurant
    }

    /// Latest order list for this table, newest first.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Whether the live order query is still attached.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.order_updates.as_ref().is_some_and(LiveQuery::is_active)
    }

    /// Message for the most recent failed action, cleared by the next
    /// successful one.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Remember the outcome of a diner action for display.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => {
                err.report();
                self.last_error = Some(err.user_message());
            }
        }
        result
    }

    // =========================================================================
    // Cart
    // =========================================================================

    fn parse_item(item: &str) -> Result<MenuItemId> {
        MenuItemId::parse(item)
            .map_err(|_| ValidationError::UnknownItem(item.trim().to_string()).into())
    }

    /// Add `quantity` units of a menu item, priced from the menu.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if the item is unknown or unavailable, or
    /// the quantity is out of range.
    pub fn add_item(&mut self, item: &str, quantity: u32) -> Result<()> {
        let result = Self::parse_item(item).and_then(|id| {
            self.restaurant
                .line_for(&id, quantity)
                .map_err(ClientError::from)
        });
        let result = result.map(|line| self.session.add_item(line));
        self.track(result)
    }

    /// Remove an item from the cart. Returns whether it was there.
    pub fn remove_item(&mut self, item: &str) -> bool {
        MenuItemId::parse(item).is_ok_and(|id| self.session.remove_item(&id))
    }

    /// Change an item's quantity; zero removes it.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::Quantity` above the per-line limit.
    pub fn set_quantity(&mut self, item: &str, quantity: u32) -> Result<bool> {
        let result = if quantity > MAX_LINE_QUANTITY {
            Err(ValidationError::Quantity {
                max: MAX_LINE_QUANTITY,
            }
            .into())
        } else {
            Self::parse_item(item).map(|id| self.session.set_quantity(&id, quantity))
        };
        self.track(result)
    }

    pub fn select_payment(&mut self, mode: PaymentMode) {
        self.session.select_payment(mode);
    }

    // =========================================================================
    // Coupon
    // =========================================================================

    /// Validate a coupon code and apply its discount.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` for unknown or expired codes; the
    /// previously applied coupon, if any, stays applied.
    pub async fn apply_coupon(&mut self, code: &str) -> Result<Decimal> {
        let result = self.backend.orders().validate_coupon(code).await;
        if let Ok(discount) = &result {
            self.session
                .apply_coupon(code.trim().to_uppercase(), *discount);
        }
        self.track(result)
    }

    pub fn remove_coupon(&mut self) {
        self.session.clear_coupon();
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Submit the cart as an order for this table.
    ///
    /// On success the cart, coupon and payment selection are reset and a
    /// signed-in diner is credited loyalty points. A points failure is
    /// logged; the order stands.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyCart` or
    /// `ValidationError::PaymentModeUnset` without writing anything.
    pub async fn submit_order(&mut self) -> Result<OrderId> {
        let uid = self.session.user().map(|u| u.uid.clone());
        let result = self
            .backend
            .orders()
            .submit_order(
                self.session.context(),
                self.session.cart(),
                self.session.payment(),
                self.session.coupon(),
                uid.as_ref(),
            )
            .await;
        let order_id = self.track(result)?;

        let total = self.session.total();
        self.session.complete_order();

        if let Some(uid) = uid {
            let awarded = self.backend.orders().award_points(&uid, total).await;
            match awarded {
                Ok(_) => self.refresh_points().await,
                Err(err) => {
                    err.report();
                    tracing::warn!(order_id = %order_id, error = %err, "Failed to award points");
                }
            }
        }

        Ok(order_id)
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Sign in and load the diner's points.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Auth` for bad credentials.
    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<()> {
        let result = self
            .backend
            .auth()
            .sign_in(email, password)
            .await
            .map(drop)
            .map_err(ClientError::from);
        self.track(result)?;
        self.sync_auth().await;
        Ok(())
    }

    /// Create an account, sign it in and load its points.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Auth` for a duplicate account or weak password.
    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<()> {
        let result = self
            .backend
            .auth()
            .sign_up(email, password)
            .await
            .map(drop)
            .map_err(ClientError::from);
        self.track(result)?;
        self.sync_auth().await;
        Ok(())
    }

    /// Sign out. The session forgets the user and their points.
    ///
    /// # Errors
    ///
    /// Returns an error if the auth service fails; the user is cleared
    /// locally regardless.
    pub async fn sign_out(&mut self) -> Result<()> {
        let result = self
            .backend
            .auth()
            .sign_out()
            .await
            .map_err(ClientError::from);
        self.sync_auth().await;
        self.track(result)
    }

    /// Apply any auth state change that has not been seen yet.
    async fn sync_auth(&mut self) {
        let mut latest = None;
        while let Some(state) = self.auth_updates.try_next() {
            latest = Some(state);
        }
        if let Some(state) = latest {
            self.apply_auth(state).await;
        }
    }

    async fn apply_auth(&mut self, user: Option<AuthUser>) {
        let Some(user) = user else {
            self.session.clear_user();
            return;
        };

        let known = self
            .session
            .user()
            .is_some_and(|u| u.uid == user.uid && u.points.is_some());
        self.session.set_user(user.uid, Some(user.email));
        if !known {
            self.refresh_points().await;
        }
    }

    async fn refresh_points(&mut self) {
        let Some(uid) = self.session.user().map(|u| u.uid.clone()) else {
            return;
        };
        match self.backend.orders().get_points(&uid).await {
            Ok(points) => self.session.set_points(points),
            Err(err) => {
                err.report();
                tracing::warn!(uid = %uid, error = %err, "Failed to load points");
            }
        }
    }

    // =========================================================================
    // Live updates
    // =========================================================================

    /// Wait for the next live update and apply it.
    ///
    /// Waits indefinitely while nothing changes; callers usually race this
    /// against their own input.
    pub async fn next_event(&mut self) -> PageEvent {
        let incoming = {
            let orders = &mut self.order_updates;
            let auth = &mut self.auth_updates;
            tokio::select! {
                update = async {
                    match orders.as_mut() {
                        Some(query) => query.next().await,
                        None => std::future::pending().await,
                    }
                } => Incoming::Orders(update),
                state = auth.next() => Incoming::Auth(state),
            }
        };

        match incoming {
            Incoming::Orders(update) => self.apply_orders(update),
            Incoming::Auth(state) => {
                // The gateway lives as long as the backend handle we hold.
                self.apply_auth(state.flatten()).await;
                PageEvent::AuthChanged
            }
        }
    }

    /// Apply one item from the live order query.
    ///
    /// Errors are reported once per outage: the first failure after a good
    /// snapshot goes to Sentry, repeats are only logged.
    fn apply_orders(
        &mut self,
        update: Option<std::result::Result<Vec<Order>, BackendError>>,
    ) -> PageEvent {
        match update {
            Some(Ok(orders)) => {
                tracing::debug!(count = orders.len(), "Orders updated");
                if std::mem::take(&mut self.orders_failing) {
                    tracing::info!("Live order query recovered");
                }
                self.orders = orders;
                PageEvent::OrdersUpdated
            }
            Some(Err(err)) => {
                let err = ClientError::from(err);
                if self.mark_orders_failing() {
                    err.report();
                } else {
                    tracing::debug!(error = %err, "Live order query still failing");
                }
                self.last_error = Some(err.user_message());
                PageEvent::OrdersFailed
            }
            None => {
                self.order_updates = None;
                PageEvent::OrdersClosed
            }
        }
    }

    /// Record a live query failure. Returns `true` if the query was healthy
    /// until now.
    const fn mark_orders_failing(&mut self) -> bool {
        let newly_failing = !self.orders_failing;
        self.orders_failing = true;
        newly_failing
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    /// Current view model.
    #[must_use]
    pub fn view(&self) -> PageView {
        PageView::project(
            &self.session,
            Some(&self.restaurant),
            &self.orders,
            self.last_error.as_deref(),
        )
    }

    /// Render the whole page.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Render` if a template fails.
    pub fn render(&self) -> Result<String> {
        let view = self.view();
        Ok(PageTemplate { view: &view }.render()?)
    }

    /// Render only the cart section.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Render` if a template fails.
    pub fn render_cart(&self) -> Result<String> {
        let view = self.view();
        Ok(CartTemplate { view: &view }.render()?)
    }

    /// Render only the order list.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Render` if a template fails.
    pub fn render_orders(&self) -> Result<String> {
        let view = self.view();
        Ok(OrdersTemplate { view: &view }.render()?)
    }

    /// Render only the account section.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Render` if a template fails.
    pub fn render_account(&self) -> Result<String> {
        let view = self.view();
        Ok(AccountTemplate { view: &view }.render()?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::db::{DocumentStore, EmulatorStore, RESTAURANTS};
    use crate::storage::MemoryStorage;

    const URL: &str = "https://order.example.com/?resId=rest123&table=05";

    async fn seeded() -> (Backend, EmulatorStore) {
        let (backend, store) = Backend::emulator();
        store
            .set(
                RESTAURANTS,
                "rest123",
                json!({
                    "name": "Dosa Corner",
                    "menu": [
                        {"id": "dosa", "name": "Masala Dosa", "price": 120},
                        {"id": "coffee", "name": "Filter Coffee", "price": 40, "available": false}
                    ]
                }),
            )
            .await
            .unwrap();
        (backend, store)
    }

    async fn mount(backend: &Backend) -> OrderPage {
        OrderPage::mount(URL, backend.clone(), Arc::new(MemoryStorage::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_mount_resolves_context() {
        let (backend, _) = seeded().await;
        let page = mount(&backend).await;
        assert_eq!(page.session().context().restaurant_id().as_str(), "rest123");
        assert_eq!(page.session().context().table_no().as_str(), "05");
        assert_eq!(page.restaurant().name, "Dosa Corner");
        assert!(page.is_live());
    }

    #[tokio::test]
    async fn test_mount_unknown_restaurant() {
        let (backend, _) = Backend::emulator();
        let result = OrderPage::mount(URL, backend, Arc::new(MemoryStorage::new())).await;
        assert!(matches!(result, Err(ClientError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mount_without_restaurant_param() {
        let (backend, _) = seeded().await;
        let result = OrderPage::mount(
            "https://order.example.com/?table=05",
            backend,
            Arc::new(MemoryStorage::new()),
        )
        .await;
        assert!(matches!(result, Err(ClientError::Context(_))));
    }

    #[tokio::test]
    async fn test_add_item_validation_is_shown() {
        let (backend, _) = seeded().await;
        let mut page = mount(&backend).await;

        assert!(page.add_item("coffee", 1).is_err());
        assert_eq!(page.last_error(), Some("Filter Coffee is not available right now"));

        page.add_item("dosa", 2).unwrap();
        assert!(page.last_error().is_none());
        assert_eq!(page.session().cart().item_count(), 2);
    }

    #[tokio::test]
    async fn test_orders_snapshot_arrives() {
        let (backend, _) = seeded().await;
        let mut page = mount(&backend).await;

        let event = tokio::time::timeout(Duration::from_secs(1), page.next_event())
            .await
            .unwrap();
        assert_eq!(event, PageEvent::OrdersUpdated);
        assert!(page.orders().is_empty());
    }

    #[tokio::test]
    async fn test_unmount_releases_live_query() {
        let (backend, store) = seeded().await;
        let page = mount(&backend).await;
        assert!(page.is_live());
        assert_eq!(store.watcher_count(), 1);

        page.unmount();

        tokio::time::timeout(Duration::from_secs(1), store.settle_watchers(0))
            .await
            .unwrap();
        assert_eq!(store.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_page_releases_live_query() {
        let (backend, store) = seeded().await;
        let page = mount(&backend).await;
        let other = mount(&backend).await;
        assert_eq!(store.watcher_count(), 2);

        drop(page);

        tokio::time::timeout(Duration::from_secs(1), store.settle_watchers(1))
            .await
            .unwrap();
        assert_eq!(store.watcher_count(), 1);
        assert!(other.is_live());
    }

    fn unavailable() -> BackendError {
        BackendError::Status {
            status: 503,
            message: "UNAVAILABLE".to_string(),
        }
    }

    #[tokio::test]
    async fn test_outage_reported_once_until_recovery() {
        let (backend, _) = seeded().await;
        let mut page = mount(&backend).await;

        assert_eq!(page.apply_orders(Some(Err(unavailable()))), PageEvent::OrdersFailed);
        assert!(page.orders_failing);
        assert!(!page.mark_orders_failing());
        assert_eq!(page.apply_orders(Some(Err(unavailable()))), PageEvent::OrdersFailed);
        assert!(page.last_error().is_some());

        assert_eq!(page.apply_orders(Some(Ok(Vec::new()))), PageEvent::OrdersUpdated);
        assert!(!page.orders_failing);
        assert!(page.mark_orders_failing());
    }

    #[tokio::test]
    async fn test_closed_query_detaches() {
        let (backend, _) = seeded().await;
        let mut page = mount(&backend).await;
        assert_eq!(page.apply_orders(None), PageEvent::OrdersClosed);
        assert!(!page.is_live());
    }

    #[tokio::test]
    async fn test_render_contains_cart() {
        let (backend, _) = seeded().await;
        let mut page = mount(&backend).await;
        page.add_item("dosa", 1).unwrap();

        let html = page.render().unwrap();
        assert!(html.contains("Masala Dosa"));
        assert!(html.contains("Table 05"));
        assert!(page.render_cart().unwrap().contains("₹120.00"));
        assert!(page.render_account().unwrap().contains("Sign in"));
        assert!(page.render_orders().unwrap().contains("No orders yet"));
    }
}
