//! Session store: everything the page remembers about the diner.
//!
//! Owns the cart, payment selection, applied coupon and signed-in user for
//! one page lifetime. The cart is written through to local storage after
//! every mutation, keyed by restaurant, so closing the tab never loses it.
//! Everything else is ephemeral.

use std::collections::HashSet;
use std::sync::Arc;

use qr_table_core::{Email, MenuItemId, PaymentMode, RestaurantId, Uid};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cart::{Cart, LineItem, MAX_LINE_QUANTITY};
use crate::context::RestaurantContext;
use crate::storage::LocalStorage;
use crate::telemetry;

/// Prefix of the local storage key holding a restaurant's cart.
pub const CART_KEY_PREFIX: &str = "pl_cart_";

/// Stored cart could not be decoded.
#[derive(Debug, Error)]
pub enum StorageParseError {
    #[error("stored cart is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON decoded but a line breaks the cart's rules.
    #[error("stored cart line for '{item}' {problem}")]
    InvalidLine {
        item: String,
        problem: &'static str,
    },
}

/// Local storage key for a restaurant's cart.
#[must_use]
pub fn cart_key(restaurant_id: &RestaurantId) -> String {
    format!("{CART_KEY_PREFIX}{restaurant_id}")
}

/// Decode a stored cart, holding it to the same rules as [`Cart::add`]:
/// quantities within `1..=MAX_LINE_QUANTITY`, no negative prices, one line
/// per item.
fn parse_cart(raw: &str) -> Result<Cart, StorageParseError> {
    let cart: Cart = serde_json::from_str(raw)?;

    let mut seen = HashSet::new();
    for line in cart.lines() {
        let problem = if !(1..=MAX_LINE_QUANTITY).contains(&line.quantity) {
            Some("has an out-of-range quantity")
        } else if line.price < Decimal::ZERO {
            Some("has a negative price")
        } else if !seen.insert(&line.item) {
            Some("appears more than once")
        } else {
            None
        };
        if let Some(problem) = problem {
            return Err(StorageParseError::InvalidLine {
                item: line.item.to_string(),
                problem,
            });
        }
    }
    Ok(cart)
}

/// Read a restaurant's cart from local storage.
///
/// A missing entry and a corrupt entry both yield an empty cart; the parse
/// failure is logged and otherwise swallowed.
#[must_use]
pub fn load_cart(storage: &dyn LocalStorage, restaurant_id: &RestaurantId) -> Cart {
    let key = cart_key(restaurant_id);
    let Some(raw) = storage.get_item(&key) else {
        return Cart::new();
    };
    match parse_cart(&raw) {
        Ok(cart) => cart,
        Err(e) => {
            warn!(key = %key, error = %e, "Discarding unreadable stored cart");
            Cart::new()
        }
    }
}

/// Overwrite a restaurant's cart in local storage.
///
/// Best effort: a failed write is logged, never surfaced.
pub fn save_cart(storage: &dyn LocalStorage, restaurant_id: &RestaurantId, cart: &Cart) {
    let key = cart_key(restaurant_id);
    let result = serde_json::to_string(cart)
        .map_err(|e| e.to_string())
        .and_then(|json| storage.set_item(&key, &json).map_err(|e| e.to_string()));
    if let Err(e) = result {
        tracing::error!(key = %key, error = %e, "Failed to persist cart");
    }
}

/// Coupon that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    /// Code as entered (normalized to uppercase).
    pub code: String,
    /// Flat discount in the restaurant's currency.
    pub discount: Decimal,
}

/// Signed-in diner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSession {
    pub uid: Uid,
    pub email: Option<Email>,
    /// Loyalty point balance; `None` until loaded.
    pub points: Option<i64>,
}

/// Page-lifetime state for one restaurant table.
pub struct SessionStore {
    context: RestaurantContext,
    storage: Arc<dyn LocalStorage>,
    cart: Cart,
    payment: Option<PaymentMode>,
    coupon: Option<AppliedCoupon>,
    user: Option<UserSession>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("context", &self.context)
            .field("cart", &self.cart)
            .field("payment", &self.payment)
            .field("coupon", &self.coupon)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl SessionStore {
    /// Create a session, hydrating the cart from local storage.
    #[must_use]
    pub fn new(context: RestaurantContext, storage: Arc<dyn LocalStorage>) -> Self {
        let cart = load_cart(storage.as_ref(), context.restaurant_id());
        debug!(
            restaurant_id = %context.restaurant_id(),
            lines = cart.lines().len(),
            "Session hydrated"
        );
        Self {
            context,
            storage,
            cart,
            payment: None,
            coupon: None,
            user: None,
        }
    }

    #[must_use]
    pub const fn context(&self) -> &RestaurantContext {
        &self.context
    }

    #[must_use]
    pub const fn cart(&self) -> &Cart {
        &self.cart
    }

    // =========================================================================
    // Cart (write-through)
    // =========================================================================

    fn persist(&self) {
        save_cart(
            self.storage.as_ref(),
            self.context.restaurant_id(),
            &self.cart,
        );
    }

    /// Add a line, merging with an existing line for the same item.
    pub fn add_item(&mut self, line: LineItem) {
        let item = line.item.to_string();
        self.cart.add(line);
        self.persist();
        telemetry::add_breadcrumb("cart", "Added item", Some(&[("item", item.as_str())]));
    }

    /// Remove an item's line. Returns whether anything was removed.
    pub fn remove_item(&mut self, item: &MenuItemId) -> bool {
        let removed = self.cart.remove(item);
        self.persist();
        if removed {
            telemetry::add_breadcrumb("cart", "Removed item", Some(&[("item", item.as_str())]));
        }
        removed
    }

    /// Change a line's quantity; zero removes it. Returns whether the cart changed.
    pub fn set_quantity(&mut self, item: &MenuItemId, quantity: u32) -> bool {
        let changed = self.cart.set_quantity(item, quantity);
        self.persist();
        changed
    }

    /// Empty the cart.
    pub fn clear_cart(&mut self) {
        self.cart.clear();
        self.persist();
    }

    /// Re-read the cart from local storage, picking up writes from other pages.
    pub fn reload_cart(&mut self) {
        self.cart = load_cart(self.storage.as_ref(), self.context.restaurant_id());
    }

    // =========================================================================
    // Payment
    // =========================================================================

    #[must_use]
    pub const fn payment(&self) -> Option<PaymentMode> {
        self.payment
    }

    pub fn select_payment(&mut self, mode: PaymentMode) {
        self.payment = Some(mode);
    }

    pub fn reset_payment(&mut self) {
        self.payment = None;
    }

    // =========================================================================
    // Coupon
    // =========================================================================

    #[must_use]
    pub const fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    /// Record a coupon that the repository validated.
    pub fn apply_coupon(&mut self, code: impl Into<String>, discount: Decimal) {
        self.coupon = Some(AppliedCoupon {
            code: code.into(),
            discount: discount.max(Decimal::ZERO),
        });
    }

    pub fn clear_coupon(&mut self) {
        self.coupon = None;
    }

    // =========================================================================
    // User
    // =========================================================================

    #[must_use]
    pub const fn user(&self) -> Option<&UserSession> {
        self.user.as_ref()
    }

    /// Record the signed-in user. Switching users drops the old point balance.
    pub fn set_user(&mut self, uid: Uid, email: Option<Email>) {
        let points = self
            .user
            .as_ref()
            .filter(|u| u.uid == uid)
            .and_then(|u| u.points);
        self.user = Some(UserSession { uid, email, points });
    }

    /// Update the point balance of the signed-in user; ignored when signed out.
    pub fn set_points(&mut self, points: i64) {
        if let Some(user) = self.user.as_mut() {
            user.points = Some(points);
        }
    }

    pub fn clear_user(&mut self) {
        self.user = None;
    }

    // =========================================================================
    // Totals
    // =========================================================================

    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.cart.subtotal()
    }

    /// Discount actually applied; never more than the subtotal.
    #[must_use]
    pub fn discount(&self) -> Decimal {
        self.coupon
            .as_ref()
            .map_or(Decimal::ZERO, |c| c.discount.min(self.subtotal()))
    }

    #[must_use]
    pub fn total(&self) -> Decimal {
        self.subtotal() - self.discount()
    }

    /// Reset per-order state after a successful submission.
    pub fn complete_order(&mut self) {
        self.clear_cart();
        self.clear_coupon();
        self.reset_payment();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use qr_table_core::TableNo;

    use super::*;
    use crate::cart::tests::line;
    use crate::storage::MemoryStorage;

    fn context(restaurant: &str) -> RestaurantContext {
        RestaurantContext::new(RestaurantId::parse(restaurant).unwrap(), TableNo::default())
    }

    fn stored(storage: &MemoryStorage, restaurant: &str) -> Cart {
        load_cart(storage, &RestaurantId::parse(restaurant).unwrap())
    }

    fn id(item: &str) -> MenuItemId {
        MenuItemId::parse(item).unwrap()
    }

    #[test]
    fn test_cart_key_format() {
        assert_eq!(
            cart_key(&RestaurantId::parse("rest123").unwrap()),
            "pl_cart_rest123"
        );
    }

    #[test]
    fn test_load_missing_is_empty() {
        let storage = MemoryStorage::new();
        assert!(stored(&storage, "rest123").is_empty());
    }

    #[test]
    fn test_load_malformed_is_empty() {
        let storage = MemoryStorage::new();
        for junk in ["not json", "{\"a\":1}", "[{\"item\":\"x\"}]", "", "null"] {
            storage.set_item("pl_cart_rest123", junk).unwrap();
            assert!(stored(&storage, "rest123").is_empty(), "input: {junk}");
        }
    }

    #[test]
    fn test_load_rule_breaking_lines_is_empty() {
        let storage = MemoryStorage::new();
        let payloads = [
            r#"[{"item":"dosa","name":"Dosa","quantity":0,"price":"80"}]"#,
            r#"[{"item":"dosa","name":"Dosa","quantity":500,"price":"1"}]"#,
            r#"[{"item":"chai","name":"Chai","quantity":1,"price":"-50"}]"#,
            r#"[{"item":"chai","name":"Chai","quantity":1,"price":"20"},
                {"item":"chai","name":"Chai","quantity":2,"price":"20"}]"#,
            r#"[{"item":"dosa","name":"Dosa","quantity":0,"price":"80"},
                {"item":"chai","name":"Chai","quantity":1,"price":"-50"},
                {"item":"chai","name":"Chai","quantity":500,"price":"1"}]"#,
        ];
        for payload in payloads {
            storage.set_item("pl_cart_rest123", payload).unwrap();
            assert!(stored(&storage, "rest123").is_empty(), "input: {payload}");
        }

        let valid = r#"[{"item":"dosa","name":"Dosa","quantity":99,"price":"0"}]"#;
        storage.set_item("pl_cart_rest123", valid).unwrap();
        assert_eq!(stored(&storage, "rest123").item_count(), 99);
    }

    #[test]
    fn test_parse_error_names_the_line() {
        let err = parse_cart(r#"[{"item":"chai","name":"Chai","quantity":1,"price":"-5"}]"#)
            .unwrap_err();
        assert!(matches!(err, StorageParseError::InvalidLine { ref item, .. } if item == "chai"));
    }

    #[test]
    fn test_write_through_after_every_mutation() {
        let storage = MemoryStorage::new();
        let mut session = SessionStore::new(context("rest123"), Arc::new(storage.clone()));

        session.add_item(line("dosa", 1, 80));
        assert_eq!(&stored(&storage, "rest123"), session.cart());

        session.add_item(line("chai", 2, 20));
        assert_eq!(&stored(&storage, "rest123"), session.cart());

        session.set_quantity(&id("dosa"), 4);
        assert_eq!(&stored(&storage, "rest123"), session.cart());

        session.remove_item(&id("chai"));
        assert_eq!(&stored(&storage, "rest123"), session.cart());

        session.set_quantity(&id("dosa"), 0);
        assert_eq!(&stored(&storage, "rest123"), session.cart());
        assert!(session.cart().is_empty());
    }

    #[test]
    fn test_carts_scoped_per_restaurant() {
        let storage = MemoryStorage::new();
        let mut a = SessionStore::new(context("rest-a"), Arc::new(storage.clone()));
        a.add_item(line("dosa", 1, 80));

        let b = SessionStore::new(context("rest-b"), Arc::new(storage.clone()));
        assert!(b.cart().is_empty());

        let a_again = SessionStore::new(context("rest-a"), Arc::new(storage));
        assert_eq!(a_again.cart().item_count(), 1);
    }

    #[test]
    fn test_last_writer_wins_across_pages() {
        let storage = MemoryStorage::new();
        let mut tab_a = SessionStore::new(context("rest123"), Arc::new(storage.clone()));
        let mut tab_b = SessionStore::new(context("rest123"), Arc::new(storage.clone()));

        tab_a.add_item(line("dosa", 1, 80));
        tab_b.add_item(line("chai", 1, 20));

        let persisted = stored(&storage, "rest123");
        assert_eq!(&persisted, tab_b.cart());

        tab_a.reload_cart();
        assert_eq!(tab_a.cart(), &persisted);
    }

    #[test]
    fn test_discount_capped_at_subtotal() {
        let mut session = SessionStore::new(context("rest123"), Arc::new(MemoryStorage::new()));
        session.add_item(line("chai", 1, 20));
        session.apply_coupon("BIG50", Decimal::from(50));

        assert_eq!(session.discount(), Decimal::from(20));
        assert_eq!(session.total(), Decimal::ZERO);

        session.clear_coupon();
        assert_eq!(session.total(), Decimal::from(20));
    }

    #[test]
    fn test_negative_discount_clamped() {
        let mut session = SessionStore::new(context("rest123"), Arc::new(MemoryStorage::new()));
        session.add_item(line("chai", 1, 20));
        session.apply_coupon("ODD", Decimal::from(-5));
        assert_eq!(session.total(), Decimal::from(20));
    }

    #[test]
    fn test_complete_order_resets_and_persists() {
        let storage = MemoryStorage::new();
        let mut session = SessionStore::new(context("rest123"), Arc::new(storage.clone()));
        session.add_item(line("dosa", 1, 80));
        session.select_payment(PaymentMode::Cash);
        session.apply_coupon("SAVE10", Decimal::from(10));

        session.complete_order();

        assert!(session.cart().is_empty());
        assert!(stored(&storage, "rest123").is_empty());
        assert!(session.payment().is_none());
        assert!(session.coupon().is_none());
    }

    #[test]
    fn test_points_follow_user() {
        let mut session = SessionStore::new(context("rest123"), Arc::new(MemoryStorage::new()));
        session.set_points(10);
        assert!(session.user().is_none());

        let uid = Uid::parse("u1").unwrap();
        session.set_user(uid.clone(), None);
        session.set_points(42);
        session.set_user(uid, None);
        assert_eq!(session.user().unwrap().points, Some(42));

        session.set_user(Uid::parse("u2").unwrap(), None);
        assert_eq!(session.user().unwrap().points, None);

        session.clear_user();
        assert!(session.user().is_none());
    }
}
