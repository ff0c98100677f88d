//! Page view models and templates.
//!
//! [`PageView::project`] turns session state, the restaurant and the live
//! order list into display strings; the Askama templates only lay them out.

use askama::Template;
use qr_table_core::{CurrencyCode, PaymentMode, Price};
use rust_decimal::Decimal;

use crate::repository::{Order, Restaurant};
use crate::session::SessionStore;

/// Cart line display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLineView {
    pub item: String,
    pub name: String,
    pub quantity: u32,
    pub price: String,
    pub line_price: String,
}

/// Payment choice display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOptionView {
    pub value: String,
    pub label: &'static str,
    pub selected: bool,
}

/// Cart display data for templates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub item_count: u32,
    pub subtotal: String,
    pub coupon_code: Option<String>,
    pub discount: Option<String>,
    pub total: String,
    pub payment_options: Vec<PaymentOptionView>,
    /// Whether the order button should be enabled.
    pub can_submit: bool,
}

/// One order in the table's live order list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderView {
    pub id: String,
    pub status: String,
    pub status_label: &'static str,
    pub open: bool,
    pub item_count: u32,
    pub total: String,
    pub placed_at: String,
}

/// Signed-in user display data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccountView {
    pub email: Option<String>,
    pub points: Option<i64>,
}

impl AccountView {
    #[must_use]
    pub const fn signed_in(&self) -> bool {
        self.email.is_some()
    }
}

/// Everything the page shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub restaurant_name: String,
    pub table_no: String,
    pub cart: CartView,
    pub orders: Vec<OrderView>,
    pub account: AccountView,
    /// Last error to show the diner, if any.
    pub error: Option<String>,
}

impl PageView {
    /// Project the current state for rendering.
    ///
    /// `restaurant` is `None` until its document has loaded; prices then use
    /// the default currency.
    #[must_use]
    pub fn project(
        session: &SessionStore,
        restaurant: Option<&Restaurant>,
        orders: &[Order],
        error: Option<&str>,
    ) -> Self {
        let currency = restaurant.map_or_else(CurrencyCode::default, |r| r.currency);
        let fmt = |amount: Decimal| Price::new(amount, currency).display();

        let lines = session
            .cart()
            .lines()
            .iter()
            .map(|line| CartLineView {
                item: line.item.to_string(),
                name: line.name.clone(),
                quantity: line.quantity,
                price: fmt(line.price),
                line_price: fmt(line.line_total()),
            })
            .collect();

        let payment_options = PaymentMode::ALL
            .iter()
            .map(|mode| PaymentOptionView {
                value: mode.to_string(),
                label: mode.label(),
                selected: session.payment() == Some(*mode),
            })
            .collect();

        let discount = session.discount();
        let cart = CartView {
            lines,
            item_count: session.cart().item_count(),
            subtotal: fmt(session.subtotal()),
            coupon_code: session.coupon().map(|c| c.code.clone()),
            discount: (discount > Decimal::ZERO).then(|| format!("-{}", fmt(discount))),
            total: fmt(session.total()),
            payment_options,
            can_submit: !session.cart().is_empty() && session.payment().is_some(),
        };

        let orders = orders
            .iter()
            .map(|order| OrderView {
                id: order.id.to_string(),
                status: format!("{:?}", order.status).to_lowercase(),
                status_label: order.status.label(),
                open: order.status.is_open(),
                item_count: order.item_count(),
                total: fmt(order.total),
                placed_at: order.created_at.format("%H:%M").to_string(),
            })
            .collect();

        let account = session
            .user()
            .map(|user| AccountView {
                email: user.email.as_ref().map(|e| e.as_str().to_string()),
                points: user.points,
            })
            .unwrap_or_default();

        Self {
            restaurant_name: restaurant.map_or_else(String::new, |r| r.name.clone()),
            table_no: session.context().table_no().to_string(),
            cart,
            orders,
            account,
            error: error.map(String::from),
        }
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Whole page.
#[derive(Template)]
#[template(path = "page.html")]
pub struct PageTemplate<'a> {
    pub view: &'a PageView,
}

/// Cart fragment, re-rendered after every cart action.
#[derive(Template)]
#[template(path = "cart.html")]
pub struct CartTemplate<'a> {
    pub view: &'a PageView,
}

/// Live order list fragment.
#[derive(Template)]
#[template(path = "orders.html")]
pub struct OrdersTemplate<'a> {
    pub view: &'a PageView,
}

/// Sign-in state and loyalty points fragment.
#[derive(Template)]
#[template(path = "account.html")]
pub struct AccountTemplate<'a> {
    pub view: &'a PageView,
}
