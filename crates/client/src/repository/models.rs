//! Documents read from and written to the database.

use chrono::{DateTime, Utc};
use qr_table_core::{
    CurrencyCode, MenuItemId, OrderId, OrderStatus, PaymentMode, Price, RestaurantId, TableNo, Uid,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cart::{LineItem, MAX_LINE_QUANTITY};
use crate::error::ValidationError;

const fn default_true() -> bool {
    true
}

/// One dish on a restaurant's menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: MenuItemId,
    pub name: String,
    /// Unit price in the restaurant's currency.
    pub price: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    /// Whether the kitchen is currently serving it.
    #[serde(default = "default_true")]
    pub available: bool,
}

/// A restaurant document (`restaurants/<id>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RestaurantId,
    pub name: String,
    #[serde(default)]
    pub currency: CurrencyCode,
    #[serde(default)]
    pub menu: Vec<MenuItem>,
}

impl Restaurant {
    /// Find a menu item by id.
    #[must_use]
    pub fn menu_item(&self, id: &MenuItemId) -> Option<&MenuItem> {
        self.menu.iter().find(|m| &m.id == id)
    }

    /// Build a cart line for `quantity` units of a menu item, priced from
    /// the menu.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::UnknownItem` if the item is not on the menu,
    /// `ValidationError::ItemUnavailable` if it is not being served, and
    /// `ValidationError::Quantity` if `quantity` is 0 or above the line limit.
    pub fn line_for(&self, id: &MenuItemId, quantity: u32) -> Result<LineItem, ValidationError> {
        if quantity == 0 || quantity > MAX_LINE_QUANTITY {
            return Err(ValidationError::Quantity {
                max: MAX_LINE_QUANTITY,
            });
        }
        let item = self
            .menu_item(id)
            .ok_or_else(|| ValidationError::UnknownItem(id.to_string()))?;
        if !item.available {
            return Err(ValidationError::ItemUnavailable(item.name.clone()));
        }

        Ok(LineItem {
            item: item.id.clone(),
            name: item.name.clone(),
            quantity,
            price: item.price,
        })
    }

    /// Pair an amount with this restaurant's currency.
    #[must_use]
    pub const fn price(&self, amount: Decimal) -> Price {
        Price::new(amount, self.currency)
    }
}

/// A coupon document (`coupons/<id>`), looked up by `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    /// Flat amount taken off the order.
    pub discount: Decimal,
    /// End of the validity window. No value means it never expires.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl Coupon {
    /// Whether the coupon can be redeemed at `now`.
    #[must_use]
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.active && self.valid_until.is_none_or(|until| now < until)
    }
}

/// An order document (`orders/<id>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub restaurant_id: RestaurantId,
    pub table_no: TableNo,
    pub items: Vec<LineItem>,
    pub payment_mode: PaymentMode,
    #[serde(default)]
    pub status: OrderStatus,
    pub subtotal: Decimal,
    #[serde(default)]
    pub discount: Decimal,
    pub total: Decimal,
    #[serde(default)]
    pub coupon_code: Option<String>,
    /// Signed-in user who placed the order.
    #[serde(default)]
    pub uid: Option<Uid>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }
}

/// Fields written when an order is submitted.
#[derive(Debug, Serialize)]
pub(crate) struct NewOrder<'a> {
    pub restaurant_id: &'a RestaurantId,
    pub table_no: &'a TableNo,
    pub items: &'a [LineItem],
    pub payment_mode: PaymentMode,
    pub status: OrderStatus,
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub coupon_code: Option<&'a str>,
    pub uid: Option<&'a Uid>,
    pub created_at: DateTime<Utc>,
}

/// Loyalty document (`users/<uid>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub points: i64,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    fn restaurant() -> Restaurant {
        serde_json::from_value(json!({
            "id": "rest123",
            "name": "Dosa Corner",
            "menu": [
                {"id": "masala-dosa", "name": "Masala Dosa", "price": 120},
                {"id": "filter-coffee", "name": "Filter Coffee", "price": "45.50", "available": false}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_restaurant_defaults() {
        let r = restaurant();
        assert_eq!(r.currency, CurrencyCode::INR);
        assert!(r.menu[0].available);
        assert_eq!(r.menu[1].price, Decimal::new(4550, 2));
    }

    #[test]
    fn test_line_for_prices_from_menu() {
        let r = restaurant();
        let line = r
            .line_for(&MenuItemId::parse("masala-dosa").unwrap(), 2)
            .unwrap();
        assert_eq!(line.name, "Masala Dosa");
        assert_eq!(line.line_total(), Decimal::from(240));
    }

    #[test]
    fn test_line_for_rejects_bad_input() {
        let r = restaurant();
        let unknown = r.line_for(&MenuItemId::parse("idli").unwrap(), 1);
        assert_eq!(unknown, Err(ValidationError::UnknownItem("idli".to_string())));

        let unavailable = r.line_for(&MenuItemId::parse("filter-coffee").unwrap(), 1);
        assert_eq!(
            unavailable,
            Err(ValidationError::ItemUnavailable("Filter Coffee".to_string()))
        );

        let zero = r.line_for(&MenuItemId::parse("masala-dosa").unwrap(), 0);
        assert!(matches!(zero, Err(ValidationError::Quantity { .. })));
    }

    #[test]
    fn test_coupon_redeemable_window() {
        let now = Utc::now();
        let coupon = Coupon {
            code: "SAVE10".to_string(),
            discount: Decimal::from(10),
            valid_until: Some(now + Duration::days(1)),
            active: true,
        };
        assert!(coupon.is_redeemable(now));
        assert!(!coupon.is_redeemable(now + Duration::days(2)));

        let inactive = Coupon {
            active: false,
            ..coupon.clone()
        };
        assert!(!inactive.is_redeemable(now));

        let open_ended = Coupon {
            valid_until: None,
            ..coupon
        };
        assert!(open_ended.is_redeemable(now + Duration::days(3650)));
    }

    #[test]
    fn test_coupon_reads_timestamp_string() {
        let coupon: Coupon = serde_json::from_value(json!({
            "code": "EXPIRED10",
            "discount": 10,
            "valid_until": "2020-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(coupon.active);
        assert!(!coupon.is_redeemable(Utc::now()));
    }
}
