//! In-memory cart.
//!
//! A cart is an ordered list of line items. Adding an item that is already in
//! the cart merges into the existing line instead of appending a duplicate
//! row, so each menu item appears at most once and keeps its original
//! position.

use qr_table_core::MenuItemId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Largest quantity a single line can hold.
pub const MAX_LINE_QUANTITY: u32 = 99;

/// One row of the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// Menu item this line refers to.
    pub item: MenuItemId,
    /// Display name captured when the item was added.
    pub name: String,
    /// Number of units, always at least 1.
    pub quantity: u32,
    /// Unit price in the restaurant's currency.
    pub price: Decimal,
}

impl LineItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Ordered sequence of line items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<LineItem>,
}

impl Cart {
    /// Create an empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Look up the line for a menu item.
    #[must_use]
    pub fn line(&self, item: &MenuItemId) -> Option<&LineItem> {
        self.lines.iter().find(|l| &l.item == item)
    }

    /// Add a line, merging with an existing line for the same item.
    ///
    /// On merge the quantities add up (capped at [`MAX_LINE_QUANTITY`]) and
    /// the unit price and name are refreshed from the incoming line. A line
    /// with zero quantity is ignored.
    pub fn add(&mut self, line: LineItem) {
        if line.quantity == 0 {
            return;
        }
        if let Some(existing) = self.lines.iter_mut().find(|l| l.item == line.item) {
            existing.quantity = existing
                .quantity
                .saturating_add(line.quantity)
                .min(MAX_LINE_QUANTITY);
            existing.price = line.price;
            existing.name = line.name;
        } else {
            self.lines.push(LineItem {
                quantity: line.quantity.min(MAX_LINE_QUANTITY),
                ..line
            });
        }
    }

    /// Remove the line for an item. Returns whether anything was removed.
    pub fn remove(&mut self, item: &MenuItemId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| &l.item != item);
        self.lines.len() != before
    }

    /// Set the quantity of an existing line; zero removes the line.
    ///
    /// Returns whether the cart changed.
    pub fn set_quantity(&mut self, item: &MenuItemId, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove(item);
        }
        match self.lines.iter_mut().find(|l| &l.item == item) {
            Some(line) => {
                let quantity = quantity.min(MAX_LINE_QUANTITY);
                let changed = line.quantity != quantity;
                line.quantity = quantity;
                changed
            }
            None => false,
        }
    }

    /// Remove every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of all line totals.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lines.iter().map(LineItem::line_total).sum()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0u32, |acc, l| acc.saturating_add(l.quantity))
    }
}
