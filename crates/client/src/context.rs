//! Restaurant context resolved from the scanned QR link.
//!
//! The QR code on each table encodes a link such as
//! `https://order.example.com/menu?resId=rest123&table=05`. Everything the
//! page reads or writes is scoped to the restaurant and table found here.

use qr_table_core::{IdError, RestaurantId, TableNo};
use thiserror::Error;
use url::Url;

/// Query parameter carrying the restaurant identifier.
pub const RESTAURANT_PARAM: &str = "resId";
/// Query parameter carrying the table number.
pub const TABLE_PARAM: &str = "table";

/// Errors resolving the restaurant context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid page URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("page URL has no 'resId' parameter")]
    MissingRestaurant,
    #[error("invalid restaurant id: {0}")]
    InvalidRestaurant(#[from] IdError),
}

/// Restaurant and table that scope the page. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestaurantContext {
    restaurant_id: RestaurantId,
    table_no: TableNo,
}

impl RestaurantContext {
    /// Build a context from already-parsed parts.
    #[must_use]
    pub const fn new(restaurant_id: RestaurantId, table_no: TableNo) -> Self {
        Self {
            restaurant_id,
            table_no,
        }
    }

    /// Resolve the context from a page URL.
    ///
    /// Accepts an absolute URL or a bare query (`?resId=...`). A missing or
    /// blank `table` falls back to [`TableNo::DEFAULT`]. When a parameter is
    /// repeated the first occurrence wins.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::MissingRestaurant` when `resId` is absent or
    /// blank, and `ContextError::InvalidUrl` when the URL cannot be parsed.
    pub fn from_url(page_url: &str) -> Result<Self, ContextError> {
        let url = match Url::parse(page_url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = Url::parse("http://localhost/")?;
                base.join(page_url)?
            }
            Err(e) => return Err(e.into()),
        };

        let mut restaurant = None;
        let mut table = None;
        for (key, value) in url.query_pairs() {
            match &*key {
                RESTAURANT_PARAM if restaurant.is_none() => restaurant = Some(value.into_owned()),
                TABLE_PARAM if table.is_none() => table = Some(value.into_owned()),
                _ => {}
            }
        }

        let restaurant = restaurant
            .filter(|r| !r.trim().is_empty())
            .ok_or(ContextError::MissingRestaurant)?;

        Ok(Self {
            restaurant_id: RestaurantId::parse(&restaurant)?,
            table_no: TableNo::parse_or_default(table.as_deref()),
        })
    }

    /// Restaurant the page is scoped to.
    #[must_use]
    pub const fn restaurant_id(&self) -> &RestaurantId {
        &self.restaurant_id
    }

    /// Table the page is scoped to.
    #[must_use]
    pub const fn table_no(&self) -> &TableNo {
        &self.table_no
    }
}
