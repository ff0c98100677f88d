//! Order and coupon repository.
//!
//! Restaurant reads, live order queries, order submission, coupon
//! validation and loyalty points, on top of any [`DocumentStore`].
//! Restaurants are cached with `moka` for the configured TTL.

mod models;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use moka::future::Cache;
use qr_table_core::{OrderId, OrderStatus, PaymentMode, RestaurantId, TableNo, Uid};
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, instrument};

pub use models::{Coupon, MenuItem, Order, Restaurant, UserProfile};

use crate::cart::Cart;
use crate::context::RestaurantContext;
use crate::db::{COUPONS, DocumentStore, ORDERS, Query, RESTAURANTS, USERS};
use crate::error::{BackendError, ClientError, Result, ValidationError};
use crate::session::AppliedCoupon;
use crate::subscription::LiveQuery;
use models::NewOrder;

/// Field on the loyalty document holding the balance.
const POINTS_FIELD: &str = "points";

/// Reads and writes restaurant, order, coupon and loyalty documents.
///
/// Holds no page state; the only long-lived resources it hands out are
/// live queries, which the caller owns.
#[derive(Clone)]
pub struct OrderRepository {
    inner: Arc<OrderRepositoryInner>,
}

struct OrderRepositoryInner {
    store: Arc<dyn DocumentStore>,
    restaurants: Cache<RestaurantId, Restaurant>,
}

impl OrderRepository {
    /// Create a repository over `store`, caching restaurants for `cache_ttl`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, cache_ttl: Duration) -> Self {
        let restaurants = Cache::builder()
            .max_capacity(100)
            .time_to_live(cache_ttl)
            .build();

        Self {
            inner: Arc::new(OrderRepositoryInner { store, restaurants }),
        }
    }

    /// Fetch a restaurant with its menu.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no such restaurant exists.
    #[instrument(skip(self), fields(restaurant_id = %restaurant_id))]
    pub async fn get_restaurant(&self, restaurant_id: &RestaurantId) -> Result<Restaurant> {
        if let Some(restaurant) = self.inner.restaurants.get(restaurant_id).await {
            debug!("Cache hit for restaurant");
            return Ok(restaurant);
        }

        let doc = self
            .inner
            .store
            .get(RESTAURANTS, restaurant_id.as_str())
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("Restaurant {restaurant_id}")))?;
        let restaurant: Restaurant = doc.decode_with_id(RESTAURANTS)?;

        self.inner
            .restaurants
            .insert(restaurant_id.clone(), restaurant.clone())
            .await;

        Ok(restaurant)
    }

    /// Drop a cached restaurant so the next read goes to the database.
    pub async fn invalidate_restaurant(&self, restaurant_id: &RestaurantId) {
        self.inner.restaurants.invalidate(restaurant_id).await;
    }

    /// Live list of orders placed at one table, newest first.
    ///
    /// The first item is the current list. The query runs until the returned
    /// handle is cancelled or dropped.
    #[instrument(skip(self), fields(restaurant_id = %restaurant_id, table_no = %table_no))]
    pub fn watch_orders(
        &self,
        restaurant_id: &RestaurantId,
        table_no: &TableNo,
    ) -> LiveQuery<Vec<Order>> {
        let query = Query::collection(ORDERS)
            .where_eq("restaurant_id", restaurant_id.as_str())
            .where_eq("table_no", table_no.as_str());

        self.inner.store.watch(query).map(|docs| {
            let mut orders = docs
                .iter()
                .map(|doc| doc.decode_with_id::<Order>(ORDERS))
                .collect::<std::result::Result<Vec<_>, BackendError>>()?;
            orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(orders)
        })
    }

    /// Place an order for the cart's contents.
    ///
    /// The coupon discount is capped at the subtotal. Nothing is written
    /// when validation fails.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyCart` if the cart has no lines and
    /// `ValidationError::PaymentModeUnset` if no payment mode was chosen.
    #[instrument(
        skip(self, context, cart, coupon, uid),
        fields(restaurant_id = %context.restaurant_id(), table_no = %context.table_no())
    )]
    pub async fn submit_order(
        &self,
        context: &RestaurantContext,
        cart: &Cart,
        payment: Option<PaymentMode>,
        coupon: Option<&AppliedCoupon>,
        uid: Option<&Uid>,
    ) -> Result<OrderId> {
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }
        let payment_mode = payment.ok_or(ValidationError::PaymentModeUnset)?;

        let subtotal = cart.subtotal();
        let discount = coupon.map_or(Decimal::ZERO, |c| c.discount.min(subtotal));
        let order = NewOrder {
            restaurant_id: context.restaurant_id(),
            table_no: context.table_no(),
            items: cart.lines(),
            payment_mode,
            status: OrderStatus::Pending,
            subtotal,
            discount,
            total: subtotal - discount,
            coupon_code: coupon.map(|c| c.code.as_str()),
            uid,
            created_at: Utc::now(),
        };
        let data = serde_json::to_value(&order).map_err(BackendError::from)?;

        let id = self.inner.store.add(ORDERS, data).await?;
        let order_id = OrderId::parse(&id).map_err(|e| BackendError::Malformed {
            path: ORDERS.to_string(),
            reason: e.to_string(),
        })?;

        tracing::info!(order_id = %order_id, total = %order.total, "Order submitted");
        Ok(order_id)
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no such order exists.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: &OrderId) -> Result<Order> {
        let doc = self
            .inner
            .store
            .get(ORDERS, order_id.as_str())
            .await?
            .ok_or_else(|| ClientError::NotFound(format!("Order {order_id}")))?;
        Ok(doc.decode_with_id(ORDERS)?)
    }

    /// Look up a coupon code and return its discount.
    ///
    /// Codes are matched case-insensitively (stored uppercase).
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyCouponCode` for a blank code and
    /// `ClientError::NotFound` if the code does not exist, is inactive, or
    /// has expired. The three cases are not distinguished.
    #[instrument(skip(self))]
    pub async fn validate_coupon(&self, code: &str) -> Result<Decimal> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Err(ValidationError::EmptyCouponCode.into());
        }

        let query = Query::collection(COUPONS)
            .where_eq("code", code.as_str())
            .limit(1);
        let docs = self.inner.store.query(&query).await?;

        let now = Utc::now();
        let coupon = docs
            .first()
            .map(|doc| doc.decode::<Coupon>(COUPONS))
            .transpose()?
            .filter(|c| c.is_redeemable(now))
            .ok_or_else(|| ClientError::NotFound(format!("Coupon {code}")))?;

        Ok(coupon.discount.max(Decimal::ZERO))
    }

    /// Loyalty point balance. Users without a loyalty document have 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn get_points(&self, uid: &Uid) -> Result<i64> {
        let profile = self
            .inner
            .store
            .get(USERS, uid.as_str())
            .await?
            .map(|doc| doc.decode::<UserProfile>(USERS))
            .transpose()?
            .unwrap_or_default();
        Ok(profile.points)
    }

    /// Credit points for an order total and return how many were awarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn award_points(&self, uid: &Uid, order_total: Decimal) -> Result<i64> {
        let points = points_for(order_total);
        if points > 0 {
            self.inner
                .store
                .increment(USERS, uid.as_str(), POINTS_FIELD, points)
                .await?;
            debug!(points, "Loyalty points awarded");
        }
        Ok(points)
    }

    /// Write a restaurant document, replacing any cached copy.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    #[instrument(skip(self, restaurant), fields(restaurant_id = %restaurant.id))]
    pub async fn put_restaurant(&self, restaurant: &Restaurant) -> Result<()> {
        let mut data = serde_json::to_value(restaurant).map_err(BackendError::from)?;
        if let Some(object) = data.as_object_mut() {
            object.remove("id");
        }
        self.inner
            .store
            .set(RESTAURANTS, restaurant.id.as_str(), data)
            .await?;
        self.invalidate_restaurant(&restaurant.id).await;
        Ok(())
    }

    /// Write a coupon document keyed by its code.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    #[instrument(skip(self, coupon), fields(code = %coupon.code))]
    pub async fn put_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut coupon = coupon.clone();
        coupon.code = coupon.code.trim().to_uppercase();
        let data: Value = serde_json::to_value(&coupon).map_err(BackendError::from)?;
        self.inner.store.set(COUPONS, &coupon.code, data).await?;
        Ok(())
    }
}

/// One point per whole currency unit.
#[must_use]
pub fn points_for(order_total: Decimal) -> i64 {
    i64::try_from(order_total.trunc()).map_or(0, |p| p.max(0))
}
