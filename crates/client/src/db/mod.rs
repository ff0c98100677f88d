//! Document database access.
//!
//! # Collections
//!
//! - `restaurants` - Name, currency and menu, keyed by restaurant id
//! - `orders` - One document per submitted order
//! - `coupons` - Discount codes with a validity window
//! - `users` - Loyalty point balance, keyed by UID
//!
//! Two stores implement [`DocumentStore`]: [`FirestoreClient`] talks to the
//! hosted database over REST, [`EmulatorStore`] keeps everything in memory.

mod emulator;
pub mod firestore;

use async_trait::async_trait;
use serde_json::Value;

pub use emulator::EmulatorStore;
pub use firestore::FirestoreClient;

use crate::error::BackendError;
use crate::subscription::LiveQuery;

/// Collection holding restaurant documents.
pub const RESTAURANTS: &str = "restaurants";
/// Collection holding order documents.
pub const ORDERS: &str = "orders";
/// Collection holding coupon documents.
pub const COUPONS: &str = "coupons";
/// Collection holding per-user loyalty documents.
pub const USERS: &str = "users";

/// A document read from a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id within its collection.
    pub id: String,
    /// Field values as a JSON object.
    pub data: Value,
}

impl Document {
    /// Decode the fields into a typed value.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Malformed` if the fields do not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<T, BackendError> {
        serde_json::from_value(self.data.clone()).map_err(|e| BackendError::Malformed {
            path: format!("{collection}/{}", self.id),
            reason: e.to_string(),
        })
    }

    /// Decode the fields plus the document id, exposed as an `id` field.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Malformed` if the fields do not match `T`.
    pub fn decode_with_id<T: serde::de::DeserializeOwned>(
        &self,
        collection: &str,
    ) -> Result<T, BackendError> {
        let mut data = self.data.clone();
        if let Some(object) = data.as_object_mut() {
            object.insert("id".to_string(), Value::String(self.id.clone()));
        }
        serde_json::from_value(data).map_err(|e| BackendError::Malformed {
            path: format!("{collection}/{}", self.id),
            reason: e.to_string(),
        })
    }
}

/// Equality filter on one field. Dotted paths reach into nested maps.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

/// A collection query: equality filters joined with AND.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<FieldFilter>,
    pub limit: Option<u32>,
}

impl Query {
    /// Match every document in `collection`.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            limit: None,
        }
    }

    /// Keep only documents whose `field` equals `value`.
    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// Return at most `limit` documents.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document's fields satisfy every filter.
    #[must_use]
    pub fn matches(&self, data: &Value) -> bool {
        self.filters
            .iter()
            .all(|f| field_value(data, &f.field) == Some(&f.value))
    }
}

/// Look up a dotted field path in a JSON object.
#[must_use]
pub fn field_value<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(data, |value, segment| value.get(segment))
}

/// Hosted document database contract.
///
/// Failures are returned as-is; nothing here retries.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read one document. `None` if it does not exist.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError>;

    /// Create a document with a generated id and return the id.
    async fn add(&self, collection: &str, data: Value) -> Result<String, BackendError>;

    /// Create or replace the document at `collection/id`.
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError>;

    /// Atomically add `by` to a numeric field, creating the document or
    /// field as needed.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<(), BackendError>;

    /// Run a query once.
    async fn query(&self, query: &Query) -> Result<Vec<Document>, BackendError>;

    /// Run a query and keep delivering its result set as it changes.
    ///
    /// The first item is the current result set.
    fn watch(&self, query: Query) -> LiveQuery<Vec<Document>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_query_matches_all_filters() {
        let query = Query::collection(ORDERS)
            .where_eq("restaurant_id", "rest123")
            .where_eq("table_no", "05");

        assert!(query.matches(&json!({"restaurant_id": "rest123", "table_no": "05", "x": 1})));
        assert!(!query.matches(&json!({"restaurant_id": "rest123", "table_no": "06"})));
        assert!(!query.matches(&json!({"restaurant_id": "rest123"})));
    }

    #[test]
    fn test_dotted_field_path() {
        let data = json!({"table": {"no": "05"}});
        assert_eq!(field_value(&data, "table.no"), Some(&json!("05")));
        assert_eq!(field_value(&data, "table.missing"), None);
        assert!(Query::collection(ORDERS).where_eq("table.no", "05").matches(&data));
    }

    #[test]
    fn test_empty_query_matches_everything() {
        assert!(Query::collection(COUPONS).matches(&json!({})));
    }

    #[test]
    fn test_decode_reports_document_path() {
        #[derive(Debug, serde::Deserialize)]
        struct Points {
            #[allow(dead_code)]
            points: i64,
        }

        let doc = Document {
            id: "u1".to_string(),
            data: json!({"points": "lots"}),
        };
        let err = doc.decode::<Points>(USERS).unwrap_err();
        assert!(matches!(err, BackendError::Malformed { ref path, .. } if path == "users/u1"));
    }
}
