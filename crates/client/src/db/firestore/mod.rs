//! Firestore REST client.
//!
//! Uses `reqwest` 0.13 against the `v1` documents API. Requests carry the web
//! API key and, when a user is signed in, their ID token so security rules
//! see the right user. Live queries are served by re-running the query on an
//! interval and emitting only when the result set changes.

pub mod value;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::{Document, DocumentStore, Query};
use crate::auth::IdTokenCell;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::subscription::LiveQuery;

/// Client for the Firestore REST API.
#[derive(Clone)]
pub struct FirestoreClient {
    inner: Arc<FirestoreClientInner>,
}

struct FirestoreClientInner {
    client: reqwest::Client,
    /// `{endpoint}/v1/projects/{project}/databases/(default)/documents`
    documents_url: String,
    /// `projects/{project}/databases/(default)/documents`
    documents_path: String,
    api_key: SecretString,
    token: IdTokenCell,
    poll_interval: Duration,
}

#[derive(Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Option<Value>,
}

#[derive(Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<RawDocument>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl FirestoreClient {
    /// Create a client sharing `token` with the identity client.
    #[must_use]
    pub fn new(config: &BackendConfig, token: IdTokenCell) -> Self {
        let documents_path = format!(
            "projects/{}/databases/(default)/documents",
            config.project_id
        );
        let documents_url = format!(
            "{}/v1/{documents_path}",
            config.database_endpoint.as_str().trim_end_matches('/')
        );

        Self {
            inner: Arc::new(FirestoreClientInner {
                client: reqwest::Client::new(),
                documents_url,
                documents_path,
                api_key: config.api_key.clone(),
                token,
                poll_interval: config.live_query_interval,
            }),
        }
    }

    /// Build a request with the API key and the signed-in user's token.
    async fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self
            .inner
            .client
            .request(method, url)
            .query(&[("key", self.inner.api_key.expose_secret())]);

        match self.inner.token.get().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and return the body of a successful response.
    ///
    /// `Ok(None)` for a 404 when `allow_missing` is set.
    async fn send(
        builder: reqwest::RequestBuilder,
        allow_missing: bool,
    ) -> Result<Option<String>, BackendError> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if allow_missing && status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }
        Ok(Some(body))
    }

    /// URL of one document, with the id percent-encoded as a single segment.
    fn document_url(&self, collection: &str, id: &str) -> Result<String, BackendError> {
        check_document_id(collection, id)?;
        let malformed = |reason: String| BackendError::Malformed {
            path: self.inner.documents_url.clone(),
            reason,
        };

        let mut url =
            Url::parse(&self.inner.documents_url).map_err(|e| malformed(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| malformed("database endpoint cannot hold a path".to_string()))?
            .push(collection)
            .push(id);
        Ok(url.into())
    }

    /// Poll `query` until the receiver goes away.
    async fn poll(
        self,
        query: Query,
        tx: tokio::sync::mpsc::Sender<Result<Vec<Document>, BackendError>>,
    ) {
        let mut interval = tokio::time::interval(self.inner.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last: Option<Vec<Document>> = None;

        loop {
            interval.tick().await;
            let item = match self.query(&query).await {
                Ok(docs) if last.as_ref() == Some(&docs) => continue,
                Ok(docs) => {
                    last = Some(docs.clone());
                    Ok(docs)
                }
                Err(e) => {
                    debug!(collection = %query.collection, error = %e, "Live query refresh failed");
                    Err(e)
                }
            };
            if tx.send(item).await.is_err() {
                break;
            }
        }
    }
}

/// Reject ids Firestore reserves or that would step out of the collection.
fn check_document_id(collection: &str, id: &str) -> Result<(), BackendError> {
    if id.is_empty() || id.contains('/') || qr_table_core::is_reserved_id(id) {
        return Err(BackendError::Malformed {
            path: format!("{collection}/{id}"),
            reason: "not a valid document id".to_string(),
        });
    }
    Ok(())
}

/// Convert a REST document into a [`Document`].
fn decode_document(raw: RawDocument) -> Result<Document, BackendError> {
    let id = raw
        .name
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| BackendError::Malformed {
            path: raw.name.clone(),
            reason: "document name has no id".to_string(),
        })?
        .to_string();
    let data = value::decode_fields(raw.fields.as_ref())?;
    Ok(Document { id, data })
}

/// Build a `structuredQuery` body.
fn structured_query(query: &Query) -> Value {
    let mut filters: Vec<Value> = query
        .filters
        .iter()
        .map(|f| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": f.field },
                    "op": "EQUAL",
                    "value": value::encode_value(&f.value),
                }
            })
        })
        .collect();

    let mut structured = json!({
        "from": [{ "collectionId": query.collection }],
    });
    if filters.len() == 1 {
        structured["where"] = filters.remove(0);
    } else if !filters.is_empty() {
        structured["where"] = json!({
            "compositeFilter": { "op": "AND", "filters": filters }
        });
    }
    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }

    json!({ "structuredQuery": structured })
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
        let url = self.document_url(collection, id)?;
        let builder = self.request(reqwest::Method::GET, &url).await;
        let Some(body) = Self::send(builder, true).await? else {
            return Ok(None);
        };

        let raw: RawDocument = serde_json::from_str(&body)?;
        decode_document(raw).map(Some)
    }

    #[instrument(skip(self, data))]
    async fn add(&self, collection: &str, data: Value) -> Result<String, BackendError> {
        let url = format!("{}/{collection}", self.inner.documents_url);
        let body = json!({ "fields": value::encode_fields(&data)? });
        let builder = self.request(reqwest::Method::POST, &url).await.json(&body);
        let response = Self::send(builder, false).await?.unwrap_or_default();

        let raw: RawDocument = serde_json::from_str(&response)?;
        let doc = decode_document(raw)?;
        debug!(collection, id = %doc.id, "Document created");
        Ok(doc.id)
    }

    #[instrument(skip(self, data))]
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError> {
        let url = self.document_url(collection, id)?;
        let body = json!({ "fields": value::encode_fields(&data)? });
        let builder = self.request(reqwest::Method::PATCH, &url).await.json(&body);
        Self::send(builder, false).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        by: i64,
    ) -> Result<(), BackendError> {
        check_document_id(collection, id)?;
        let url = format!("{}:commit", self.inner.documents_url);
        let body = json!({
            "writes": [{
                "transform": {
                    "document": format!("{}/{collection}/{id}", self.inner.documents_path),
                    "fieldTransforms": [{
                        "fieldPath": field,
                        "increment": value::encode_value(&json!(by)),
                    }]
                }
            }]
        });
        let builder = self.request(reqwest::Method::POST, &url).await.json(&body);
        Self::send(builder, false).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %query.collection))]
    async fn query(&self, query: &Query) -> Result<Vec<Document>, BackendError> {
        let url = format!("{}:runQuery", self.inner.documents_url);
        let builder = self
            .request(reqwest::Method::POST, &url)
            .await
            .json(&structured_query(query));
        let body = Self::send(builder, false).await?.unwrap_or_default();

        // One item per result; items without a document only carry read time.
        let items: Vec<RunQueryItem> = serde_json::from_str(&body)?;
        items
            .into_iter()
            .filter_map(|item| item.document)
            .map(decode_document)
            .collect()
    }

    fn watch(&self, query: Query) -> LiveQuery<Vec<Document>> {
        let client = self.clone();
        LiveQuery::spawn(move |tx| client.poll(query, tx))
    }
}
