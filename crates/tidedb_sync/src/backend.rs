//! Typed wrapper over the remote document endpoints.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::network::{Method, NetworkClient, NetworkRequest, NetworkResponse};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tidedb_model::Doc;
use tidedb_query::{to_query_params, Query};

/// Response header carrying the backend's own request timestamp.
///
/// Delta bookmarks store this value verbatim; the client clock is never a
/// substitute (clock skew would silently lose changes).
pub const SERVER_TIME_HEADER: &str = "x-tidedb-request-start";

/// Backend error code for a stale or invalid delta `since` token.
const STALE_TOKEN_CODE: &str = "ParameterValueOutOfRange";

/// An incremental change set from the backend.
#[derive(Debug, Clone, Default)]
pub struct DeltaSet {
    /// Documents created or updated since the bookmark.
    pub changed: Vec<Doc>,
    /// Ids of documents deleted since the bookmark.
    pub deleted: Vec<String>,
}

/// Typed access to the remote document endpoints.
///
/// Owns the transport handle, base URL, namespace and default headers;
/// builds URLs and JSON bodies and maps error statuses to structured
/// [`SyncError`]s. One instance serves every collection in its namespace.
pub struct Backend {
    client: Arc<dyn NetworkClient>,
    base_url: String,
    namespace: String,
    headers: Vec<(String, String)>,
    timeout: Option<Duration>,
}

impl Backend {
    /// Creates a backend wrapper from the sync configuration.
    pub fn new(client: Arc<dyn NetworkClient>, config: &SyncConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            headers: config.headers.clone(),
            timeout: config.timeout,
        }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/data/{}/{}", self.base_url, self.namespace, collection)
    }

    fn with_params(url: String, params: &[(String, String)]) -> SyncResult<String> {
        if params.is_empty() {
            return Ok(url);
        }
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|e| SyncError::payload(format!("unencodable query parameters: {e}")))?;
        Ok(format!("{url}?{encoded}"))
    }

    async fn send(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> SyncResult<NetworkResponse> {
        let response = self
            .client
            .send(NetworkRequest {
                method,
                url,
                headers: self.headers.clone(),
                body,
                timeout: self.timeout,
            })
            .await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(Self::server_error(&response))
        }
    }

    fn server_error(response: &NetworkResponse) -> SyncError {
        let code = response
            .data
            .get("error")
            .and_then(Value::as_str)
            .map(String::from);
        if response.status_code == 400 && code.as_deref() == Some(STALE_TOKEN_CODE) {
            return SyncError::StaleDeltaToken;
        }
        let message = response
            .data
            .get("description")
            .or_else(|| response.data.get("message"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| response.data.to_string());
        SyncError::Server {
            status: response.status_code,
            code,
            message,
        }
    }

    fn server_time(response: &NetworkResponse) -> Option<String> {
        response.header(SERVER_TIME_HEADER).map(String::from)
    }

    /// Fetches the documents matching `query`.
    ///
    /// The response is normally a bare array; an enveloped
    /// `{changed, deleted}` body is accepted too, in which case the envelope
    /// is passed through. Returns the change set and the server-time header.
    pub async fn fetch(
        &self,
        collection: &str,
        query: Option<&Query>,
    ) -> SyncResult<(DeltaSet, Option<String>)> {
        let params = query.map(to_query_params).unwrap_or_default();
        let url = Self::with_params(self.collection_url(collection), &params)?;
        let response = self.send(Method::Get, url, None).await?;
        let time = Self::server_time(&response);
        Ok((parse_delta(response.data)?, time))
    }

    /// Fetches the changes to `query`'s results since the `since` bookmark.
    pub async fn fetch_delta(
        &self,
        collection: &str,
        since: &str,
        query: Option<&Query>,
    ) -> SyncResult<(DeltaSet, Option<String>)> {
        let mut params = vec![("since".to_string(), since.to_string())];
        params.extend(query.map(to_query_params).unwrap_or_default());
        let url = Self::with_params(
            format!("{}/_deltaset", self.collection_url(collection)),
            &params,
        )?;
        let response = self.send(Method::Get, url, None).await?;
        let time = Self::server_time(&response);
        Ok((parse_delta(response.data)?, time))
    }

    /// Creates a document; the backend assigns the permanent id.
    pub async fn create(&self, collection: &str, doc: &Doc) -> SyncResult<Doc> {
        let response = self
            .send(
                Method::Post,
                self.collection_url(collection),
                Some(doc.clone().into_value()),
            )
            .await?;
        doc_from(response.data)
    }

    /// Replaces the document stored under `id`.
    pub async fn update(&self, collection: &str, id: &str, doc: &Doc) -> SyncResult<Doc> {
        let url = format!("{}/{}", self.collection_url(collection), id);
        let response = self
            .send(Method::Put, url, Some(doc.clone().into_value()))
            .await?;
        doc_from(response.data)
    }

    /// Deletes the document stored under `id`, returning the removed count.
    ///
    /// A 404 counts as zero removals, not an error: the entity never reached
    /// the backend or is already gone, which is exactly the state the caller
    /// wanted.
    pub async fn delete(&self, collection: &str, id: &str) -> SyncResult<u64> {
        let url = format!("{}/{}", self.collection_url(collection), id);
        match self.send(Method::Delete, url, None).await {
            Ok(response) => Ok(response
                .data
                .get("count")
                .and_then(Value::as_u64)
                .unwrap_or(1)),
            Err(SyncError::Server { status: 404, .. }) => Ok(0),
            Err(e) => Err(e),
        }
    }
}

fn doc_from(data: Value) -> SyncResult<Doc> {
    Doc::from_value(data).ok_or_else(|| SyncError::payload("expected a document object"))
}

fn parse_delta(data: Value) -> SyncResult<DeltaSet> {
    match data {
        Value::Array(items) => {
            let changed = items
                .into_iter()
                .map(doc_from)
                .collect::<SyncResult<Vec<_>>>()?;
            Ok(DeltaSet {
                changed,
                deleted: Vec::new(),
            })
        }
        Value::Object(mut envelope) => {
            let changed = match envelope.remove("changed") {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .map(doc_from)
                    .collect::<SyncResult<Vec<_>>>()?,
                Some(_) => return Err(SyncError::payload("\"changed\" is not an array")),
                None => Vec::new(),
            };
            let deleted = match envelope.remove("deleted") {
                Some(Value::Array(items)) => items
                    .into_iter()
                    .map(|item| {
                        item.get("_id")
                            .and_then(Value::as_str)
                            .map(String::from)
                            .ok_or_else(|| {
                                SyncError::payload("\"deleted\" entry without an _id")
                            })
                    })
                    .collect::<SyncResult<Vec<_>>>()?,
                Some(_) => return Err(SyncError::payload("\"deleted\" is not an array")),
                None => Vec::new(),
            };
            Ok(DeltaSet { changed, deleted })
        }
        other => Err(SyncError::payload(format!(
            "expected an array or change-set envelope, got {other}"
        ))),
    }
}
