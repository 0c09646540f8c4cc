//! Multi-search proxy to the search cluster.
//!
//! The frontend posts a newline-delimited JSON body. A non-empty object
//! without a `query` key is a header: its params apply to the next query
//! line. Every other object is a query. The parsed requests are re-encoded
//! as an `_msearch` body for the configured index.

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, warn};

/// Search proxy errors.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Malformed search body: {0}")]
    MalformedBody(String),

    #[error("Search cluster error: {0}")]
    Upstream(String),

    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One query and the header params that preceded it.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub params: Map<String, Value>,
    pub body: Map<String, Value>,
}

/// Parse an NDJSON multi-search body. Blank lines are skipped.
pub fn parse_multi_search(raw: &[u8]) -> Result<Vec<SearchRequest>, SearchError> {
    let text = std::str::from_utf8(raw).map_err(|e| SearchError::MalformedBody(e.to_string()))?;
    let mut requests = Vec::new();
    let mut pending: Option<Map<String, Value>> = None;

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| SearchError::MalformedBody(format!("line {}: {e}", lineno + 1)))?;
        let Value::Object(object) = value else {
            return Err(SearchError::MalformedBody(format!(
                "line {}: expected a JSON object",
                lineno + 1
            )));
        };
        if !object.is_empty() && !object.contains_key("query") {
            pending = Some(object);
            continue;
        }
        requests.push(SearchRequest {
            params: pending.take().unwrap_or_default(),
            body: object,
        });
    }
    Ok(requests)
}

/// Encode requests as an `_msearch` NDJSON body (header line, query line).
pub fn encode_multi_search(requests: &[SearchRequest]) -> Result<String, SearchError> {
    let mut out = String::new();
    for request in requests {
        for line in [&request.params, &request.body] {
            let encoded =
                serde_json::to_string(line).map_err(|e| SearchError::MalformedBody(e.to_string()))?;
            out.push_str(&encoded);
            out.push('\n');
        }
    }
    Ok(out)
}

/// Client for the search cluster's `_msearch` endpoint.
#[derive(Debug, Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    index: String,
}

impl SearchClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/{}/_msearch", self.base_url, self.index)
    }

    /// Run the requests and return `{ "responses": [...] }`.
    pub async fn multi_search(&self, requests: &[SearchRequest]) -> Result<Value, SearchError> {
        if requests.is_empty() {
            return Ok(json!({ "responses": [] }));
        }
        let body = encode_multi_search(requests)?;
        debug!(queries = requests.len(), index = %self.index, "forwarding multi-search");

        let resp = self
            .http
            .post(self.endpoint())
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!(%status, "search cluster rejected multi-search");
            return Err(SearchError::Upstream(format!("HTTP {status}: {text}")));
        }
        let mut payload: Value = resp.json().await?;
        let responses = payload
            .get_mut("responses")
            .map(Value::take)
            .ok_or_else(|| SearchError::Upstream("response has no 'responses' field".into()))?;
        Ok(json!({ "responses": responses }))
    }
}
