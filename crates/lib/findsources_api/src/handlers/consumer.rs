//! Consumer search proxy handler.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use findsources_core::search::parse_multi_search;
use serde_json::Value;
use tracing::debug;

use crate::SearchState;
use crate::error::AppResult;

/// `POST /search/`: forward an NDJSON multi-search to the search cluster.
pub async fn search(State(state): State<SearchState>, body: Bytes) -> AppResult<Json<Value>> {
    let requests = parse_multi_search(&body)?;
    debug!(queries = requests.len(), "received multi-search");
    let responses = state.search.multi_search(&requests).await?;
    Ok(Json(responses))
}
