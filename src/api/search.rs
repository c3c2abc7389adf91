//! Client search endpoint.

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use super::ApiResult;
use crate::models::{ClientSearchHit, ClientSearchResponse, CurrentUser};
use crate::search::MAX_SEARCH_WINDOW;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string.
    pub q: String,
    /// Maximum number of results (default: 20).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    20
}

/// Maximum number of search results allowed.
const MAX_SEARCH_LIMIT: usize = 100;

/// GET /api/clients/search - Search the coach's clients.
pub async fn search_clients(
    State(state): State<AppState>,
    Extension(coach): Extension<CurrentUser>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<ClientSearchResponse> {
    let limit = params.limit.clamp(1, MAX_SEARCH_LIMIT);
    let offset = params.offset.min(MAX_SEARCH_WINDOW);

    let search_results = state.search.search(&coach.uid, &params.q, limit, offset)?;

    // Hits whose record vanished since indexing are skipped
    let mut results = Vec::new();
    for hit in search_results {
        if let Ok(Some(client)) = state.repo.get_client(&coach.uid, &hit.client_id).await {
            results.push(ClientSearchHit {
                client,
                score: hit.score,
            });
        }
    }

    Ok(Json(ClientSearchResponse {
        success: true,
        total: results.len(),
        results,
        limit,
        offset,
    }))
}
