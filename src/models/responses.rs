//! Response bodies of the roster REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClientRecord, Coach, Watermark};

/// Body of `GET /api/clients`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientListResponse {
    pub success: bool,
    #[serde(default)]
    pub clients: Vec<ClientRecord>,
    #[serde(default)]
    pub total_clients: usize,
    /// Server clock at query time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    /// Highest commit sequence visible to the listing query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<i64>,
}

impl ClientListResponse {
    /// Where the change feed should resume so nothing committed after this
    /// listing is missed. The sequence cursor wins over the clock.
    pub fn watermark(&self) -> Option<Watermark> {
        self.cursor
            .map(Watermark::After)
            .or_else(|| self.fetched_at.map(Watermark::Since))
    }
}

/// Body of single-client endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResponse {
    pub success: bool,
    pub client: ClientRecord,
}

/// Body of endpoints that only report success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Body of `POST /api/coaches`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachSessionResponse {
    pub success: bool,
    pub coach: Coach,
    pub session_token: String,
}

/// Body of `GET /api/clients/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSearchResponse {
    pub success: bool,
    pub results: Vec<ClientSearchHit>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Single search result item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSearchHit {
    pub client: ClientRecord,
    pub score: f32,
}
