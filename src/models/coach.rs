//! Coach identity and session models.

use serde::{Deserialize, Serialize};

/// A coach account owning a roster of clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Coach {
    pub uid: String,
    pub display_name: String,
    pub created_at: String,
}

/// Request body for registering a coach.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCoachRequest {
    pub display_name: String,
}

/// The authenticated coach as reported by `GET /api/auth/me`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CurrentUser {
    pub uid: String,
}
