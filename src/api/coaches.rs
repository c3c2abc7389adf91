//! Coach registration and identity endpoints.

use axum::{extract::State, http::HeaderMap, Extension, Json};

use super::ApiResult;
use crate::auth::set_session_cookie;
use crate::errors::AppError;
use crate::models::{CoachSessionResponse, CreateCoachRequest, CurrentUser};
use crate::AppState;

/// POST /api/coaches - Register a coach and open a session.
pub async fn create_coach(
    State(state): State<AppState>,
    Json(request): Json<CreateCoachRequest>,
) -> Result<(HeaderMap, Json<CoachSessionResponse>), AppError> {
    if request.display_name.trim().is_empty() {
        return Err(AppError::Validation("Display name is required".to_string()));
    }

    let (coach, session_token) = state.repo.create_coach(&request).await?;
    tracing::info!(coach_id = %coach.uid, "Registered coach");

    let mut headers = HeaderMap::new();
    set_session_cookie(&mut headers, &session_token)?;

    Ok((
        headers,
        Json(CoachSessionResponse {
            success: true,
            coach,
            session_token,
        }),
    ))
}

/// GET /api/auth/me - The coach behind the current session.
pub async fn current_user(Extension(coach): Extension<CurrentUser>) -> ApiResult<CurrentUser> {
    Ok(Json(coach))
}
