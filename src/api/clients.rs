//! Client roster endpoints.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use super::ApiResult;
use crate::db;
use crate::errors::AppError;
use crate::models::{
    ChangeKind, ClientListResponse, ClientRecord, ClientResponse, CreateClientRequest,
    CurrentUser, SuccessResponse, UpdateClientRequest,
};
use crate::sync::looks_like_connection_string;
use crate::AppState;

/// GET /api/clients - List the coach's clients.
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(coach): Extension<CurrentUser>,
) -> ApiResult<ClientListResponse> {
    let fetched_at = db::now();
    // The feed resumes after `cursor`; anything not listed here commits past it
    let (clients, cursor) = state.repo.list_clients(&coach.uid).await?;

    Ok(Json(ClientListResponse {
        success: true,
        total_clients: clients.len(),
        clients,
        fetched_at: Some(fetched_at),
        cursor: Some(cursor),
    }))
}

/// GET /api/clients/:id - Get a single client.
pub async fn get_client(
    State(state): State<AppState>,
    Extension(coach): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<ClientResponse> {
    let client = state
        .repo
        .get_client(&coach.uid, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Client {} not found", id)))?;

    Ok(Json(ClientResponse {
        success: true,
        client,
    }))
}

/// POST /api/clients - Add a client to the roster.
pub async fn create_client(
    State(state): State<AppState>,
    Extension(coach): Extension<CurrentUser>,
    Json(request): Json<CreateClientRequest>,
) -> ApiResult<ClientResponse> {
    validate_name(&request.name)?;

    let client = state.repo.create_client(&coach.uid, &request).await?;
    after_write(&state, ChangeKind::Added, &client).await;

    Ok(Json(ClientResponse {
        success: true,
        client,
    }))
}

/// PUT /api/clients/:id - Update a client.
pub async fn update_client(
    State(state): State<AppState>,
    Extension(coach): Extension<CurrentUser>,
    Path(id): Path<String>,
    Json(request): Json<UpdateClientRequest>,
) -> ApiResult<ClientResponse> {
    if let Some(name) = &request.name {
        validate_name(name)?;
    }
    if request.completion.is_some_and(|c| c > 100) {
        return Err(AppError::Validation(
            "Completion must be between 0 and 100".to_string(),
        ));
    }

    let client = state.repo.update_client(&coach.uid, &id, &request).await?;
    after_write(&state, ChangeKind::Modified, &client).await;

    Ok(Json(ClientResponse {
        success: true,
        client,
    }))
}

/// DELETE /api/clients/:id - Remove a client from the roster.
pub async fn delete_client(
    State(state): State<AppState>,
    Extension(coach): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<SuccessResponse> {
    let client = state.repo.delete_client(&coach.uid, &id).await?;

    if let Err(e) = state.search.remove_client(&client.id).await {
        tracing::warn!("Failed to remove client from index: {}", e);
    }
    state.feed.publish(ChangeKind::Removed, &client);

    Ok(Json(SuccessResponse { success: true }))
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("Name is required".to_string()));
    }
    if looks_like_connection_string(name) {
        return Err(AppError::Validation(
            "Name looks like a connection string".to_string(),
        ));
    }
    Ok(())
}

/// Re-index and publish a written client.
async fn after_write(state: &AppState, kind: ChangeKind, client: &ClientRecord) {
    if let Err(e) = state.search.index_client(client).await {
        tracing::warn!("Failed to index client {}: {}", client.id, e);
    }
    state.feed.publish(kind, client);
}
