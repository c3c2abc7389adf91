//! Coach Roster
//!
//! REST backend with SQLite persistence, Tantivy search and a live change feed,
//! plus the roster sync client that keeps a coach's client list current.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod feed;
pub mod models;
pub mod search;
pub mod sync;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use db::Repository;
use feed::ChangeFeedHub;
use search::ClientSearchIndex;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub search: Arc<ClientSearchIndex>,
    pub feed: Arc<ChangeFeedHub>,
    pub config: Arc<Config>,
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Clone PSK for the auth layer
    let psk = state.config.api_psk.clone();

    // Routes acting on behalf of a signed-in coach
    let coach_routes = Router::new()
        .route("/auth/me", get(api::current_user))
        .route("/clients", get(api::list_clients).post(api::create_client))
        .route("/clients/search", get(api::search_clients))
        .route("/clients/feed", get(api::client_feed))
        .route(
            "/clients/{id}",
            get(api::get_client)
                .put(api::update_client)
                .delete(api::delete_client),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::session_auth_layer,
        ));

    // API routes
    let api_routes = Router::new()
        .route("/coaches", post(api::create_coach))
        .merge(coach_routes)
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests;
