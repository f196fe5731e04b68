// Canonical image model and per-source normalizers
pub mod images;

// Maze model and persistence
pub mod maze;

// External service adapters (Flickr, Instagram, Facebook)
pub mod services;

// Encrypted credential storage
pub mod credentials;

// In-memory TTL caching
pub mod cache;

// Multi-source image aggregation
pub mod aggregator;

// Account linking state machine
pub mod linking;

// HTTP API
pub mod api;

// Configuration
pub mod config;

// Outbound mail seam
pub mod mail;

use axum::Router;
use tower_http::cors::CorsLayer;

/// Assemble the full HTTP API.
pub fn app_router(state: api::AppState) -> Router {
    Router::new()
        .merge(api::create_maze_router(state.clone()))
        .merge(api::create_linking_router(state.clone()))
        .merge(api::create_texture_router(state))
        .layer(CorsLayer::permissive())
}
