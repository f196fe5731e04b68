// HTTP API: maze CRUD, image lists, and account linking.

pub mod linking;
pub mod maze;
pub mod texture;

pub use linking::create_linking_router;
pub use maze::create_maze_router;
pub use texture::create_texture_router;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;

use crate::aggregator::Aggregator;
use crate::cache::MazeCache;
use crate::linking::{LinkingError, LinkingService};
use crate::mail::Mailer;
use crate::maze::images::MazeImageStore;
use crate::maze::store::MazeStore;
use crate::maze::Maze;
use crate::services::ServiceError;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for the HTTP API
pub enum AppError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<LinkingError> for AppError {
    fn from(e: LinkingError) -> Self {
        match e {
            LinkingError::Service(ServiceError::AuthExchange(msg)) => {
                AppError::BadRequest(format!("Authorization failed: {}", msg))
            }
            LinkingError::Service(ServiceError::StateMissing) => {
                AppError::Forbidden(e.to_string())
            }
            LinkingError::Service(other) => AppError::BadGateway(other.to_string()),
            LinkingError::Storage(err) => AppError::ServerError(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::ServerError(e.to_string())
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub maze_store: Arc<MazeStore>,
    pub image_store: Arc<MazeImageStore>,
    pub linking: Arc<LinkingService>,
    pub aggregator: Arc<Aggregator>,
    pub cache: Arc<MazeCache>,
    pub mailer: Arc<dyn Mailer>,
    /// Client for proxying externally hosted image bytes.
    pub http: reqwest::Client,
    /// Externally visible base URL for callback construction.
    pub public_base_url: String,
    pub pepper: String,
}

/// Load a maze and check the caller's admin key, in that order: an unknown
/// maze is 404 before the key is even looked at, a known maze with the
/// wrong key is 403.
pub(crate) fn authorize_admin(
    state: &AppState,
    maze_id: &str,
    admin_key: Option<&str>,
) -> Result<Maze, AppError> {
    let maze = state
        .maze_store
        .get(maze_id)?
        .ok_or_else(|| AppError::NotFound(format!("Maze '{}' not found", maze_id)))?;
    if admin_key != Some(maze.admin_key.as_str()) {
        return Err(AppError::Forbidden("Invalid admin key".to_string()));
    }
    Ok(maze)
}
