//! Account-linking endpoints.
//!
//! The linking flow:
//! 1. Admin clicks "Connect" → GET /api/mazes/:id/connect/:service
//! 2. Redirect to the service's authorization page
//! 3. Service redirects back to /api/mazes/:id/callback/:service
//! 4. Exchange the grant, store the credential, attach it to the maze
//!
//! Every step re-validates the maze ID and admin key before anything else;
//! the callback URL carries both so the round trip through the external
//! service cannot launder a request into someone else's maze.

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{authorize_admin, AppError, AppState};
use crate::api::maze::AdminQuery;
use crate::services::{CallbackParams, Profile, ServiceKind};

#[derive(Serialize)]
pub struct LinkedUsersResponse {
    flickr: Option<Profile>,
    instagram: Option<Profile>,
    facebook: Option<Profile>,
}

/// Create linking API router
pub fn create_linking_router(state: AppState) -> Router {
    Router::new()
        .route("/api/mazes/:id/connect/:service", get(connect))
        .route("/api/mazes/:id/callback/:service", get(callback))
        .route("/api/mazes/:id/linked-users", get(linked_users))
        .with_state(Arc::new(state))
}

fn parse_service(name: &str) -> Result<ServiceKind, AppError> {
    ServiceKind::parse(name)
        .ok_or_else(|| AppError::NotFound(format!("Unknown service '{}'", name)))
}

fn callback_url(state: &AppState, maze_id: &str, service: ServiceKind, admin_key: &str) -> String {
    format!(
        "{}/api/mazes/{}/callback/{}?admin_key={}",
        state.public_base_url,
        maze_id,
        service.as_str(),
        urlencoding::encode(admin_key)
    )
}

fn settings_redirect(maze_id: &str, service: ServiceKind, status: &str) -> Redirect {
    Redirect::temporary(&format!(
        "/mazes/{}/settings?link={}&status={}",
        maze_id,
        service.as_str(),
        status
    ))
}

/// GET /api/mazes/:id/connect/:service?admin_key=
///
/// Redirects the admin to the service's authorization page.
async fn connect(
    State(state): State<Arc<AppState>>,
    Path((maze_id, service_name)): Path<(String, String)>,
    Query(admin): Query<AdminQuery>,
) -> Result<Response, AppError> {
    let service = parse_service(&service_name)?;
    let maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;

    // Facebook linking is wired through the same machinery but not turned
    // on for users yet.
    if service == ServiceKind::Facebook {
        return Ok("Not yet".into_response());
    }

    let callback = callback_url(&state, &maze.id, service, &maze.admin_key);
    let auth_url = state.linking.connect_url(service, &callback).await?;
    info!(maze_id = %maze.id, service = %service, "Redirecting to authorization page");
    Ok(Redirect::temporary(&auth_url).into_response())
}

/// GET /api/mazes/:id/callback/:service?admin_key=&...
async fn callback(
    State(state): State<Arc<AppState>>,
    Path((maze_id, service_name)): Path<(String, String)>,
    Query(admin): Query<AdminQuery>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, AppError> {
    let service = parse_service(&service_name)?;
    let mut maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;

    // The user declined, or the service reported a failure. Send the admin
    // back to settings rather than exposing a raw error page.
    if let Some(error) = &params.error {
        warn!(
            maze_id = %maze.id,
            service = %service,
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Authorization was not granted"
        );
        return Ok(settings_redirect(&maze.id, service, "failed").into_response());
    }

    let callback = callback_url(&state, &maze.id, service, &maze.admin_key);
    state
        .linking
        .complete_callback(&mut maze, service, &params, &callback)
        .await?;
    Ok(settings_redirect(&maze.id, service, "ok").into_response())
}

/// GET /api/mazes/:id/linked-users?admin_key=
///
/// The linked account for every service, resolved lazily: a revoked
/// credential is detached on the way through and shows up as null.
async fn linked_users(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(admin): Query<AdminQuery>,
) -> Result<Json<LinkedUsersResponse>, AppError> {
    let maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;
    let flickr = state.linking.linked_user(&maze, ServiceKind::Flickr).await?;
    let instagram = state
        .linking
        .linked_user(&maze, ServiceKind::Instagram)
        .await?;
    Ok(Json(LinkedUsersResponse {
        flickr,
        instagram,
        facebook: None,
    }))
}
