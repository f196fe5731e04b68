//! Maze lifecycle endpoints: create, view, login, images, and the
//! admin-gated settings mutations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{authorize_admin, AppError, AppState};
use crate::images::Image;

#[derive(Deserialize)]
pub struct AdminQuery {
    pub admin_key: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateMazeRequest {
    name: String,
    admin_email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct CreateMazeResponse {
    id: String,
    admin_key: String,
}

/// Public view of a maze; the admin key and password material stay out.
#[derive(Serialize)]
pub struct MazeInfo {
    id: String,
    name: String,
    enable_sharing: bool,
    has_password: bool,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    success: bool,
}

#[derive(Deserialize)]
pub struct ImageListParams {
    #[serde(default = "default_size")]
    size: u32,
    #[serde(default = "default_page")]
    page: u32,
}

fn default_size() -> u32 {
    1024
}

fn default_page() -> u32 {
    1
}

#[derive(Deserialize)]
pub struct FlickrSettingsRequest {
    #[serde(default)]
    tags: String,
    #[serde(default)]
    user: String,
    #[serde(default)]
    include_recent: bool,
    #[serde(default)]
    include_favs: bool,
}

#[derive(Deserialize)]
pub struct InstagramSettingsRequest {
    #[serde(default)]
    tag: String,
    #[serde(default)]
    include_recent: bool,
    #[serde(default)]
    include_feed: bool,
}

#[derive(Deserialize)]
pub struct FacebookSettingsRequest {
    #[serde(default)]
    include_photos_of_you: bool,
}

#[derive(Deserialize)]
pub struct UpdateMazeRequest {
    name: Option<String>,
    admin_email: Option<String>,
    enable_sharing: Option<bool>,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    #[serde(default)]
    old_password: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    password_repeat: String,
}

#[derive(Deserialize)]
pub struct AddImageRequest {
    blob_ref: String,
    #[serde(default)]
    message: String,
}

#[derive(Serialize)]
pub struct AddImageResponse {
    id: i64,
}

/// Create maze API router
pub fn create_maze_router(state: AppState) -> Router {
    Router::new()
        .route("/api/mazes", post(create_maze))
        .route("/api/mazes/:id", get(get_maze).put(update_maze))
        .route("/api/mazes/:id/login", post(login))
        .route("/api/mazes/:id/images", get(list_images).post(add_image))
        .route("/api/mazes/:id/password", put(set_password))
        .route("/api/mazes/:id/settings/flickr", put(update_flickr))
        .route("/api/mazes/:id/settings/instagram", put(update_instagram))
        .route("/api/mazes/:id/settings/facebook", put(update_facebook))
        .with_state(Arc::new(state))
}

/// POST /api/mazes
///
/// The admin key is returned exactly once, here.
async fn create_maze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateMazeRequest>,
) -> Result<(StatusCode, Json<CreateMazeResponse>), AppError> {
    if request.name.trim().is_empty() {
        return Err(AppError::BadRequest("Maze name is required".to_string()));
    }
    let maze = state.maze_store.create(
        request.name.trim(),
        request.admin_email.trim(),
        &request.password,
        &state.pepper,
    )?;
    state.mailer.send(
        &maze.admin_email,
        &format!("Your maze '{}'", maze.name),
        &format!(
            "View it at {}/mazes/{}\nAdmin link: {}/mazes/{}/settings?admin_key={}",
            state.public_base_url, maze.id, state.public_base_url, maze.id, maze.admin_key
        ),
    );
    Ok((
        StatusCode::CREATED,
        Json(CreateMazeResponse {
            id: maze.id,
            admin_key: maze.admin_key,
        }),
    ))
}

/// GET /api/mazes/:id
async fn get_maze(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
) -> Result<Json<MazeInfo>, AppError> {
    let maze = state
        .maze_store
        .get(&maze_id)?
        .ok_or_else(|| AppError::NotFound(format!("Maze '{}' not found", maze_id)))?;
    Ok(Json(MazeInfo {
        id: maze.id,
        name: maze.name,
        enable_sharing: maze.enable_sharing,
        has_password: maze.password_hash.is_some(),
    }))
}

/// POST /api/mazes/:id/login
///
/// A maze without a password accepts any attempt.
async fn login(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let maze = state
        .maze_store
        .get(&maze_id)?
        .ok_or_else(|| AppError::NotFound(format!("Maze '{}' not found", maze_id)))?;
    if !maze.validate_password(&request.password, &state.pepper) {
        return Err(AppError::Forbidden("Invalid password".to_string()));
    }
    Ok(Json(LoginResponse { success: true }))
}

/// GET /api/mazes/:id/images?size=&page=
async fn list_images(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(params): Query<ImageListParams>,
) -> Result<Json<Vec<Image>>, AppError> {
    let maze = state
        .maze_store
        .get(&maze_id)?
        .ok_or_else(|| AppError::NotFound(format!("Maze '{}' not found", maze_id)))?;
    debug!(maze_id = %maze.id, size = params.size, page = params.page, "Image list requested");
    let images = state.aggregator.get_images(&maze, params.size, params.page).await;
    // Locators never leave the server raw; each becomes a texture URL the
    // serving routes decode back.
    let mut images = images.as_ref().clone();
    for image in &mut images {
        image.locator = super::texture::texture_url(&state.public_base_url, &maze.id, &image.locator);
    }
    Ok(Json(images))
}

/// POST /api/mazes/:id/images?admin_key=
///
/// Registers an uploaded blob with a maze. The bytes themselves live in the
/// blob service; only the reference and caption are stored here.
async fn add_image(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(admin): Query<AdminQuery>,
    Json(request): Json<AddImageRequest>,
) -> Result<(StatusCode, Json<AddImageResponse>), AppError> {
    let maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;
    if request.blob_ref.trim().is_empty() {
        return Err(AppError::BadRequest("blob_ref is required".to_string()));
    }
    let id = state
        .image_store
        .insert(&maze.id, Some(request.blob_ref.trim()), None, &request.message)?;
    state.cache.invalidate_images(&maze.id);
    info!(maze_id = %maze.id, image_id = id, "Registered maze image");
    Ok((StatusCode::CREATED, Json(AddImageResponse { id })))
}

/// PUT /api/mazes/:id?admin_key=
async fn update_maze(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(admin): Query<AdminQuery>,
    Json(request): Json<UpdateMazeRequest>,
) -> Result<Json<MazeInfo>, AppError> {
    let mut maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;
    if let Some(name) = request.name {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Maze name is required".to_string()));
        }
        maze.name = name.trim().to_string();
    }
    if let Some(email) = request.admin_email {
        maze.admin_email = email.trim().to_string();
    }
    if let Some(sharing) = request.enable_sharing {
        maze.enable_sharing = sharing;
    }
    state.maze_store.put(&mut maze)?;
    Ok(Json(MazeInfo {
        id: maze.id,
        name: maze.name,
        enable_sharing: maze.enable_sharing,
        has_password: maze.password_hash.is_some(),
    }))
}

/// PUT /api/mazes/:id/password?admin_key=
async fn set_password(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(admin): Query<AdminQuery>,
    Json(request): Json<SetPasswordRequest>,
) -> Result<StatusCode, AppError> {
    let mut maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;
    if !maze.validate_password(&request.old_password, &state.pepper) {
        return Err(AppError::Forbidden("Invalid password".to_string()));
    }
    if request.password.is_empty() {
        return Err(AppError::BadRequest("Password cannot be empty".to_string()));
    }
    if request.password != request.password_repeat {
        return Err(AppError::BadRequest("Passwords do not match".to_string()));
    }
    maze.set_password(&request.password, &state.pepper);
    state.maze_store.put(&mut maze)?;
    info!(maze_id = %maze.id, "Password updated");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/mazes/:id/settings/flickr?admin_key=
///
/// The linked-account reference is not part of the request body; only the
/// callback and detach paths may touch it.
async fn update_flickr(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(admin): Query<AdminQuery>,
    Json(request): Json<FlickrSettingsRequest>,
) -> Result<StatusCode, AppError> {
    let mut maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;
    maze.flickr.tags = request.tags;
    maze.flickr.user = request.user;
    maze.flickr.include_recent = request.include_recent;
    maze.flickr.include_favs = request.include_favs;
    state.maze_store.put(&mut maze)?;
    state.cache.invalidate_images(&maze.id);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/mazes/:id/settings/instagram?admin_key=
async fn update_instagram(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(admin): Query<AdminQuery>,
    Json(request): Json<InstagramSettingsRequest>,
) -> Result<StatusCode, AppError> {
    let mut maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;
    maze.instagram.tag = request.tag;
    maze.instagram.include_recent = request.include_recent;
    maze.instagram.include_feed = request.include_feed;
    state.maze_store.put(&mut maze)?;
    state.cache.invalidate_images(&maze.id);
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/mazes/:id/settings/facebook?admin_key=
async fn update_facebook(
    State(state): State<Arc<AppState>>,
    Path(maze_id): Path<String>,
    Query(admin): Query<AdminQuery>,
    Json(request): Json<FacebookSettingsRequest>,
) -> Result<StatusCode, AppError> {
    let mut maze = authorize_admin(&state, &maze_id, admin.admin_key.as_deref())?;
    maze.facebook.include_photos_of_you = request.include_photos_of_you;
    state.maze_store.put(&mut maze)?;
    state.cache.invalidate_images(&maze.id);
    Ok(StatusCode::NO_CONTENT)
}
