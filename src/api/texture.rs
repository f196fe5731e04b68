//! Texture serving and the public search-only maze.
//!
//! Image lists never hand source URLs to clients; every entry's `url` is a
//! texture route carrying the urlsafe-base64ed locator. The texture routes
//! decode the locator back and either serve internal bytes or proxy the
//! external photo, caching fetched bytes for reuse.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Json, Redirect, Response},
    routing::get,
    Router,
};
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::{AppError, AppState};
use crate::cache::Texture;
use crate::images::{self, Image, Locator, KIND_BLOB, KIND_FLICKR, KIND_INSTAGRAM};

const IMAGE_CACHE_CONTROL: &str = "public, max-age=36000";

#[derive(Deserialize)]
pub struct PublicSearchParams {
    #[serde(default)]
    ft: String,
    #[serde(default)]
    fu: String,
    #[serde(default = "default_size")]
    size: u32,
}

fn default_size() -> u32 {
    1024
}

/// Create texture and public maze router
pub fn create_texture_router(state: AppState) -> Router {
    Router::new()
        .route("/api/mazes/:id/texture/:key", get(maze_texture))
        .route("/api/public/images", get(public_image_list))
        .route("/api/public/image/:key", get(public_image))
        .with_state(Arc::new(state))
}

/// Rewrite a locator into the maze-scoped texture URL handed to clients.
pub fn texture_url(base_url: &str, maze_id: &str, locator: &str) -> String {
    format!(
        "{}/api/mazes/{}/texture/{}",
        base_url,
        maze_id,
        URL_SAFE_NO_PAD.encode(locator)
    )
}

/// Rewrite a locator into the public texture URL.
pub fn public_image_url(base_url: &str, locator: &str) -> String {
    format!(
        "{}/api/public/image/{}",
        base_url,
        URL_SAFE_NO_PAD.encode(locator)
    )
}

fn decode_key(key: &str) -> Result<Locator, AppError> {
    let decoded = URL_SAFE_NO_PAD
        .decode(key)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| AppError::NotFound("Unknown image".to_string()))?;
    images::parse_locator(&decoded)
        .ok_or_else(|| AppError::NotFound("Unknown image".to_string()))
}

/// GET /api/mazes/:id/texture/:key
async fn maze_texture(
    State(state): State<Arc<AppState>>,
    Path((maze_id, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let maze = state
        .maze_store
        .get(&maze_id)?
        .ok_or_else(|| AppError::NotFound(format!("Maze '{}' not found", maze_id)))?;
    let locator = decode_key(&key)?;
    match locator.kind {
        KIND_BLOB => serve_internal(&state, &maze.id, &locator.reference),
        KIND_FLICKR | KIND_INSTAGRAM => serve_external(&state, &locator.reference).await,
        _ => Err(AppError::NotFound("Unknown image".to_string())),
    }
}

/// GET /api/public/image/:key
///
/// Public textures only ever point at external photos; internal blobs stay
/// behind their maze.
async fn public_image(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Response, AppError> {
    let locator = decode_key(&key)?;
    match locator.kind {
        KIND_FLICKR | KIND_INSTAGRAM => serve_external(&state, &locator.reference).await,
        _ => Err(AppError::NotFound("Unknown image".to_string())),
    }
}

/// GET /api/public/images?ft=&fu=&size=
///
/// A maze backed by nothing but a Flickr search: no maze record, no
/// authentication, open licenses only.
async fn public_image_list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PublicSearchParams>,
) -> Result<Json<Vec<Image>>, AppError> {
    let mut images = state
        .aggregator
        .search_public(&params.ft, &params.fu, params.size, 1)
        .await;
    for image in &mut images {
        image.locator = public_image_url(&state.public_base_url, &image.locator);
    }
    Ok(Json(images))
}

fn serve_internal(state: &AppState, maze_id: &str, reference: &str) -> Result<Response, AppError> {
    let image = state
        .image_store
        .get_by_reference(maze_id, reference)?
        .ok_or_else(|| AppError::NotFound("Unknown image".to_string()))?;
    if let Some(bytes) = image.inline {
        return Ok(image_response("image/jpeg", bytes));
    }
    // Blob-backed rows live in the blob service; hand the client over.
    match image.blob_ref {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Ok(Redirect::temporary(&url).into_response())
        }
        _ => Err(AppError::NotFound("Image has no servable content".to_string())),
    }
}

async fn serve_external(state: &AppState, reference: &str) -> Result<Response, AppError> {
    let url = BASE64
        .decode(reference)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| AppError::NotFound("Unknown image".to_string()))?;

    if let Some(texture) = state.cache.get_texture(&url) {
        debug!(url = %url, "Texture cache hit");
        return Ok(image_response(
            &texture.content_type,
            texture.bytes.as_ref().clone(),
        ));
    }

    let response = state
        .http
        .get(&url)
        .send()
        .await
        .map_err(|e| AppError::BadGateway(format!("Image fetch failed: {}", e)))?;
    if !response.status().is_success() {
        return Err(AppError::BadGateway(format!(
            "Image fetch returned {}",
            response.status()
        )));
    }
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::BadGateway(format!("Image fetch failed: {}", e)))?
        .to_vec();
    state.cache.set_texture(
        &url,
        Texture {
            content_type: content_type.clone(),
            bytes: Arc::new(bytes.clone()),
        },
    );
    Ok(image_response(&content_type, bytes))
}

fn image_response(content_type: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CACHE_CONTROL, IMAGE_CACHE_CONTROL.to_string()),
        ],
        bytes,
    )
        .into_response()
}
