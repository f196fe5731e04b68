// Integration tests for texture serving and the public search-only maze.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use mockito::Matcher;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use photomaze::aggregator::Aggregator;
use photomaze::api::AppState;
use photomaze::cache::MazeCache;
use photomaze::credentials::{generate_key_base64, CredentialStore};
use photomaze::images::{external_locator, internal_locator, KIND_FLICKR};
use photomaze::linking::LinkingService;
use photomaze::mail::LogMailer;
use photomaze::maze::images::MazeImageStore;
use photomaze::maze::store::MazeStore;
use photomaze::services::facebook::FacebookAdapter;
use photomaze::services::flickr::api::FlickrClient;
use photomaze::services::flickr::{FlickrAdapter, LICENSES_PUBLIC};
use photomaze::services::instagram::{InstagramAdapter, InstagramClient};
use photomaze::services::license::LicenseTable;
use photomaze::services::request_token::RequestTokenStore;

fn create_test_app(server_url: &str) -> (Router, AppState) {
    let maze_store = Arc::new(MazeStore::new(":memory:").unwrap());
    let image_store = Arc::new(MazeImageStore::new(":memory:").unwrap());
    let credentials =
        Arc::new(CredentialStore::new(":memory:", &generate_key_base64()).unwrap());
    let cache = Arc::new(MazeCache::new(Duration::from_secs(60)));

    let flickr = Arc::new(FlickrAdapter::with_client(
        FlickrClient::with_base_urls(
            "ckey".to_string(),
            "csecret".to_string(),
            format!("{}/rest", server_url),
            format!("{}/oauth", server_url),
        ),
        RequestTokenStore::new(600),
    ));
    let instagram = Arc::new(InstagramAdapter::with_client(
        InstagramClient::with_base_urls(
            "client-id".to_string(),
            "client-secret".to_string(),
            server_url.to_string(),
            format!("{}/oauth", server_url),
        ),
    ));
    let facebook = Arc::new(FacebookAdapter::new("id".to_string(), "secret".to_string()));

    let linking = Arc::new(LinkingService::new(
        maze_store.clone(),
        credentials,
        cache.clone(),
        flickr,
        instagram,
        facebook,
    ));
    let aggregator = Arc::new(Aggregator::new(
        linking.clone(),
        image_store.clone(),
        cache.clone(),
        Arc::new(LicenseTable::new()),
    ));

    let state = AppState {
        maze_store,
        image_store,
        linking,
        aggregator,
        cache,
        mailer: Arc::new(LogMailer),
        http: reqwest::Client::new(),
        public_base_url: "http://testserver".to_string(),
        pepper: "test-pepper".to_string(),
    };
    (photomaze::app_router(state.clone()), state)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

fn seed_maze(state: &AppState) -> String {
    state
        .maze_store
        .create("M", "a@example.com", "", "test-pepper")
        .unwrap()
        .id
}

fn texture_path(maze_id: &str, locator: &str) -> String {
    format!(
        "/api/mazes/{}/texture/{}",
        maze_id,
        URL_SAFE_NO_PAD.encode(locator)
    )
}

#[tokio::test]
async fn test_serves_inline_image() {
    let server = mockito::Server::new_async().await;
    let (app, state) = create_test_app(&server.url());
    let id = seed_maze(&state);
    let row_id = state
        .image_store
        .insert(&id, None, Some(b"jpeg-bytes"), "mine")
        .unwrap();

    let response = app
        .oneshot(get(&texture_path(&id, &internal_locator(
            &row_id.to_string(),
            512,
        ))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/jpeg"
    );
    assert!(response.headers().get("cache-control").is_some());
    assert_eq!(body_bytes(response).await, b"jpeg-bytes");
}

#[tokio::test]
async fn test_redirects_to_blob_url() {
    let server = mockito::Server::new_async().await;
    let (app, state) = create_test_app(&server.url());
    let id = seed_maze(&state);
    state
        .image_store
        .insert(&id, Some("https://blobs.example.com/x.jpg"), None, "blob")
        .unwrap();

    let response = app
        .oneshot(get(&texture_path(&id, &internal_locator(
            "https://blobs.example.com/x.jpg",
            1024,
        ))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get("location").unwrap(),
        "https://blobs.example.com/x.jpg"
    );
}

#[tokio::test]
async fn test_unknown_maze_and_bad_keys() {
    let server = mockito::Server::new_async().await;
    let (app, state) = create_test_app(&server.url());
    let id = seed_maze(&state);

    let response = app
        .clone()
        .oneshot(get(&texture_path("nope", "b;1;512")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Key is not base64 of a locator at all.
    let response = app
        .clone()
        .oneshot(get(&format!("/api/mazes/{}/texture/%21%21", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Well-formed key addressing a row the maze does not have.
    let response = app
        .oneshot(get(&texture_path(&id, "b;999;512")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_proxies_external_image_and_caches_bytes() {
    let mut server = mockito::Server::new_async().await;
    let photo = server
        .mock("GET", "/photos/z.png")
        .with_header("content-type", "image/png")
        .with_body("png-bytes")
        .expect(1)
        .create_async()
        .await;

    let (app, state) = create_test_app(&server.url());
    let id = seed_maze(&state);
    let locator = external_locator(KIND_FLICKR, &format!("{}/photos/z.png", server.url()));

    let response = app
        .clone()
        .oneshot(get(&texture_path(&id, &locator)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "image/png"
    );
    assert_eq!(body_bytes(response).await, b"png-bytes");

    // Second request is served from the texture cache, not the service.
    let response = app
        .oneshot(get(&texture_path(&id, &locator)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"png-bytes");
    photo.assert_async().await;
}

#[tokio::test]
async fn test_public_list_searches_open_licenses() {
    let mut server = mockito::Server::new_async().await;
    let _licenses = server
        .mock("GET", "/rest")
        .match_query(Matcher::UrlEncoded(
            "method".into(),
            "flickr.photos.licenses.getInfo".into(),
        ))
        .with_body(
            r#"{"licenses": {"license": [
                {"id": 4, "name": "CC BY", "url": "http://cc/by"}
            ]}, "stat": "ok"}"#,
        )
        .create_async()
        .await;
    let search = server
        .mock("GET", "/rest")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("method".into(), "flickr.photos.search".into()),
            Matcher::UrlEncoded("tags".into(), "dunes".into()),
            Matcher::UrlEncoded("license".into(), LICENSES_PUBLIC.into()),
        ]))
        .with_body(format!(
            r#"{{"photos": {{"photo": [
                {{"id": "101", "owner": "99@N00", "ownername": "alice",
                  "title": "dunes", "license": "4",
                  "url_z": "{}/photos/z.png"}}
            ]}}, "stat": "ok"}}"#,
            server.url()
        ))
        .create_async()
        .await;
    let photo = server
        .mock("GET", "/photos/z.png")
        .with_header("content-type", "image/png")
        .with_body("png-bytes")
        .create_async()
        .await;

    let (app, _) = create_test_app(&server.url());

    let response = app
        .clone()
        .oneshot(get("/api/public/images?ft=dunes&size=600"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    search.assert_async().await;
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).unwrap();
    let images = body.as_array().unwrap();
    assert_eq!(images.len(), 1);
    assert_eq!(images[0]["attrib"], "'dunes' by alice");
    let url = images[0]["url"].as_str().unwrap();
    let path = url.strip_prefix("http://testserver").unwrap();
    assert!(path.starts_with("/api/public/image/"));

    // The listed URL serves the photo bytes.
    let response = app.oneshot(get(path)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"png-bytes");
    photo.assert_async().await;
}

#[tokio::test]
async fn test_public_route_refuses_internal_locators() {
    let server = mockito::Server::new_async().await;
    let (app, state) = create_test_app(&server.url());
    let id = seed_maze(&state);
    let row_id = state
        .image_store
        .insert(&id, None, Some(b"private"), "mine")
        .unwrap();

    let response = app
        .oneshot(get(&format!(
            "/api/public/image/{}",
            URL_SAFE_NO_PAD.encode(internal_locator(&row_id.to_string(), 512))
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
