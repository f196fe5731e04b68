use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use photomaze::aggregator::Aggregator;
use photomaze::api::AppState;
use photomaze::cache::MazeCache;
use photomaze::config;
use photomaze::credentials::CredentialStore;
use photomaze::linking::LinkingService;
use photomaze::mail::LogMailer;
use photomaze::maze::images::MazeImageStore;
use photomaze::maze::store::MazeStore;
use photomaze::services::facebook::FacebookAdapter;
use photomaze::services::flickr::FlickrAdapter;
use photomaze::services::instagram::InstagramAdapter;
use photomaze::services::license::LicenseTable;
use photomaze::services::request_token::{run_token_cleanup, RequestTokenStore};
use photomaze::services::{client_keys_from_env, ServiceKind};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photomaze=info".into()),
        )
        .init();

    info!("Photomaze starting...");

    let config_path =
        std::env::var("PHOTOMAZE_CONFIG").unwrap_or_else(|_| "photomaze.toml".to_string());
    let config = match config::load_config(&config_path) {
        Ok(config) => {
            info!(path = %config_path, "Configuration loaded");
            config
        }
        Err(e) => {
            info!(path = %config_path, error = %e, "Using default configuration");
            config::PhotomazeConfig::default()
        }
    };

    let encryption_key = std::env::var("PHOTOMAZE_ENCRYPTION_KEY")
        .context("PHOTOMAZE_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    let maze_store = Arc::new(
        MazeStore::new(&config.database.path).context("Failed to initialize maze store")?,
    );
    let image_store = Arc::new(
        MazeImageStore::new(&config.database.path).context("Failed to initialize image store")?,
    );
    let credentials = Arc::new(
        CredentialStore::new(&config.database.path, &encryption_key)
            .context("Failed to initialize credential store")?,
    );
    info!(path = %config.database.path, "Stores initialized");

    let (flickr_key, flickr_secret) = client_keys_from_env(ServiceKind::Flickr)
        .context("PHOTOMAZE_FLICKR_KEY / PHOTOMAZE_FLICKR_SECRET are required")?;
    let (instagram_key, instagram_secret) = client_keys_from_env(ServiceKind::Instagram)
        .context("PHOTOMAZE_INSTAGRAM_KEY / PHOTOMAZE_INSTAGRAM_SECRET are required")?;
    let (facebook_key, facebook_secret) = client_keys_from_env(ServiceKind::Facebook)
        .context("PHOTOMAZE_FACEBOOK_KEY / PHOTOMAZE_FACEBOOK_SECRET are required")?;

    let request_tokens = RequestTokenStore::new(config.cache.token_expiry_seconds);
    let flickr = Arc::new(FlickrAdapter::new(
        flickr_key,
        flickr_secret,
        request_tokens.clone(),
    ));
    let instagram = Arc::new(InstagramAdapter::new(instagram_key, instagram_secret));
    let facebook = Arc::new(FacebookAdapter::new(facebook_key, facebook_secret));

    let cache = Arc::new(MazeCache::new(Duration::from_secs(config.cache.ttl_seconds)));
    let linking = Arc::new(LinkingService::new(
        maze_store.clone(),
        credentials.clone(),
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

    // Sweep abandoned OAuth request tokens in the background
    tokio::spawn(run_token_cleanup(
        request_tokens,
        config.cache.cleanup_interval_seconds,
    ));

    let state = AppState {
        maze_store,
        image_store,
        linking,
        aggregator,
        cache,
        mailer: Arc::new(LogMailer),
        http: reqwest::Client::new(),
        public_base_url: config.server.public_base_url.clone(),
        pepper: config.security.pepper.clone(),
    };
    let router = photomaze::app_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .context("Failed to bind server address")?;
    info!(bind = %config.server.bind, "Photomaze listening");
    axum::serve(listener, router)
        .await
        .context("Server error")?;

    Ok(())
}
