use serde::Deserialize;

/// Complete Photomaze configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PhotomazeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally visible base URL, used when building OAuth callback URLs.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_base_url: default_public_base_url(),
        }
    }
}

/// Cache and pending-token lifetimes
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// TTL for cached image lists and linked-user profiles (seconds)
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Lifetime of a pending OAuth request token (seconds)
    #[serde(default = "default_token_expiry")]
    pub token_expiry_seconds: i64,
    /// How often expired pending tokens are swept (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_ttl() -> u64 {
    600
}

fn default_token_expiry() -> i64 {
    600
}

fn default_cleanup_interval() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            token_expiry_seconds: default_token_expiry(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// SQLite database location, shared by the maze, image, and credential
/// stores.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "photomaze.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Password hashing configuration. The credential encryption key is not
/// here on purpose; it comes from the environment only.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    /// Site-wide pepper mixed into every password hash.
    #[serde(default)]
    pub pepper: String,
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<PhotomazeConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: PhotomazeConfig = toml::from_str(&contents)?;
    Ok(config)
}
