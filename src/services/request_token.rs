//! Flickr request-token storage.
//!
//! OAuth 1.0a needs the request-token secret to survive the redirect round
//! trip: the secret is obtained before building the authorization URL and is
//! required again, together with the callback's verifier, to mint the access
//! token. Tokens are keyed by their own value, single-use, and expire if the
//! user never completes authorization.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A pending request-token/secret pair.
#[derive(Clone, Debug)]
pub struct RequestToken {
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory store of pending Flickr request tokens with expiry.
#[derive(Clone)]
pub struct RequestTokenStore {
    tokens: Arc<Mutex<HashMap<String, RequestToken>>>,
    expiry: Duration,
}

impl RequestTokenStore {
    /// `expiry_seconds`: how long an unconsumed token stays valid
    /// (default 600 = 10 minutes).
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            tokens: Arc::new(Mutex::new(HashMap::new())),
            expiry: Duration::seconds(expiry_seconds),
        }
    }

    /// Store the secret for a freshly issued request token.
    pub fn insert(&self, token: &str, secret: &str) {
        let mut tokens = self.tokens.lock().unwrap();
        tokens.insert(
            token.to_string(),
            RequestToken {
                secret: secret.to_string(),
                created_at: Utc::now(),
            },
        );
    }

    /// Take the secret for a request token, consuming it.
    ///
    /// Returns None for unknown or expired tokens; a completed flow supersedes
    /// the token either way.
    pub fn take(&self, token: &str) -> Option<String> {
        let mut tokens = self.tokens.lock().unwrap();
        let entry = tokens.remove(token)?;
        if Utc::now() - entry.created_at > self.expiry {
            return None;
        }
        Some(entry.secret)
    }

    /// Drop expired tokens. Called periodically from a background task.
    pub fn cleanup_expired(&self) {
        let mut tokens = self.tokens.lock().unwrap();
        let now = Utc::now();
        tokens.retain(|_, entry| now - entry.created_at <= self.expiry);
    }

    pub fn count(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}

/// Background task that periodically evicts expired request tokens.
pub async fn run_token_cleanup(store: RequestTokenStore, interval_seconds: u64) {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(interval_seconds));
    loop {
        interval.tick().await;
        store.cleanup_expired();
        tracing::debug!(
            remaining = store.count(),
            "Request token cleanup complete"
        );
    }
}
