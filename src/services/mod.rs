//! External photo service adapters.
//!
//! Each service (Flickr, Instagram, Facebook) implements [`ServiceAdapter`]:
//! build an authorization URL, exchange a callback for a long-lived
//! credential, and fetch the authorizing user's profile. Media fetching stays
//! on the concrete adapters since the raw record shapes differ per service.

pub mod facebook;
pub mod flickr;
pub mod instagram;
pub mod license;
pub mod request_token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The external services a maze can link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Flickr,
    Instagram,
    Facebook,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Flickr => "flickr",
            ServiceKind::Instagram => "instagram",
            ServiceKind::Facebook => "facebook",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "flickr" => Some(ServiceKind::Flickr),
            "instagram" => Some(ServiceKind::Instagram),
            "facebook" => Some(ServiceKind::Facebook),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by service adapters.
#[derive(Debug)]
pub enum ServiceError {
    /// Malformed or denied OAuth callback. Non-retryable, user-facing.
    AuthExchange(String),
    /// The service reported its revocation sentinel (Flickr code 98,
    /// Instagram HTTP 400): the stored credential is no longer valid.
    Revoked,
    /// No pending request token matches the callback (expired or forged).
    /// Surfaced as a 403 to the caller.
    StateMissing,
    /// Network or service failure. Logged; aggregation degrades to empty.
    External(String),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::AuthExchange(msg) => write!(f, "Authorization exchange failed: {}", msg),
            ServiceError::Revoked => write!(f, "Credential has been revoked"),
            ServiceError::StateMissing => {
                write!(f, "No pending authorization matches this callback")
            }
            ServiceError::External(msg) => write!(f, "External service error: {}", msg),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Long-lived access credential for one external account.
///
/// `secret` is only present for OAuth 1.0a services (Flickr).
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceCredential {
    pub token: String,
    pub secret: Option<String>,
}

/// Display data for a linked external user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// The service's own user ID; keys the credential store.
    pub user_id: String,
    pub name: String,
    pub icon_url: String,
}

/// Raw parameters from an OAuth callback request.
///
/// `code` carries the Instagram/Facebook authorization code; `oauth_token`
/// and `oauth_verifier` carry the Flickr three-legged pair.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Uniform capability for linking an external account to a maze.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn kind(&self) -> ServiceKind;

    /// Build the service's authorization URL embedding `callback_url`.
    ///
    /// Flickr obtains and stores a request token before building the URL;
    /// the two-legged services build it locally.
    async fn authorize_url(&self, callback_url: &str) -> Result<String, ServiceError>;

    /// Exchange callback parameters for a long-lived credential.
    async fn exchange_callback(
        &self,
        params: &CallbackParams,
        callback_url: &str,
    ) -> Result<ServiceCredential, ServiceError>;

    /// Fetch the credential owner's profile (external user ID + display data).
    async fn fetch_profile(&self, credential: &ServiceCredential)
        -> Result<Profile, ServiceError>;
}

/// Load the `(client_id, client_secret)` pair for a service from the
/// environment: `PHOTOMAZE_<SERVICE>_KEY` / `PHOTOMAZE_<SERVICE>_SECRET`.
pub fn client_keys_from_env(kind: ServiceKind) -> Option<(String, String)> {
    let prefix = kind.as_str().to_uppercase();
    let key = std::env::var(format!("PHOTOMAZE_{}_KEY", prefix)).ok()?;
    let secret = std::env::var(format!("PHOTOMAZE_{}_SECRET", prefix)).ok()?;
    Some((key, secret))
}

/// Parse a `key=value&...` response body into a map (OAuth 1.0a token
/// responses and older Graph API token responses are form-encoded).
pub(crate) fn parse_form_body(body: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<HashMap<String, String>>(body).unwrap_or_default()
}
