//! Instagram adapter (OAuth 2.0, two-legged).
//!
//! An HTTP 400 from an authenticated API call is the revocation sentinel: the
//! access token has been invalidated and the maze link should be torn down.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;

use crate::services::{
    CallbackParams, Profile, ServiceAdapter, ServiceCredential, ServiceError, ServiceKind,
};

pub const API_URL: &str = "https://api.instagram.com/v1";
pub const OAUTH_URL: &str = "https://api.instagram.com/oauth";

/// Items requested per tag-search call.
pub const TAG_MEDIA_COUNT: u32 = 20;

#[derive(Debug, Clone, Deserialize)]
pub struct MediaUrl {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaImages {
    #[serde(default)]
    pub standard_resolution: Option<MediaUrl>,
    #[serde(default)]
    pub low_resolution: Option<MediaUrl>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaCaption {
    pub text: String,
}

/// One media record; only `media_type == "image"` records become images.
#[derive(Debug, Clone, Deserialize)]
pub struct InstagramMedia {
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(default)]
    pub images: Option<MediaImages>,
    #[serde(default)]
    pub caption: Option<MediaCaption>,
}

#[derive(Debug, Deserialize)]
struct MediaEnvelope {
    data: Vec<InstagramMedia>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: InstagramUser,
}

#[derive(Debug, Deserialize)]
struct InstagramUser {
    id: String,
    username: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
}

/// HTTP client for the Instagram API.
pub struct InstagramClient {
    client_id: String,
    client_secret: String,
    http_client: Client,
    api_url: String,
    oauth_url: String,
}

impl InstagramClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self::with_base_urls(
            client_id,
            client_secret,
            API_URL.to_string(),
            OAUTH_URL.to_string(),
        )
    }

    /// Custom base URLs for testing with a mock server.
    pub fn with_base_urls(
        client_id: String,
        client_secret: String,
        api_url: String,
        oauth_url: String,
    ) -> Self {
        let http_client = Client::builder()
            .user_agent("photomaze/1.0")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client_id,
            client_secret,
            http_client,
            api_url,
            oauth_url,
        }
    }

    pub fn authorize_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}/authorize?client_id={}&redirect_uri={}&response_type=code&scope=public_content",
            self.oauth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(redirect_uri)
        )
    }

    /// Exchange an authorization code for `(access_token, user_id)`.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<(String, String), ServiceError> {
        let mut form = HashMap::new();
        form.insert("client_id", self.client_id.as_str());
        form.insert("client_secret", self.client_secret.as_str());
        form.insert("grant_type", "authorization_code");
        form.insert("redirect_uri", redirect_uri);
        form.insert("code", code);

        let response = self
            .http_client
            .post(format!("{}/access_token", self.oauth_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| ServiceError::External(format!("Token exchange failed: {}", e)))?;

        if !response.status().is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ServiceError::AuthExchange(body));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::AuthExchange(format!("Malformed token response: {}", e)))?;
        Ok((token.access_token, token.user.id))
    }

    pub async fn profile(&self, credential: &ServiceCredential) -> Result<Profile, ServiceError> {
        let url = format!(
            "{}/users/self/?access_token={}",
            self.api_url,
            urlencoding::encode(&credential.token)
        );
        let envelope: UserEnvelope = self.get_json(&url).await?;
        let user = envelope.data;
        Ok(Profile {
            user_id: user.id,
            name: user.full_name.filter(|n| !n.is_empty()).unwrap_or(user.username),
            icon_url: user.profile_picture.unwrap_or_default(),
        })
    }

    /// Recent media tagged with `tag`.
    pub async fn tag_media(
        &self,
        credential: &ServiceCredential,
        tag: &str,
    ) -> Result<Vec<InstagramMedia>, ServiceError> {
        let url = format!(
            "{}/tags/{}/media/recent?count={}&access_token={}",
            self.api_url,
            urlencoding::encode(tag),
            TAG_MEDIA_COUNT,
            urlencoding::encode(&credential.token)
        );
        let envelope: MediaEnvelope = self.get_json(&url).await?;
        Ok(envelope.data)
    }

    /// The user's own recent media.
    pub async fn recent_media(
        &self,
        credential: &ServiceCredential,
    ) -> Result<Vec<InstagramMedia>, ServiceError> {
        let url = format!(
            "{}/users/self/media/recent?access_token={}",
            self.api_url,
            urlencoding::encode(&credential.token)
        );
        let envelope: MediaEnvelope = self.get_json(&url).await?;
        Ok(envelope.data)
    }

    /// The user's activity feed.
    pub async fn feed(
        &self,
        credential: &ServiceCredential,
    ) -> Result<Vec<InstagramMedia>, ServiceError> {
        let url = format!(
            "{}/users/self/feed?access_token={}",
            self.api_url,
            urlencoding::encode(&credential.token)
        );
        let envelope: MediaEnvelope = self.get_json(&url).await?;
        Ok(envelope.data)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ServiceError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::External(format!("Instagram request failed: {}", e)))?;

        match response.status() {
            // Revocation sentinel.
            StatusCode::BAD_REQUEST => Err(ServiceError::Revoked),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(ServiceError::External(format!(
                    "Instagram returned {}: {}",
                    s, body
                )))
            }
            _ => response.json().await.map_err(|e| {
                ServiceError::External(format!("Malformed Instagram response: {}", e))
            }),
        }
    }
}

pub struct InstagramAdapter {
    client: InstagramClient,
}

impl InstagramAdapter {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            client: InstagramClient::new(client_id, client_secret),
        }
    }

    pub fn with_client(client: InstagramClient) -> Self {
        Self { client }
    }

    /// The underlying API client; the aggregator issues media calls directly.
    pub fn api(&self) -> &InstagramClient {
        &self.client
    }
}

#[async_trait]
impl ServiceAdapter for InstagramAdapter {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Instagram
    }

    async fn authorize_url(&self, callback_url: &str) -> Result<String, ServiceError> {
        Ok(self.client.authorize_url(callback_url))
    }

    async fn exchange_callback(
        &self,
        params: &CallbackParams,
        callback_url: &str,
    ) -> Result<ServiceCredential, ServiceError> {
        let code = params
            .code
            .as_deref()
            .ok_or_else(|| ServiceError::AuthExchange("Missing 'code' parameter".to_string()))?;
        let (token, _user_id) = self.client.exchange_code(code, callback_url).await?;
        Ok(ServiceCredential {
            token,
            secret: None,
        })
    }

    async fn fetch_profile(
        &self,
        credential: &ServiceCredential,
    ) -> Result<Profile, ServiceError> {
        self.client.profile(credential).await
    }
}
