//! Facebook adapter (Graph API v2.1, OAuth 2.0).
//!
//! The adapter contract is complete but the linking flow is not routed yet;
//! the connect endpoint answers "Not yet" until the app review clears.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::services::{
    parse_form_body, CallbackParams, Profile, ServiceAdapter, ServiceCredential, ServiceError,
    ServiceKind,
};

pub const GRAPH_URL: &str = "https://graph.facebook.com";
pub const DIALOG_URL: &str = "https://www.facebook.com/dialog/oauth";
pub const VERSION: &str = "v2.1";

#[derive(Debug, Deserialize)]
struct GraphUser {
    id: String,
    name: String,
    #[serde(default)]
    picture: Option<GraphPicture>,
}

#[derive(Debug, Deserialize)]
struct GraphPicture {
    data: GraphPictureData,
}

#[derive(Debug, Deserialize)]
struct GraphPictureData {
    url: String,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    error: GraphErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GraphErrorDetail {
    message: String,
}

pub struct FacebookAdapter {
    app_id: String,
    app_secret: String,
    http_client: Client,
    graph_url: String,
    dialog_url: String,
}

impl FacebookAdapter {
    pub fn new(app_id: String, app_secret: String) -> Self {
        Self::with_base_urls(
            app_id,
            app_secret,
            GRAPH_URL.to_string(),
            DIALOG_URL.to_string(),
        )
    }

    /// Custom base URLs for testing with a mock server.
    pub fn with_base_urls(
        app_id: String,
        app_secret: String,
        graph_url: String,
        dialog_url: String,
    ) -> Self {
        let http_client = Client::builder()
            .user_agent("photomaze/1.0")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            app_id,
            app_secret,
            http_client,
            graph_url,
            dialog_url,
        }
    }

    async fn fetch(&self, url: &str) -> Result<String, ServiceError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::External(format!("Facebook request failed: {}", e)))?;
        response
            .text()
            .await
            .map_err(|e| ServiceError::External(format!("Facebook response read failed: {}", e)))
    }
}

#[async_trait]
impl ServiceAdapter for FacebookAdapter {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Facebook
    }

    async fn authorize_url(&self, callback_url: &str) -> Result<String, ServiceError> {
        Ok(format!(
            "{}?client_id={}&redirect_uri={}&scope=user_photos",
            self.dialog_url,
            urlencoding::encode(&self.app_id),
            urlencoding::encode(callback_url)
        ))
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

        let url = format!(
            "{}/oauth/access_token?code={}&redirect_uri={}&client_id={}&client_secret={}",
            self.graph_url,
            urlencoding::encode(code),
            urlencoding::encode(callback_url),
            urlencoding::encode(&self.app_id),
            urlencoding::encode(&self.app_secret)
        );
        let body = self.fetch(&url).await?;

        // Older Graph versions answer form-encoded, newer ones JSON.
        let form = parse_form_body(&body);
        if let Some(token) = form.get("access_token") {
            return Ok(ServiceCredential {
                token: token.clone(),
                secret: None,
            });
        }
        if let Ok(json) = serde_json::from_str::<serde_json::Value>(&body) {
            if let Some(token) = json["access_token"].as_str() {
                return Ok(ServiceCredential {
                    token: token.to_string(),
                    secret: None,
                });
            }
            if let Ok(err) = serde_json::from_value::<GraphError>(json) {
                return Err(ServiceError::AuthExchange(err.error.message));
            }
        }
        Err(ServiceError::AuthExchange(
            "Malformed access token response".to_string(),
        ))
    }

    async fn fetch_profile(
        &self,
        credential: &ServiceCredential,
    ) -> Result<Profile, ServiceError> {
        let url = format!(
            "{}/{}/me?access_token={}&fields=id,name,picture",
            self.graph_url,
            VERSION,
            urlencoding::encode(&credential.token)
        );
        let body = self.fetch(&url).await?;
        // Any Graph error on a profile fetch tears the link down, matching
        // the lazy revocation transition of the other services.
        if serde_json::from_str::<GraphError>(&body).is_ok() {
            return Err(ServiceError::Revoked);
        }
        let user: GraphUser = serde_json::from_str(&body)
            .map_err(|e| ServiceError::External(format!("Malformed profile response: {}", e)))?;
        Ok(Profile {
            user_id: user.id,
            name: user.name,
            icon_url: user.picture.map(|p| p.data.url).unwrap_or_default(),
        })
    }
}
