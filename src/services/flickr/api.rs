//! HTTP client for the Flickr REST and OAuth 1.0a endpoints.
//!
//! All REST calls go through one envelope check: a `stat: "fail"` body with
//! code 98 means the token was revoked and maps to [`ServiceError::Revoked`];
//! any other failure is an external service error.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::oauth1;
use crate::services::{parse_form_body, ServiceCredential, ServiceError};

pub const REST_URL: &str = "https://api.flickr.com/services/rest";
pub const OAUTH_URL: &str = "https://www.flickr.com/services/oauth";

/// Photo metadata requested on every search/list call.
pub const EXTRAS: &str = "url_s,url_z,url_l,owner_name,license";

/// Flickr error code meaning the access token is no longer valid.
const CODE_TOKEN_REVOKED: i64 = 98;

/// One photo record with the three pre-computed size variants.
#[derive(Debug, Clone, Deserialize)]
pub struct FlickrPhoto {
    pub id: String,
    pub owner: String,
    #[serde(default)]
    pub ownername: Option<String>,
    pub title: String,
    #[serde(default)]
    pub license: Option<String>,
    #[serde(default)]
    pub url_s: Option<String>,
    #[serde(default)]
    pub url_z: Option<String>,
    #[serde(default)]
    pub url_l: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentField {
    #[serde(rename = "_content")]
    content: String,
}

/// Person record from `flickr.people.getInfo`.
#[derive(Debug, Deserialize)]
pub struct FlickrPerson {
    pub nsid: String,
    username: ContentField,
    #[serde(default)]
    realname: Option<ContentField>,
    #[serde(default)]
    pub iconserver: Option<String>,
    #[serde(default)]
    pub iconfarm: Option<i64>,
}

impl FlickrPerson {
    pub fn display_name(&self) -> &str {
        match &self.realname {
            Some(r) if !r.content.is_empty() => &r.content,
            _ => &self.username.content,
        }
    }
}

/// One entry of the service-wide license table.
#[derive(Debug, Clone, Deserialize)]
pub struct FlickrLicenseRecord {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    pub name: String,
    pub url: String,
}

// The license list endpoint has returned both numeric and string IDs over
// time; normalize to string since photo records carry strings.
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    match v {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected license id: {}",
            other
        ))),
    }
}

/// Client for Flickr's REST API; signs requests with OAuth 1.0a when a
/// credential is supplied, otherwise sends plain API-key requests.
pub struct FlickrClient {
    consumer_key: String,
    consumer_secret: String,
    http_client: Client,
    rest_url: String,
    oauth_url: String,
}

impl FlickrClient {
    pub fn new(consumer_key: String, consumer_secret: String) -> Self {
        Self::with_base_urls(
            consumer_key,
            consumer_secret,
            REST_URL.to_string(),
            OAUTH_URL.to_string(),
        )
    }

    /// Custom base URLs for testing with a mock server.
    pub fn with_base_urls(
        consumer_key: String,
        consumer_secret: String,
        rest_url: String,
        oauth_url: String,
    ) -> Self {
        let http_client = Client::builder()
            .user_agent("photomaze/1.0")
            .build()
            .expect("Failed to build HTTP client");
        Self {
            consumer_key,
            consumer_secret,
            http_client,
            rest_url,
            oauth_url,
        }
    }

    /// Obtain a request token for the three-legged flow.
    ///
    /// Returns `(token, secret)`.
    pub async fn request_token(&self, callback_url: &str) -> Result<(String, String), ServiceError> {
        let url = format!("{}/request_token", self.oauth_url);
        let params = vec![("oauth_callback".to_string(), callback_url.to_string())];
        let signed = oauth1::signed_url(&url, params, &self.consumer_key, &self.consumer_secret, "");

        let body = self.fetch_text(&signed).await?;
        let fields = parse_form_body(&body);
        match (fields.get("oauth_token"), fields.get("oauth_token_secret")) {
            (Some(token), Some(secret)) => Ok((token.clone(), secret.clone())),
            _ => Err(ServiceError::External(format!(
                "Malformed request token response: {}",
                body
            ))),
        }
    }

    /// Exchange a verified request token for an access token.
    ///
    /// Returns `(token, secret, user_nsid)`.
    pub async fn access_token(
        &self,
        request_token: &str,
        request_secret: &str,
        verifier: &str,
    ) -> Result<(String, String, String), ServiceError> {
        let url = format!("{}/access_token", self.oauth_url);
        let params = vec![
            ("oauth_token".to_string(), request_token.to_string()),
            ("oauth_verifier".to_string(), verifier.to_string()),
        ];
        let signed = oauth1::signed_url(
            &url,
            params,
            &self.consumer_key,
            &self.consumer_secret,
            request_secret,
        );

        let body = self.fetch_text(&signed).await?;
        let fields = parse_form_body(&body);
        match (
            fields.get("oauth_token"),
            fields.get("oauth_token_secret"),
            fields.get("user_nsid"),
        ) {
            (Some(token), Some(secret), Some(nsid)) => {
                Ok((token.clone(), secret.clone(), nsid.clone()))
            }
            _ => Err(ServiceError::AuthExchange(format!(
                "Malformed access token response: {}",
                body
            ))),
        }
    }

    /// Authorization page URL for a request token.
    pub fn authorize_url(&self, request_token: &str) -> String {
        format!(
            "{}/authorize?oauth_token={}&perms=read",
            self.oauth_url,
            urlencoding::encode(request_token)
        )
    }

    /// Search photos by tags and/or user.
    pub async fn search_photos(
        &self,
        tags: &str,
        user: &str,
        licenses: &str,
        credential: Option<&ServiceCredential>,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<FlickrPhoto>, ServiceError> {
        let mut params = vec![
            ("media".to_string(), "photos".to_string()),
            ("extras".to_string(), EXTRAS.to_string()),
            ("license".to_string(), licenses.to_string()),
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), page_size.to_string()),
        ];
        if !tags.is_empty() {
            params.push(("tags".to_string(), tags.to_string()));
        }
        if !user.is_empty() {
            params.push(("user_id".to_string(), user.to_string()));
        }
        let value = self
            .call("flickr.photos.search", params, credential)
            .await?;
        photo_list(&value)
    }

    /// The credential owner's own (recent) photos.
    pub async fn user_photos(
        &self,
        credential: &ServiceCredential,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<FlickrPhoto>, ServiceError> {
        let params = vec![
            ("user_id".to_string(), "me".to_string()),
            ("extras".to_string(), EXTRAS.to_string()),
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), page_size.to_string()),
        ];
        let value = self
            .call("flickr.people.getPhotos", params, Some(credential))
            .await?;
        photo_list(&value)
    }

    /// The credential owner's favorites.
    pub async fn user_favorites(
        &self,
        credential: &ServiceCredential,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<FlickrPhoto>, ServiceError> {
        let params = vec![
            ("extras".to_string(), EXTRAS.to_string()),
            ("page".to_string(), page.to_string()),
            ("per_page".to_string(), page_size.to_string()),
        ];
        let value = self
            .call("flickr.favorites.getList", params, Some(credential))
            .await?;
        photo_list(&value)
    }

    /// Resolve the credential owner's user ID (`flickr.test.login`).
    pub async fn test_login(&self, credential: &ServiceCredential) -> Result<String, ServiceError> {
        let value = self
            .call("flickr.test.login", Vec::new(), Some(credential))
            .await?;
        value["user"]["id"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| ServiceError::External("Malformed test.login response".to_string()))
    }

    /// Person details for buddy-icon synthesis and display name.
    pub async fn person_info(
        &self,
        nsid: &str,
        credential: Option<&ServiceCredential>,
    ) -> Result<FlickrPerson, ServiceError> {
        let params = vec![("user_id".to_string(), nsid.to_string())];
        let value = self
            .call("flickr.people.getInfo", params, credential)
            .await?;
        serde_json::from_value(value["person"].clone())
            .map_err(|e| ServiceError::External(format!("Malformed person response: {}", e)))
    }

    /// The full license table (`flickr.photos.licenses.getInfo`).
    pub async fn license_list(&self) -> Result<Vec<FlickrLicenseRecord>, ServiceError> {
        let value = self
            .call("flickr.photos.licenses.getInfo", Vec::new(), None)
            .await?;
        serde_json::from_value(value["licenses"]["license"].clone())
            .map_err(|e| ServiceError::External(format!("Malformed license response: {}", e)))
    }

    /// Issue a REST call and unwrap the response envelope.
    async fn call(
        &self,
        method: &str,
        mut params: Vec<(String, String)>,
        credential: Option<&ServiceCredential>,
    ) -> Result<Value, ServiceError> {
        params.push(("method".to_string(), method.to_string()));
        params.push(("format".to_string(), "json".to_string()));
        params.push(("nojsoncallback".to_string(), "1".to_string()));

        let url = match credential {
            Some(cred) => {
                let mut signed_params = params;
                signed_params.push(("oauth_token".to_string(), cred.token.clone()));
                oauth1::signed_url(
                    &self.rest_url,
                    signed_params,
                    &self.consumer_key,
                    &self.consumer_secret,
                    cred.secret.as_deref().unwrap_or(""),
                )
            }
            None => {
                params.push(("api_key".to_string(), self.consumer_key.clone()));
                let query = params
                    .iter()
                    .map(|(k, v)| {
                        format!("{}={}", urlencoding::encode(k), urlencoding::encode(v))
                    })
                    .collect::<Vec<_>>()
                    .join("&");
                format!("{}?{}", self.rest_url, query)
            }
        };

        let body = self.fetch_text(&url).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ServiceError::External(format!("Invalid JSON from Flickr: {}", e)))?;
        check_envelope(&value)?;
        Ok(value)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, ServiceError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ServiceError::External(format!("Flickr request failed: {}", e)))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::External(format!("Flickr response read failed: {}", e)))?;
        if !status.is_success() {
            return Err(ServiceError::External(format!(
                "Flickr returned {}: {}",
                status, body
            )));
        }
        Ok(body)
    }
}

/// Map the REST envelope to our error taxonomy.
fn check_envelope(value: &Value) -> Result<(), ServiceError> {
    if value["stat"].as_str() == Some("fail") {
        let code = value["code"].as_i64().unwrap_or(0);
        let message = value["message"].as_str().unwrap_or("unknown").to_string();
        if code == CODE_TOKEN_REVOKED {
            return Err(ServiceError::Revoked);
        }
        return Err(ServiceError::External(format!(
            "Flickr API error {}: {}",
            code, message
        )));
    }
    Ok(())
}

fn photo_list(value: &Value) -> Result<Vec<FlickrPhoto>, ServiceError> {
    serde_json::from_value(value["photos"]["photo"].clone())
        .map_err(|e| ServiceError::External(format!("Malformed photo list: {}", e)))
}
