//! Flickr adapter (OAuth 1.0a, three-legged).
//!
//! The authorize leg synchronously obtains a request token and parks its
//! secret in the [`RequestTokenStore`]; the callback leg combines that secret
//! with the verifier to mint the access credential.

pub mod api;
pub mod oauth1;

use async_trait::async_trait;

use crate::services::request_token::RequestTokenStore;
use crate::services::{
    CallbackParams, Profile, ServiceAdapter, ServiceCredential, ServiceError, ServiceKind,
};
use api::{FlickrClient, FlickrPerson};

/// All license classes, used for authenticated searches.
pub const LICENSES_ALL: &str = "0,1,2,3,4,5,6,7,8";
/// Everything except "All Rights Reserved", used for public searches.
pub const LICENSES_PUBLIC: &str = "1,2,3,4,5,6,7,8";

pub const DEFAULT_PAGE_SIZE: u32 = 30;

const BUDDYICON_FALLBACK: &str = "https://www.flickr.com/images/buddyicon.gif";

pub struct FlickrAdapter {
    client: FlickrClient,
    tokens: RequestTokenStore,
}

impl FlickrAdapter {
    pub fn new(consumer_key: String, consumer_secret: String, tokens: RequestTokenStore) -> Self {
        Self {
            client: FlickrClient::new(consumer_key, consumer_secret),
            tokens,
        }
    }

    pub fn with_client(client: FlickrClient, tokens: RequestTokenStore) -> Self {
        Self { client, tokens }
    }

    /// The underlying REST client; the aggregator issues media calls directly.
    pub fn api(&self) -> &FlickrClient {
        &self.client
    }
}

#[async_trait]
impl ServiceAdapter for FlickrAdapter {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Flickr
    }

    async fn authorize_url(&self, callback_url: &str) -> Result<String, ServiceError> {
        let (token, secret) = self.client.request_token(callback_url).await?;
        self.tokens.insert(&token, &secret);
        Ok(self.client.authorize_url(&token))
    }

    async fn exchange_callback(
        &self,
        params: &CallbackParams,
        _callback_url: &str,
    ) -> Result<ServiceCredential, ServiceError> {
        let token = params
            .oauth_token
            .as_deref()
            .ok_or_else(|| ServiceError::AuthExchange("Missing oauth_token".to_string()))?;
        let verifier = params
            .oauth_verifier
            .as_deref()
            .ok_or_else(|| ServiceError::AuthExchange("Missing oauth_verifier".to_string()))?;

        // The secret was parked when the authorize URL was built; without it
        // the verifier is useless.
        let secret = self.tokens.take(token).ok_or(ServiceError::StateMissing)?;

        let (access_token, access_secret, _nsid) =
            self.client.access_token(token, &secret, verifier).await?;
        Ok(ServiceCredential {
            token: access_token,
            secret: Some(access_secret),
        })
    }

    async fn fetch_profile(
        &self,
        credential: &ServiceCredential,
    ) -> Result<Profile, ServiceError> {
        let nsid = self.client.test_login(credential).await?;
        let person = self.client.person_info(&nsid, Some(credential)).await?;
        Ok(Profile {
            user_id: person.nsid.clone(),
            name: person.display_name().to_string(),
            icon_url: buddy_icon_url(&person),
        })
    }
}

/// Synthesize the buddy-icon URL from farm/server/nsid, falling back to the
/// generic icon when no icon server is set or the field is malformed.
pub fn buddy_icon_url(person: &FlickrPerson) -> String {
    let server: i64 = person
        .iconserver
        .as_deref()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    match (server > 0, person.iconfarm) {
        (true, Some(farm)) => format!(
            "https://farm{}.staticflickr.com/{}/buddyicons/{}.jpg",
            farm,
            person.iconserver.as_deref().unwrap_or_default(),
            person.nsid
        ),
        _ => BUDDYICON_FALLBACK.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn adapter_for(server: &Server) -> FlickrAdapter {
        let client = FlickrClient::with_base_urls(
            "ckey".to_string(),
            "csecret".to_string(),
            format!("{}/rest", server.url()),
            format!("{}/oauth", server.url()),
        );
        FlickrAdapter::with_client(client, RequestTokenStore::new(600))
    }

    #[tokio::test]
    async fn test_authorize_url_parks_request_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/oauth/request_token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("oauth_callback_confirmed=true&oauth_token=rt1&oauth_token_secret=rs1")
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        let url = adapter
            .authorize_url("https://maze.example/callback")
            .await
            .unwrap();

        assert!(url.contains("/oauth/authorize?oauth_token=rt1"));
        assert_eq!(adapter.tokens.take("rt1").as_deref(), Some("rs1"));
    }

    #[tokio::test]
    async fn test_exchange_without_parked_token_is_state_missing() {
        let server = Server::new_async().await;
        let adapter = adapter_for(&server);

        let params = CallbackParams {
            oauth_token: Some("unknown".to_string()),
            oauth_verifier: Some("v".to_string()),
            ..Default::default()
        };
        let err = adapter
            .exchange_callback(&params, "https://maze.example/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::StateMissing));
    }

    #[tokio::test]
    async fn test_exchange_completes_flow() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/oauth/access_token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("oauth_token=at1&oauth_token_secret=as1&user_nsid=42%40N00&username=bob")
            .create_async()
            .await;

        let adapter = adapter_for(&server);
        adapter.tokens.insert("rt1", "rs1");

        let params = CallbackParams {
            oauth_token: Some("rt1".to_string()),
            oauth_verifier: Some("v123".to_string()),
            ..Default::default()
        };
        let credential = adapter
            .exchange_callback(&params, "https://maze.example/callback")
            .await
            .unwrap();
        assert_eq!(credential.token, "at1");
        assert_eq!(credential.secret.as_deref(), Some("as1"));

        // Token is consumed by the exchange.
        assert!(adapter.tokens.take("rt1").is_none());
    }

    #[test]
    fn test_buddy_icon_synthesis() {
        let person: FlickrPerson = serde_json::from_value(serde_json::json!({
            "nsid": "99@N00",
            "username": {"_content": "alice"},
            "iconserver": "7372",
            "iconfarm": 8
        }))
        .unwrap();
        assert_eq!(
            buddy_icon_url(&person),
            "https://farm8.staticflickr.com/7372/buddyicons/99@N00.jpg"
        );
    }

    #[test]
    fn test_buddy_icon_fallback() {
        // Icon server "0" or malformed means no custom icon.
        for iconserver in [serde_json::json!("0"), serde_json::json!("bogus")] {
            let person: FlickrPerson = serde_json::from_value(serde_json::json!({
                "nsid": "99@N00",
                "username": {"_content": "alice"},
                "iconserver": iconserver,
                "iconfarm": 8
            }))
            .unwrap();
            assert_eq!(buddy_icon_url(&person), BUDDYICON_FALLBACK);
        }
    }
}
