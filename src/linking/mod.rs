//! Account linking: authorize, callback exchange, linked-user lookup, and
//! the lazy revocation transition shared with the aggregator.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::MazeCache;
use crate::credentials::{CredentialStore, UserAccess};
use crate::maze::store::MazeStore;
use crate::maze::Maze;
use crate::services::facebook::FacebookAdapter;
use crate::services::flickr::FlickrAdapter;
use crate::services::instagram::InstagramAdapter;
use crate::services::{CallbackParams, Profile, ServiceAdapter, ServiceError, ServiceKind};

#[derive(Debug)]
pub enum LinkingError {
    Service(ServiceError),
    Storage(anyhow::Error),
}

impl fmt::Display for LinkingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkingError::Service(e) => write!(f, "{}", e),
            LinkingError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LinkingError {}

impl From<ServiceError> for LinkingError {
    fn from(e: ServiceError) -> Self {
        LinkingError::Service(e)
    }
}

impl From<anyhow::Error> for LinkingError {
    fn from(e: anyhow::Error) -> Self {
        LinkingError::Storage(e)
    }
}

/// Drives the linking state machine for every service.
///
/// A maze only ever holds a weak reference (the external user ID) to a
/// credential; this service is the one place that moves both sides of that
/// reference together.
pub struct LinkingService {
    maze_store: Arc<MazeStore>,
    credentials: Arc<CredentialStore>,
    cache: Arc<MazeCache>,
    flickr: Arc<FlickrAdapter>,
    instagram: Arc<InstagramAdapter>,
    facebook: Arc<FacebookAdapter>,
}

impl LinkingService {
    pub fn new(
        maze_store: Arc<MazeStore>,
        credentials: Arc<CredentialStore>,
        cache: Arc<MazeCache>,
        flickr: Arc<FlickrAdapter>,
        instagram: Arc<InstagramAdapter>,
        facebook: Arc<FacebookAdapter>,
    ) -> Self {
        Self {
            maze_store,
            credentials,
            cache,
            flickr,
            instagram,
            facebook,
        }
    }

    pub fn adapter(&self, service: ServiceKind) -> &dyn ServiceAdapter {
        match service {
            ServiceKind::Flickr => self.flickr.as_ref(),
            ServiceKind::Instagram => self.instagram.as_ref(),
            ServiceKind::Facebook => self.facebook.as_ref(),
        }
    }

    pub fn flickr(&self) -> &FlickrAdapter {
        &self.flickr
    }

    pub fn instagram(&self) -> &InstagramAdapter {
        &self.instagram
    }

    /// Where the user agent should be sent to authorize the service.
    pub async fn connect_url(
        &self,
        service: ServiceKind,
        callback_url: &str,
    ) -> Result<String, LinkingError> {
        Ok(self.adapter(service).authorize_url(callback_url).await?)
    }

    /// Complete a callback: exchange the grant, resolve the profile, store
    /// the credential, and attach its user ID to the maze.
    ///
    /// The credential row is written before the maze reference so a crash in
    /// between leaves an unreferenced row rather than a dangling reference.
    pub async fn complete_callback(
        &self,
        maze: &mut Maze,
        service: ServiceKind,
        params: &CallbackParams,
        callback_url: &str,
    ) -> Result<Profile, LinkingError> {
        let adapter = self.adapter(service);
        let credential = adapter.exchange_callback(params, callback_url).await?;
        let profile = adapter.fetch_profile(&credential).await?;

        self.credentials
            .upsert(service, &profile.user_id, &credential)?;
        maze.set_user_access(service, Some(profile.user_id.clone()));
        self.maze_store.put(maze)?;

        // The image list may now draw from a new account.
        self.cache.invalidate_maze(&maze.id);
        self.cache
            .set_linked_user(&maze.id, service, profile.clone());
        info!(
            maze_id = %maze.id,
            service = %service,
            user_id = %profile.user_id,
            "Linked account"
        );
        Ok(profile)
    }

    /// The stored credential referenced by a maze's settings, if any.
    ///
    /// A reference whose credential row is gone is treated as unlinked;
    /// storage errors are logged and degrade to "no credential".
    pub fn credential_for(&self, maze: &Maze, service: ServiceKind) -> Option<UserAccess> {
        let user_id = maze.user_access(service)?;
        match self.credentials.get(service, user_id) {
            Ok(found) => found,
            Err(e) => {
                warn!(maze_id = %maze.id, service = %service, error = %e,
                      "Credential lookup failed");
                None
            }
        }
    }

    /// The profile of the account linked for a service, cached per maze.
    ///
    /// A revoked credential tears the link down and reads as unlinked.
    pub async fn linked_user(
        &self,
        maze: &Maze,
        service: ServiceKind,
    ) -> Result<Option<Profile>, LinkingError> {
        if maze.user_access(service).is_none() {
            return Ok(None);
        }
        if let Some(profile) = self.cache.get_linked_user(&maze.id, service) {
            return Ok(Some(profile));
        }
        let Some(access) = self.credential_for(maze, service) else {
            return Ok(None);
        };
        match self.adapter(service).fetch_profile(&access.credential).await {
            Ok(profile) => {
                self.cache
                    .set_linked_user(&maze.id, service, profile.clone());
                Ok(Some(profile))
            }
            Err(ServiceError::Revoked) => {
                self.detach_access(&maze.id, service, &access.user_id)?;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Tear down a link whose credential the service reported revoked:
    /// clear the maze's reference, drop the credential row, and flush the
    /// maze's cache entries.
    pub fn detach_access(
        &self,
        maze_id: &str,
        service: ServiceKind,
        user_id: &str,
    ) -> Result<(), LinkingError> {
        if let Some(mut maze) = self.maze_store.get(maze_id)? {
            if maze.user_access(service) == Some(user_id) {
                maze.set_user_access(service, None);
                self.maze_store.put(&mut maze)?;
            }
        }
        self.credentials.revoke(service, user_id)?;
        self.cache.invalidate_maze(maze_id);
        info!(maze_id = %maze_id, service = %service, user_id = %user_id,
              "Detached revoked account");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MazeCache;
    use crate::services::instagram::InstagramClient;
    use crate::services::request_token::RequestTokenStore;
    use crate::services::ServiceCredential;
    use std::time::Duration;

    fn service_with_instagram(server_url: &str) -> (LinkingService, Arc<MazeStore>) {
        let maze_store = Arc::new(MazeStore::in_memory().unwrap());
        let key = crate::credentials::generate_key_base64();
        let credentials = Arc::new(CredentialStore::new(":memory:", &key).unwrap());
        let cache = Arc::new(MazeCache::new(Duration::from_secs(60)));
        let instagram = Arc::new(InstagramAdapter::with_client(
            InstagramClient::with_base_urls(
                "id".to_string(),
                "secret".to_string(),
                server_url.to_string(),
                format!("{}/oauth", server_url),
            ),
        ));
        let flickr = Arc::new(FlickrAdapter::new(
            "key".to_string(),
            "secret".to_string(),
            RequestTokenStore::new(600),
        ));
        let facebook = Arc::new(FacebookAdapter::new("id".to_string(), "s".to_string()));
        let linksvc = LinkingService::new(
            maze_store.clone(),
            credentials,
            cache,
            flickr,
            instagram,
            facebook,
        );
        (linksvc, maze_store)
    }

    fn profile_body() -> &'static str {
        r#"{"data": {"id": "777", "username": "ann", "full_name": "Ann B",
             "profile_picture": "http://img/ann.jpg"}}"#
    }

    #[tokio::test]
    async fn test_complete_callback_links_account() {
        let mut server = mockito::Server::new_async().await;
        let token_mock = server
            .mock("POST", "/oauth/access_token")
            .with_body(r#"{"access_token": "tok", "user": {"id": "777"}}"#)
            .create_async()
            .await;
        let profile_mock = server
            .mock("GET", mockito::Matcher::Regex("/users/self/.*".to_string()))
            .with_body(profile_body())
            .create_async()
            .await;

        let (linksvc, maze_store) = service_with_instagram(&server.url());
        let mut maze = maze_store.create("M", "a@example.com", "", "p").unwrap();
        let params = CallbackParams {
            code: Some("grant".to_string()),
            ..Default::default()
        };

        let profile = linksvc
            .complete_callback(&mut maze, ServiceKind::Instagram, &params, "http://cb")
            .await
            .unwrap();
        token_mock.assert_async().await;
        profile_mock.assert_async().await;
        assert_eq!(profile.user_id, "777");
        assert_eq!(profile.name, "Ann B");

        let stored = maze_store.get(&maze.id).unwrap().unwrap();
        assert_eq!(stored.user_access(ServiceKind::Instagram), Some("777"));
        let access = linksvc
            .credential_for(&stored, ServiceKind::Instagram)
            .unwrap();
        assert_eq!(access.credential.token, "tok");
    }

    #[tokio::test]
    async fn test_linked_user_unlinked_maze() {
        let server = mockito::Server::new_async().await;
        let (linksvc, maze_store) = service_with_instagram(&server.url());
        let maze = maze_store.create("M", "a@example.com", "", "p").unwrap();
        let linked = linksvc
            .linked_user(&maze, ServiceKind::Instagram)
            .await
            .unwrap();
        assert!(linked.is_none());
    }

    #[tokio::test]
    async fn test_linked_user_cached_after_first_fetch() {
        let mut server = mockito::Server::new_async().await;
        let profile_mock = server
            .mock("GET", mockito::Matcher::Regex("/users/self/.*".to_string()))
            .with_body(profile_body())
            .expect(1)
            .create_async()
            .await;

        let (linksvc, maze_store) = service_with_instagram(&server.url());
        let mut maze = maze_store.create("M", "a@example.com", "", "p").unwrap();
        linksvc
            .credentials
            .upsert(
                ServiceKind::Instagram,
                "777",
                &ServiceCredential {
                    token: "tok".to_string(),
                    secret: None,
                },
            )
            .unwrap();
        maze.set_user_access(ServiceKind::Instagram, Some("777".to_string()));
        maze_store.put(&mut maze).unwrap();

        for _ in 0..3 {
            let linked = linksvc
                .linked_user(&maze, ServiceKind::Instagram)
                .await
                .unwrap();
            assert_eq!(linked.unwrap().user_id, "777");
        }
        profile_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_revoked_profile_detaches_link() {
        let mut server = mockito::Server::new_async().await;
        // Instagram signals revocation with HTTP 400.
        server
            .mock("GET", mockito::Matcher::Regex("/users/self/.*".to_string()))
            .with_status(400)
            .create_async()
            .await;

        let (linksvc, maze_store) = service_with_instagram(&server.url());
        let mut maze = maze_store.create("M", "a@example.com", "", "p").unwrap();
        linksvc
            .credentials
            .upsert(
                ServiceKind::Instagram,
                "777",
                &ServiceCredential {
                    token: "tok".to_string(),
                    secret: None,
                },
            )
            .unwrap();
        maze.set_user_access(ServiceKind::Instagram, Some("777".to_string()));
        maze_store.put(&mut maze).unwrap();

        let linked = linksvc
            .linked_user(&maze, ServiceKind::Instagram)
            .await
            .unwrap();
        assert!(linked.is_none());

        let stored = maze_store.get(&maze.id).unwrap().unwrap();
        assert!(stored.user_access(ServiceKind::Instagram).is_none());
        assert!(linksvc
            .credentials
            .get(ServiceKind::Instagram, "777")
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_stale_reference_reads_as_unlinked() {
        let server = mockito::Server::new_async().await;
        let (linksvc, maze_store) = service_with_instagram(&server.url());
        let mut maze = maze_store.create("M", "a@example.com", "", "p").unwrap();
        maze.set_user_access(ServiceKind::Instagram, Some("gone".to_string()));
        maze_store.put(&mut maze).unwrap();

        let linked = linksvc
            .linked_user(&maze, ServiceKind::Instagram)
            .await
            .unwrap();
        assert!(linked.is_none());
    }
}
