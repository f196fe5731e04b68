//! Fans out to internal storage and every connected external service,
//! merges the results into one ordered image list, and caches it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::MazeCache;
use crate::images::normalize;
use crate::images::Image;
use crate::linking::LinkingService;
use crate::maze::images::MazeImageStore;
use crate::maze::Maze;
use crate::services::flickr::{DEFAULT_PAGE_SIZE, LICENSES_ALL, LICENSES_PUBLIC};
use crate::services::license::LicenseTable;
use crate::services::{ServiceError, ServiceKind};

pub struct Aggregator {
    linking: Arc<LinkingService>,
    image_store: Arc<MazeImageStore>,
    cache: Arc<MazeCache>,
    licenses: Arc<LicenseTable>,
}

impl Aggregator {
    pub fn new(
        linking: Arc<LinkingService>,
        image_store: Arc<MazeImageStore>,
        cache: Arc<MazeCache>,
        licenses: Arc<LicenseTable>,
    ) -> Self {
        Self {
            linking,
            image_store,
            cache,
            licenses,
        }
    }

    /// The merged image list for a maze, internal images first, then
    /// Flickr, then Instagram.
    ///
    /// Sources run concurrently; a failing source contributes nothing and
    /// never fails the whole list. The result is cached per maze.
    pub async fn get_images(&self, maze: &Maze, size: u32, page: u32) -> Arc<Vec<Image>> {
        if let Some(cached) = self.cache.get_images(&maze.id) {
            debug!(maze_id = %maze.id, "Image list cache hit");
            return cached;
        }

        let (internal, flickr, instagram) = tokio::join!(
            self.internal_images(maze, size, page),
            self.flickr_images(maze, size, page),
            self.instagram_images(maze, size),
        );

        let mut images = internal;
        images.extend(flickr);
        images.extend(instagram);
        let images = Arc::new(images);
        self.cache.set_images(&maze.id, images.clone());
        images
    }

    /// Unauthenticated Flickr search restricted to open licenses. Backs the
    /// public maze view and the in-request fallback after a revoked
    /// credential.
    pub async fn search_public(&self, tags: &str, user: &str, size: u32, page: u32) -> Vec<Image> {
        let tags = normalize::prepare_tags(tags);
        let user = normalize::prepare_search(user, true);
        if tags.is_empty() && user.is_empty() {
            return Vec::new();
        }
        let client = self.linking.flickr().api();
        let licenses = match self.licenses.get_or_fetch(client, &self.cache).await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "License table fetch failed");
                Arc::new(HashMap::new())
            }
        };
        match client
            .search_photos(&tags, &user, LICENSES_PUBLIC, None, page, DEFAULT_PAGE_SIZE)
            .await
        {
            Ok(photos) => {
                let set: HashSet<Image> =
                    normalize::flickr_photos(&photos, size, &licenses).into_iter().collect();
                set.into_iter().collect()
            }
            Err(e) => {
                warn!(error = %e, "Public Flickr search failed");
                Vec::new()
            }
        }
    }

    async fn internal_images(&self, maze: &Maze, size: u32, page: u32) -> Vec<Image> {
        match self.image_store.list_page(&maze.id, page, DEFAULT_PAGE_SIZE) {
            Ok(rows) => rows
                .iter()
                .map(|row| normalize::internal_image(&row.reference(), &row.message, size))
                .collect(),
            Err(e) => {
                warn!(maze_id = %maze.id, error = %e, "Internal image query failed");
                Vec::new()
            }
        }
    }

    /// Union of the maze's configured Flickr sources, deduplicated within
    /// this source only.
    async fn flickr_images(&self, maze: &Maze, size: u32, page: u32) -> Vec<Image> {
        let settings = &maze.flickr;
        let access = self.linking.credential_for(maze, ServiceKind::Flickr);
        let has_search = !settings.tags.trim().is_empty() || !settings.user.trim().is_empty();
        let has_account_sources =
            access.is_some() && (settings.include_recent || settings.include_favs);
        if !has_search && !has_account_sources {
            return Vec::new();
        }

        let client = self.linking.flickr().api();
        let licenses = match self.licenses.get_or_fetch(client, &self.cache).await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "License table fetch failed");
                Arc::new(HashMap::new())
            }
        };
        let credential = access.as_ref().map(|a| &a.credential);

        let mut set: HashSet<Image> = HashSet::new();
        if has_search {
            let tags = normalize::prepare_tags(&settings.tags);
            let user = normalize::prepare_search(&settings.user, true);
            // Unauthenticated searches are restricted to open licenses.
            let license_filter = if credential.is_some() {
                LICENSES_ALL
            } else {
                LICENSES_PUBLIC
            };
            match client
                .search_photos(&tags, &user, license_filter, credential, page, DEFAULT_PAGE_SIZE)
                .await
            {
                Ok(photos) => set.extend(normalize::flickr_photos(&photos, size, &licenses)),
                Err(ServiceError::Revoked) => {
                    self.handle_revoked(maze, ServiceKind::Flickr, access.as_ref());
                    return self.search_public(&settings.tags, &settings.user, size, page).await;
                }
                Err(e) => warn!(maze_id = %maze.id, error = %e, "Flickr search failed"),
            }
        }
        if let Some(access) = &access {
            if settings.include_recent {
                match client
                    .user_photos(&access.credential, page, DEFAULT_PAGE_SIZE)
                    .await
                {
                    Ok(photos) => set.extend(normalize::flickr_photos(&photos, size, &licenses)),
                    Err(ServiceError::Revoked) => {
                        self.handle_revoked(maze, ServiceKind::Flickr, Some(access));
                        return self.search_public(&settings.tags, &settings.user, size, page).await;
                    }
                    Err(e) => warn!(maze_id = %maze.id, error = %e, "Flickr recent failed"),
                }
            }
            if settings.include_favs {
                match client
                    .user_favorites(&access.credential, page, DEFAULT_PAGE_SIZE)
                    .await
                {
                    Ok(photos) => set.extend(normalize::flickr_photos(&photos, size, &licenses)),
                    Err(ServiceError::Revoked) => {
                        self.handle_revoked(maze, ServiceKind::Flickr, Some(access));
                        return self.search_public(&settings.tags, &settings.user, size, page).await;
                    }
                    Err(e) => warn!(maze_id = %maze.id, error = %e, "Flickr favorites failed"),
                }
            }
        }
        set.into_iter().collect()
    }

    /// Union of the maze's configured Instagram sources. Everything here
    /// needs a linked account.
    async fn instagram_images(&self, maze: &Maze, size: u32) -> Vec<Image> {
        let settings = &maze.instagram;
        let Some(access) = self.linking.credential_for(maze, ServiceKind::Instagram) else {
            return Vec::new();
        };
        let client = self.linking.instagram().api();
        let credential = &access.credential;

        let mut set: HashSet<Image> = HashSet::new();
        let tag = normalize::prepare_search(&settings.tag, true);
        if !tag.is_empty() {
            match client.tag_media(credential, &tag).await {
                Ok(media) => set.extend(normalize::instagram_media(&media, size)),
                Err(ServiceError::Revoked) => {
                    self.handle_revoked(maze, ServiceKind::Instagram, Some(&access));
                    return Vec::new();
                }
                Err(e) => warn!(maze_id = %maze.id, error = %e, "Instagram tag search failed"),
            }
        }
        if settings.include_recent {
            match client.recent_media(credential).await {
                Ok(media) => set.extend(normalize::instagram_media(&media, size)),
                Err(ServiceError::Revoked) => {
                    self.handle_revoked(maze, ServiceKind::Instagram, Some(&access));
                    return Vec::new();
                }
                Err(e) => warn!(maze_id = %maze.id, error = %e, "Instagram recent failed"),
            }
        }
        if settings.include_feed {
            match client.feed(credential).await {
                Ok(media) => set.extend(normalize::instagram_media(&media, size)),
                Err(ServiceError::Revoked) => {
                    self.handle_revoked(maze, ServiceKind::Instagram, Some(&access));
                    return Vec::new();
                }
                Err(e) => warn!(maze_id = %maze.id, error = %e, "Instagram feed failed"),
            }
        }
        set.into_iter().collect()
    }

    /// Tear down a revoked link so later requests stop trying. For Flickr
    /// the caller falls back to the unauthenticated public search in the
    /// same request; Instagram has no credential-free mode, so its source
    /// drops entirely.
    fn handle_revoked(
        &self,
        maze: &Maze,
        service: ServiceKind,
        access: Option<&crate::credentials::UserAccess>,
    ) {
        if let Some(access) = access {
            warn!(maze_id = %maze.id, service = %service, "Credential revoked during aggregation");
            if let Err(e) = self
                .linking
                .detach_access(&maze.id, service, &access.user_id)
            {
                warn!(maze_id = %maze.id, service = %service, error = %e,
                      "Failed to detach revoked account");
            }
        }
    }
}
