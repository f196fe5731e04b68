//! Short-TTL memoization of aggregation results and linked-user lookups.
//!
//! The cache is best-effort: absence is always a valid outcome and never an
//! error. Entries are keyed by `(maze, kind)` and invalidated explicitly
//! whenever a settings mutation would change the computed result.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::images::Image;
use crate::services::{Profile, ServiceKind};

/// Generic single-key TTL cache.
pub struct TtlCache<V> {
    entries: DashMap<String, (V, Option<Instant>)>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Get a live value; expired entries are dropped on read.
    pub fn get(&self, key: &str) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.1 {
                Some(deadline) => Instant::now() >= deadline,
                None => false,
            },
            None => return None,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.0.clone())
    }

    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Some(Instant::now() + ttl)));
    }

    /// Insert without expiry (the license table entry).
    pub fn set_forever(&self, key: &str, value: V) {
        self.entries.insert(key.to_string(), (value, None));
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A Flickr license descriptor, as cached from the license table.
#[derive(Debug, Clone, PartialEq)]
pub struct License {
    pub name: String,
    pub url: String,
}

const LICENSE_TABLE_KEY: &str = "flickr_licenses";

/// Fetched external image bytes live much longer than computed lists; the
/// bytes behind a photo URL do not change.
const TEXTURE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Responses at or above this size are served but not cached.
pub const TEXTURE_CACHE_LIMIT: usize = 800_000;

/// Cached bytes of an externally hosted image, keyed by its source URL.
#[derive(Clone)]
pub struct Texture {
    pub content_type: String,
    pub bytes: Arc<Vec<u8>>,
}

/// All maze-derived caches, grouped behind one handle.
pub struct MazeCache {
    images: TtlCache<Arc<Vec<Image>>>,
    linked_users: TtlCache<Profile>,
    licenses: TtlCache<Arc<HashMap<String, License>>>,
    textures: TtlCache<Texture>,
    ttl: Duration,
}

impl MazeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            images: TtlCache::new(),
            linked_users: TtlCache::new(),
            licenses: TtlCache::new(),
            textures: TtlCache::new(),
            ttl,
        }
    }

    fn image_key(maze_id: &str) -> String {
        format!("{}:imagelist", maze_id)
    }

    fn user_key(maze_id: &str, service: ServiceKind) -> String {
        format!("{}:{}_user", maze_id, service.as_str())
    }

    pub fn get_images(&self, maze_id: &str) -> Option<Arc<Vec<Image>>> {
        self.images.get(&Self::image_key(maze_id))
    }

    pub fn set_images(&self, maze_id: &str, images: Arc<Vec<Image>>) {
        self.images.set(&Self::image_key(maze_id), images, self.ttl);
    }

    pub fn get_linked_user(&self, maze_id: &str, service: ServiceKind) -> Option<Profile> {
        self.linked_users.get(&Self::user_key(maze_id, service))
    }

    pub fn set_linked_user(&self, maze_id: &str, service: ServiceKind, profile: Profile) {
        self.linked_users
            .set(&Self::user_key(maze_id, service), profile, self.ttl);
    }

    pub fn get_licenses(&self) -> Option<Arc<HashMap<String, License>>> {
        self.licenses.get(LICENSE_TABLE_KEY)
    }

    pub fn set_licenses(&self, table: Arc<HashMap<String, License>>) {
        self.licenses.set_forever(LICENSE_TABLE_KEY, table);
    }

    pub fn get_texture(&self, url: &str) -> Option<Texture> {
        self.textures.get(url)
    }

    /// Texture entries above [`TEXTURE_CACHE_LIMIT`] are silently dropped.
    pub fn set_texture(&self, url: &str, texture: Texture) {
        if texture.bytes.len() < TEXTURE_CACHE_LIMIT {
            self.textures.set(url, texture, TEXTURE_TTL);
        }
    }

    /// Drop only the computed image list, leaving linked-user entries
    /// alone. Settings edits change what the list contains, not who is
    /// linked.
    pub fn invalidate_images(&self, maze_id: &str) {
        self.images.delete(&Self::image_key(maze_id));
    }

    /// Drop every derived entry for a maze. Called when an account is
    /// linked or detached, since that changes both caches.
    pub fn invalidate_maze(&self, maze_id: &str) {
        self.images.delete(&Self::image_key(maze_id));
        for service in [
            ServiceKind::Flickr,
            ServiceKind::Instagram,
            ServiceKind::Facebook,
        ] {
            self.linked_users.delete(&Self::user_key(maze_id, service));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let cache: TtlCache<String> = TtlCache::new();
        cache.set("k", "v".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get("k").as_deref(), Some("v"));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn test_expiry() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.set("k", 1, Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.get("k"), None);
        // Expired entry was removed on read.
        assert!(cache.is_empty());
    }

    #[test]
    fn test_set_forever_never_expires() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.set_forever("k", 7);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get("k"), Some(7));
    }

    #[test]
    fn test_delete() {
        let cache: TtlCache<u32> = TtlCache::new();
        cache.set("k", 1, Duration::from_secs(60));
        cache.delete("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn test_invalidate_maze_clears_all_kinds() {
        let cache = MazeCache::new(Duration::from_secs(60));
        cache.set_images("m1", Arc::new(Vec::new()));
        cache.set_linked_user(
            "m1",
            ServiceKind::Flickr,
            Profile {
                user_id: "u".to_string(),
                name: "n".to_string(),
                icon_url: String::new(),
            },
        );
        cache.set_images("m2", Arc::new(Vec::new()));

        cache.invalidate_maze("m1");

        assert!(cache.get_images("m1").is_none());
        assert!(cache.get_linked_user("m1", ServiceKind::Flickr).is_none());
        // Other mazes untouched.
        assert!(cache.get_images("m2").is_some());
    }

    #[test]
    fn test_texture_cache_caps_entry_size() {
        let cache = MazeCache::new(Duration::from_secs(60));
        cache.set_texture(
            "http://f/small.jpg",
            Texture {
                content_type: "image/jpeg".to_string(),
                bytes: Arc::new(vec![1, 2, 3]),
            },
        );
        cache.set_texture(
            "http://f/huge.jpg",
            Texture {
                content_type: "image/jpeg".to_string(),
                bytes: Arc::new(vec![0; TEXTURE_CACHE_LIMIT]),
            },
        );
        assert!(cache.get_texture("http://f/small.jpg").is_some());
        assert!(cache.get_texture("http://f/huge.jpg").is_none());
    }

    #[test]
    fn test_license_table_survives_maze_invalidation() {
        let cache = MazeCache::new(Duration::from_secs(60));
        let mut table = HashMap::new();
        table.insert(
            "4".to_string(),
            License {
                name: "CC BY 2.0".to_string(),
                url: "https://creativecommons.org/licenses/by/2.0/".to_string(),
            },
        );
        cache.set_licenses(Arc::new(table));
        cache.invalidate_maze("m1");
        assert!(cache.get_licenses().is_some());
    }
}
