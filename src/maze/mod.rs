//! Maze model: identity, password, admin key, per-service settings.

pub mod images;
pub mod store;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::services::ServiceKind;

/// Length of generated maze IDs, admin keys, and password salts.
const KEY_LENGTH: usize = 32;

/// Generate a high-entropy alphanumeric key.
pub fn random_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// Flickr settings for one maze.
///
/// `user_access` is a weak reference: the external user ID keying the
/// credential store, not the credential itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlickrSettings {
    #[serde(default)]
    pub user_access: Option<String>,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub include_recent: bool,
    #[serde(default)]
    pub include_favs: bool,
}

/// Instagram settings for one maze.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstagramSettings {
    #[serde(default)]
    pub user_access: Option<String>,
    #[serde(default)]
    pub tag: String,
    #[serde(default)]
    pub include_recent: bool,
    #[serde(default)]
    pub include_feed: bool,
}

/// Facebook settings for one maze. Linking is not routed yet; the settings
/// exist so a linked credential has somewhere to live once it is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacebookSettings {
    #[serde(default)]
    pub user_access: Option<String>,
    #[serde(default)]
    pub include_photos_of_you: bool,
}

/// A shareable photo-gallery instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Maze {
    /// Opaque, unguessable, collision-checked at creation.
    pub id: String,
    pub name: String,
    /// Salted, peppered hash; never the plaintext. None means no password.
    pub password_hash: Option<String>,
    pub hash_method: Option<String>,
    pub salt: Option<String>,
    /// Separate high-entropy secret gating admin operations.
    pub admin_key: String,
    pub admin_email: String,
    pub enable_sharing: bool,
    pub flickr: FlickrSettings,
    pub instagram: InstagramSettings,
    pub facebook: FacebookSettings,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl Maze {
    /// Set (or replace) the password. Empty passwords leave the maze open.
    pub fn set_password(&mut self, password: &str, pepper: &str) {
        if password.is_empty() {
            return;
        }
        let salt = random_key();
        self.password_hash = Some(hash_password(password, &salt, pepper));
        self.hash_method = Some("sha512".to_string());
        self.salt = Some(salt);
    }

    /// A maze without a password accepts anything.
    pub fn validate_password(&self, password: &str, pepper: &str) -> bool {
        match (&self.password_hash, &self.salt) {
            (Some(hash), Some(salt)) => &hash_password(password, salt, pepper) == hash,
            _ => true,
        }
    }

    /// The linked external user ID for a service, if any.
    pub fn user_access(&self, service: ServiceKind) -> Option<&str> {
        match service {
            ServiceKind::Flickr => self.flickr.user_access.as_deref(),
            ServiceKind::Instagram => self.instagram.user_access.as_deref(),
            ServiceKind::Facebook => self.facebook.user_access.as_deref(),
        }
    }

    /// Attach or clear the credential reference for a service.
    pub fn set_user_access(&mut self, service: ServiceKind, user_id: Option<String>) {
        match service {
            ServiceKind::Flickr => self.flickr.user_access = user_id,
            ServiceKind::Instagram => self.instagram.user_access = user_id,
            ServiceKind::Facebook => self.facebook.user_access = user_id,
        }
    }
}

fn hash_password(password: &str, salt: &str, pepper: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hasher.update(pepper.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maze() -> Maze {
        Maze {
            id: random_key(),
            name: "Test".to_string(),
            password_hash: None,
            hash_method: None,
            salt: None,
            admin_key: random_key(),
            admin_email: "a@example.com".to_string(),
            enable_sharing: false,
            flickr: FlickrSettings::default(),
            instagram: InstagramSettings::default(),
            facebook: FacebookSettings::default(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn test_random_key_shape() {
        let key = random_key();
        assert_eq!(key.len(), KEY_LENGTH);
        assert!(key.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(random_key(), random_key());
    }

    #[test]
    fn test_password_roundtrip() {
        let mut m = maze();
        m.set_password("hunter2", "pepper");
        assert!(m.validate_password("hunter2", "pepper"));
        assert!(!m.validate_password("wrong", "pepper"));
        assert!(!m.validate_password("hunter2", "other-pepper"));
        // Plaintext is never stored.
        assert_ne!(m.password_hash.as_deref(), Some("hunter2"));
        assert_eq!(m.hash_method.as_deref(), Some("sha512"));
    }

    #[test]
    fn test_no_password_accepts_anything() {
        let m = maze();
        assert!(m.validate_password("", "pepper"));
        assert!(m.validate_password("whatever", "pepper"));
    }

    #[test]
    fn test_empty_password_is_not_set() {
        let mut m = maze();
        m.set_password("", "pepper");
        assert!(m.password_hash.is_none());
    }

    #[test]
    fn test_salts_differ_per_maze() {
        let mut a = maze();
        let mut b = maze();
        a.set_password("same", "pepper");
        b.set_password("same", "pepper");
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.password_hash, b.password_hash);
    }

    #[test]
    fn test_user_access_accessors() {
        let mut m = maze();
        assert!(m.user_access(ServiceKind::Flickr).is_none());
        m.set_user_access(ServiceKind::Flickr, Some("42@N00".to_string()));
        assert_eq!(m.user_access(ServiceKind::Flickr), Some("42@N00"));
        assert!(m.user_access(ServiceKind::Instagram).is_none());
        m.set_user_access(ServiceKind::Flickr, None);
        assert!(m.user_access(ServiceKind::Flickr).is_none());
    }
}
