//! Canonical image representation shared by all photo sources.
//!
//! Every source (internal storage, Flickr, Instagram) is normalized into
//! [`Image`] before aggregation. Images are ephemeral: they are rebuilt on
//! every aggregation pass and only live in the TTL cache, never in SQLite.

pub mod normalize;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Source kind prefix inside a locator.
pub const KIND_BLOB: char = 'b';
pub const KIND_FLICKR: char = 'f';
pub const KIND_INSTAGRAM: char = 'i';

/// A single image in a maze, from any source.
///
/// Serialized field names match the wire format consumed by the maze
/// front-end: `{url, msg, attrib, eurl, lic}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    /// Opaque locator: `<kind>;<source-reference>;<size>`.
    #[serde(rename = "url")]
    pub locator: String,
    /// Caption shown inside the maze.
    #[serde(rename = "msg")]
    pub message: String,
    /// Attribution text, e.g. `'Sunset' by alice`.
    #[serde(rename = "attrib", default)]
    pub attribution: String,
    /// Permalink back to the source service.
    #[serde(rename = "eurl", default)]
    pub external_url: String,
    /// Human-readable license descriptor.
    #[serde(rename = "lic", default)]
    pub license: String,
}

impl Image {
    pub fn new(locator: String, message: String) -> Self {
        Self {
            locator,
            message,
            attribution: String::new(),
            external_url: String::new(),
            license: String::new(),
        }
    }
}

// Deduplication is defined over (locator, message) only: two images with the
// same locator and caption collapse to one even if attribution differs.
impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        self.locator == other.locator && self.message == other.message
    }
}

impl Eq for Image {}

impl Hash for Image {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.locator.hash(state);
        self.message.hash(state);
    }
}

/// Build a locator for an externally hosted image.
///
/// The source URL is base64-encoded so it survives the `;` separators. Size
/// is always 0 for external images: the resolution variant was already chosen
/// during normalization.
pub fn external_locator(kind: char, url: &str) -> String {
    format!("{};{};0", kind, BASE64.encode(url))
}

/// Build a locator for an internally stored image. The reference is a blob
/// key or a row ID, whichever backs the image.
pub fn internal_locator(reference: &str, size: u32) -> String {
    format!("{};{};{}", KIND_BLOB, reference, size)
}

/// A decoded locator, as the serving layer sees it.
#[derive(Debug, PartialEq)]
pub struct Locator {
    pub kind: char,
    pub reference: String,
    pub size: u32,
}

/// Parse a locator back into its parts.
///
/// Sizes outside [0, 1024] clamp to 1024.
pub fn parse_locator(locator: &str) -> Option<Locator> {
    let mut parts = locator.splitn(3, ';');
    let kind = parts.next()?.chars().next()?;
    let reference = parts.next()?.to_string();
    let size: i64 = parts.next()?.parse().ok()?;
    let size = if !(0..=1024).contains(&size) {
        1024
    } else {
        size as u32
    };
    Some(Locator {
        kind,
        reference,
        size,
    })
}
