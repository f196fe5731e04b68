//! Pure per-source normalizers into the canonical [`Image`] shape.

use std::collections::HashMap;

use crate::cache::License;
use crate::images::{external_locator, internal_locator, Image, KIND_FLICKR, KIND_INSTAGRAM};
use crate::services::flickr::api::FlickrPhoto;
use crate::services::instagram::InstagramMedia;

const FLICKR_PHOTO_URL: &str = "https://www.flickr.com/photos";

/// Trim, optionally strip inner whitespace, and truncate a search input to
/// 100 characters.
pub fn prepare_search(input: &str, remove_whitespace: bool) -> String {
    let mut s = input.trim().to_string();
    if remove_whitespace {
        s.retain(|c| !c.is_whitespace());
    }
    s.chars().take(100).collect()
}

/// Normalize a comma-separated tag list: trim around every comma.
pub fn prepare_tags(tags: &str) -> String {
    prepare_search(tags, false)
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join(",")
}

/// Select the best-fit size variant and build an [`Image`] per Flickr photo.
///
/// Target >= 1024 prefers the large variant, 512..1024 the medium, anything
/// below the small, falling down the chain when the preferred variant is
/// absent. Photos with no usable variant are skipped.
pub fn flickr_photos(
    photos: &[FlickrPhoto],
    size: u32,
    licenses: &HashMap<String, License>,
) -> Vec<Image> {
    let mut images = Vec::new();
    for photo in photos {
        let mut url = None;
        if size >= 1024 {
            url = photo.url_l.as_deref();
        }
        if url.is_none() || (512..1024).contains(&size) {
            url = photo.url_z.as_deref();
        }
        if url.is_none() || size < 512 {
            url = photo.url_s.as_deref();
        }
        let Some(url) = url else { continue };

        let owner_name = photo
            .ownername
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&photo.owner);
        let license = photo
            .license
            .as_deref()
            .and_then(|id| licenses.get(id))
            .map(|l| l.name.clone())
            .unwrap_or_default();

        let mut image = Image::new(
            external_locator(KIND_FLICKR, url),
            photo.title.clone(),
        );
        image.attribution = format!("'{}' by {}", photo.title, owner_name);
        image.external_url = format!("{}/{}/{}", FLICKR_PHOTO_URL, photo.owner, photo.id);
        image.license = license;
        images.push(image);
    }
    images
}

/// Normalize Instagram media records. Only `image` media are included;
/// target sizes below 512 select the low-resolution variant.
pub fn instagram_media(media: &[InstagramMedia], size: u32) -> Vec<Image> {
    let mut images = Vec::new();
    for item in media {
        if item.media_type != "image" {
            continue;
        }
        let Some(variants) = &item.images else {
            continue;
        };
        let url = if size < 512 {
            variants
                .low_resolution
                .as_ref()
                .or(variants.standard_resolution.as_ref())
        } else {
            variants.standard_resolution.as_ref()
        };
        let Some(url) = url else { continue };

        let message = item
            .caption
            .as_ref()
            .map(|c| c.text.clone())
            .unwrap_or_default();
        images.push(Image::new(
            external_locator(KIND_INSTAGRAM, &url.url),
            message,
        ));
    }
    images
}

/// Bucket a requested display size into the responsive breakpoints served
/// for internal images.
pub fn internal_size_bucket(size: u32) -> u32 {
    if size < 768 {
        256
    } else if size < 992 {
        512
    } else {
        1024
    }
}

/// Build an [`Image`] for an internally stored row. No network fetch happens
/// here; resolution is deferred to the serving layer.
pub fn internal_image(reference: &str, message: &str, size: u32) -> Image {
    Image::new(
        internal_locator(reference, internal_size_bucket(size)),
        message.to_string(),
    )
}
