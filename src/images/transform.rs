//! URL builders for resized image delivery. Everything here is pure.

use std::fmt;
use std::str::FromStr;

use crate::backends::trim_base;
use crate::db::{FocalPoint, ItemMeta};
use crate::image_ref::from_cf_image_ref;

pub const CF_IMAGES_DELIVERY_BASE: &str = "https://imagedelivery.net";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageVariant {
    Thumb,
    Grid,
    Hero,
}

impl ImageVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageVariant::Thumb => "thumb",
            ImageVariant::Grid => "grid",
            ImageVariant::Hero => "hero",
        }
    }

    /// Resize options for `/cdn-cgi/image/`.
    fn options(&self) -> &'static str {
        match self {
            ImageVariant::Thumb => "width=500,height=500,fit=cover,quality=85",
            ImageVariant::Grid => "width=720,height=720,fit=inside,quality=85",
            ImageVariant::Hero => "width=1920,height=1080,fit=cover,quality=85",
        }
    }

    /// Only cover-fit variants crop, so only they take a focal point.
    fn uses_gravity(&self) -> bool {
        matches!(self, ImageVariant::Thumb | ImageVariant::Hero)
    }

    /// Named variant configured on the Cloudflare Images account.
    pub fn delivery_variant(&self) -> &'static str {
        match self {
            ImageVariant::Thumb => "thumbnail",
            ImageVariant::Grid | ImageVariant::Hero => "public",
        }
    }
}

impl fmt::Display for ImageVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thumb" => Ok(ImageVariant::Thumb),
            "grid" => Ok(ImageVariant::Grid),
            "hero" => Ok(ImageVariant::Hero),
            other => Err(format!("Unknown image variant: {}", other)),
        }
    }
}

fn gravity_coord(value: f64) -> f64 {
    let clamped = if value.is_nan() { 0.5 } else { value.clamp(0.0, 1.0) };
    (clamped * 100.0).round() / 100.0
}

/// CDN transformation URL: `{origin}/cdn-cgi/image/{options}/{source_url}`.
pub fn cf_image_url(
    origin: &str,
    source_url: &str,
    variant: ImageVariant,
    gravity: Option<FocalPoint>,
) -> String {
    let mut options = variant.options().to_string();
    if let Some(point) = gravity.filter(|_| variant.uses_gravity()) {
        options.push_str(&format!(
            ",gravity={},{}",
            gravity_coord(point.x),
            gravity_coord(point.y)
        ));
    }
    format!("{}/cdn-cgi/image/{}/{}", trim_base(origin), options, source_url)
}

/// Direct delivery URL for `cf:` ids; `None` for every other backend.
pub fn cf_images_delivery_url(
    image_id: &str,
    delivery_hash: &str,
    variant: ImageVariant,
) -> Option<String> {
    let cf_id = from_cf_image_ref(image_id)?;
    Some(format!(
        "{}/{}/{}/{}",
        CF_IMAGES_DELIVERY_BASE,
        delivery_hash,
        cf_id,
        variant.delivery_variant()
    ))
}

/// Unauthenticated original served for items in public albums.
pub fn public_item_image_url(admin_base_url: &str, item_id: &str) -> String {
    format!("{}/api/public/items/{}/image", trim_base(admin_base_url), item_id)
}

/// Owner-only original, relative to the admin app.
pub fn admin_item_image_path(item_id: &str) -> String {
    format!("/api/items/{}/image", item_id)
}

/// Gallery URL for an item in a public album, cropped around the focal
/// point stored for `variant`.
pub fn item_image_url(
    admin_base_url: &str,
    item_id: &str,
    image_id: &str,
    meta: &ItemMeta,
    delivery_hash: Option<&str>,
    variant: ImageVariant,
) -> String {
    if let Some(url) = delivery_hash.and_then(|h| cf_images_delivery_url(image_id, h, variant)) {
        return url;
    }
    cf_image_url(
        admin_base_url,
        &public_item_image_url(admin_base_url, item_id),
        variant,
        meta.focal_point(variant.as_str()),
    )
}

/// Thumbnail shown in the album editor. Private albums cannot go through
/// the CDN and fall back to the authenticated route.
pub fn admin_thumbnail_url(
    admin_base_url: &str,
    item_id: &str,
    image_id: &str,
    album_is_public: bool,
    delivery_hash: Option<&str>,
) -> String {
    if let Some(url) =
        delivery_hash.and_then(|h| cf_images_delivery_url(image_id, h, ImageVariant::Thumb))
    {
        return url;
    }
    if album_is_public {
        cf_image_url(
            admin_base_url,
            &public_item_image_url(admin_base_url, item_id),
            ImageVariant::Thumb,
            None,
        )
    } else {
        admin_item_image_path(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://admin.example.com/";

    #[test]
    fn test_variant_options() {
        assert_eq!(
            cf_image_url(ORIGIN, "https://src/a.jpg", ImageVariant::Grid, None),
            "https://admin.example.com/cdn-cgi/image/width=720,height=720,fit=inside,quality=85/https://src/a.jpg"
        );
        assert_eq!(
            cf_image_url(ORIGIN, "s", ImageVariant::Hero, None),
            "https://admin.example.com/cdn-cgi/image/width=1920,height=1080,fit=cover,quality=85/s"
        );
    }

    #[test]
    fn test_gravity_only_changes_gravity_clause() {
        let a = cf_image_url(ORIGIN, "s", ImageVariant::Thumb, Some(FocalPoint::new(0.25, 0.75)));
        let b = cf_image_url(ORIGIN, "s", ImageVariant::Thumb, Some(FocalPoint::new(0.6, 0.1)));
        assert_eq!(
            a,
            "https://admin.example.com/cdn-cgi/image/width=500,height=500,fit=cover,quality=85,gravity=0.25,0.75/s"
        );
        assert_eq!(a.replace("gravity=0.25,0.75", "gravity=0.6,0.1"), b);
        // Same inputs, same output.
        assert_eq!(
            a,
            cf_image_url(ORIGIN, "s", ImageVariant::Thumb, Some(FocalPoint::new(0.25, 0.75)))
        );
    }

    #[test]
    fn test_gravity_ignored_for_grid() {
        assert_eq!(
            cf_image_url(ORIGIN, "s", ImageVariant::Grid, Some(FocalPoint::new(0.1, 0.1))),
            cf_image_url(ORIGIN, "s", ImageVariant::Grid, None)
        );
    }

    #[test]
    fn test_gravity_clamped_and_rounded() {
        let url = cf_image_url(ORIGIN, "s", ImageVariant::Hero, Some(FocalPoint::new(-0.2, 0.33333)));
        assert!(url.contains(",gravity=0,0.33/"));
        let url = cf_image_url(ORIGIN, "s", ImageVariant::Hero, Some(FocalPoint::new(1.7, 0.999)));
        assert!(url.contains(",gravity=1,1/"));
    }

    #[test]
    fn test_delivery_url_only_for_cf_ids() {
        assert_eq!(
            cf_images_delivery_url("cf:abc123", "hash", ImageVariant::Thumb).as_deref(),
            Some("https://imagedelivery.net/hash/abc123/thumbnail")
        );
        assert_eq!(
            cf_images_delivery_url("cf:abc123", "hash", ImageVariant::Hero).as_deref(),
            Some("https://imagedelivery.net/hash/abc123/public")
        );
        assert_eq!(cf_images_delivery_url("photoprism:abc", "hash", ImageVariant::Thumb), None);
        assert_eq!(cf_images_delivery_url("2024/a.jpg", "hash", ImageVariant::Thumb), None);
    }

    #[test]
    fn test_item_image_url_uses_crop() {
        let meta = ItemMeta::parse(Some(r#"{"crop":{"hero":{"x":0.2,"y":0.4}}}"#)).unwrap();
        let url = item_image_url(ORIGIN, "item-1", "a/b.jpg", &meta, Some("h"), ImageVariant::Hero);
        assert_eq!(
            url,
            "https://admin.example.com/cdn-cgi/image/width=1920,height=1080,fit=cover,quality=85,gravity=0.2,0.4/https://admin.example.com/api/public/items/item-1/image"
        );

        let url = item_image_url(ORIGIN, "item-1", "a/b.jpg", &meta, None, ImageVariant::Thumb);
        assert!(!url.contains("gravity"));
    }

    #[test]
    fn test_item_image_url_prefers_delivery_for_cf() {
        let url = item_image_url(
            ORIGIN,
            "item-1",
            "cf:xyz",
            &ItemMeta::default(),
            Some("h"),
            ImageVariant::Grid,
        );
        assert_eq!(url, "https://imagedelivery.net/h/xyz/public");
    }

    #[test]
    fn test_admin_thumbnail_url() {
        assert_eq!(admin_thumbnail_url(ORIGIN, "i1", "a.jpg", false, Some("h")), "/api/items/i1/image");
        assert!(admin_thumbnail_url(ORIGIN, "i1", "a.jpg", true, None)
            .ends_with("/https://admin.example.com/api/public/items/i1/image"));
        assert_eq!(
            admin_thumbnail_url(ORIGIN, "i1", "cf:z", false, Some("h")),
            "https://imagedelivery.net/h/z/thumbnail"
        );
    }

    #[test]
    fn test_variant_from_str() {
        assert_eq!("hero".parse::<ImageVariant>(), Ok(ImageVariant::Hero));
        assert!("banner".parse::<ImageVariant>().is_err());
    }
}
