//! Backend-qualified image identifiers.
//!
//! An item's `image_id` is an opaque string whose prefix names the storage
//! backend that owns the bytes:
//!
//! - `photoprism:<hash>` - a PhotoPrism content hash
//! - `cf:<id>` - a Cloudflare Images asset id
//! - anything else - a literal WebDAV path relative to the share root
//!
//! Matching is purely by prefix; hashes and ids are never validated.

pub const PHOTOPRISM_PREFIX: &str = "photoprism:";
pub const CF_IMAGES_PREFIX: &str = "cf:";

pub fn is_photoprism_ref(image_id: &str) -> bool {
    image_id.starts_with(PHOTOPRISM_PREFIX)
}

pub fn to_photoprism_ref(hash: &str) -> String {
    format!("{}{}", PHOTOPRISM_PREFIX, hash)
}

pub fn from_photoprism_ref(image_id: &str) -> Option<&str> {
    image_id.strip_prefix(PHOTOPRISM_PREFIX)
}

pub fn is_cf_image_ref(image_id: &str) -> bool {
    image_id.starts_with(CF_IMAGES_PREFIX)
}

pub fn to_cf_image_ref(cf_id: &str) -> String {
    format!("{}{}", CF_IMAGES_PREFIX, cf_id)
}

pub fn from_cf_image_ref(image_id: &str) -> Option<&str> {
    image_id.strip_prefix(CF_IMAGES_PREFIX)
}

/// Typed view of an `image_id`, used wherever an id crosses a backend boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRef<'a> {
    WebDav(&'a str),
    PhotoPrism(&'a str),
    CfImages(&'a str),
}

impl<'a> ImageRef<'a> {
    pub fn parse(image_id: &'a str) -> Self {
        if let Some(cf_id) = from_cf_image_ref(image_id) {
            ImageRef::CfImages(cf_id)
        } else if let Some(hash) = from_photoprism_ref(image_id) {
            ImageRef::PhotoPrism(hash)
        } else {
            ImageRef::WebDav(image_id)
        }
    }

    pub fn to_image_id(&self) -> String {
        match self {
            ImageRef::WebDav(path) => path.to_string(),
            ImageRef::PhotoPrism(hash) => to_photoprism_ref(hash),
            ImageRef::CfImages(cf_id) => to_cf_image_ref(cf_id),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            ImageRef::WebDav(_) => "WebDAV",
            ImageRef::PhotoPrism(_) => "PhotoPrism",
            ImageRef::CfImages(_) => "Cloudflare Images",
        }
    }
}
