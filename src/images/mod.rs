//! Image resolution: turn a stored `imageId` into a streamed response from
//! whichever backend holds it.

pub mod transform;

use std::fmt;
use std::io::Read;

use crate::backends::{Backends, Fetched};
use crate::error::{Error, Result};
use crate::image_ref::ImageRef;

pub use transform::ImageVariant;

/// PhotoPrism size served for originals; large enough that a 1920x1080
/// hero is downscaled.
pub const ORIGINAL_THUMB_SIZE: &str = "fit_1920";

/// PhotoPrism size used by the admin editor grid.
pub const ADMIN_THUMB_SIZE: &str = "tile_500";

const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";
const PUBLIC_CACHE: &str = "public, max-age=86400";
const PRIVATE_CACHE: &str = "private, max-age=3600";

pub struct ImageResponse {
    pub content_type: String,
    pub cache_control: &'static str,
    pub body: Box<dyn Read + Send + Sync + 'static>,
}

impl ImageResponse {
    fn from_fetched(fetched: Fetched) -> Self {
        Self {
            content_type: fetched
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            cache_control: PUBLIC_CACHE,
            body: fetched.body,
        }
    }

    /// Cache only in the requesting browser.
    pub fn into_private(mut self) -> Self {
        self.cache_control = PRIVATE_CACHE;
        self
    }
}

impl fmt::Debug for ImageResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageResponse")
            .field("content_type", &self.content_type)
            .field("cache_control", &self.cache_control)
            .finish_non_exhaustive()
    }
}

pub struct ImageResolver<'a> {
    backends: &'a Backends,
}

impl<'a> ImageResolver<'a> {
    pub fn new(backends: &'a Backends) -> Self {
        Self { backends }
    }

    pub fn resolve(&self, image_id: &str) -> Result<ImageResponse> {
        self.resolve_with_size(image_id, ORIGINAL_THUMB_SIZE)
    }

    /// Like [`resolve`](Self::resolve), with the PhotoPrism thumbnail size
    /// chosen by the caller. Other backends ignore `photoprism_size`.
    pub fn resolve_with_size(&self, image_id: &str, photoprism_size: &str) -> Result<ImageResponse> {
        let image = ImageRef::parse(image_id);
        tracing::debug!(image_id, backend = image.backend_name(), "Resolving image");

        let fetched = match image {
            ImageRef::CfImages("") | ImageRef::PhotoPrism("") => {
                return Err(Error::not_found("Not found"));
            }
            ImageRef::CfImages(cf_id) => self.backends.cf_delivery()?.fetch_delivery(cf_id, "public")?,
            ImageRef::PhotoPrism(hash) => self
                .backends
                .photoprism()?
                .fetch_thumbnail(hash, photoprism_size)?,
            ImageRef::WebDav(path) => self.backends.webdav()?.get(path)?,
        };
        Ok(ImageResponse::from_fetched(fetched))
    }
}
