//! Moving item images into Cloudflare Images.

use super::{CfImagesMessage, JobQueue};
use crate::backends::Backends;
use crate::db::Database;
use crate::error::Result;
use crate::image_ref::{is_cf_image_ref, to_cf_image_ref, ImageRef};
use crate::images::ORIGINAL_THUMB_SIZE;

/// Queue a copy of `image_id` into Cloudflare Images. Returns false, and
/// queues nothing, when the image is already there or the feature is off.
pub fn enqueue_cf_images_upload<Q>(
    queue: &Q,
    backends: &Backends,
    item_id: &str,
    image_id: &str,
) -> Result<bool>
where
    Q: JobQueue + ?Sized,
{
    if is_cf_image_ref(image_id) || backends.cf_images.is_none() {
        return Ok(false);
    }
    queue.send(&CfImagesMessage {
        item_id: item_id.to_string(),
        image_id: image_id.to_string(),
    })?;
    Ok(true)
}

/// URL Cloudflare can pull the image from, credentials included.
/// `None` when the owning backend is not configured or the image is
/// already in Cloudflare.
pub fn source_url_for_upload(backends: &Backends, image_id: &str) -> Result<Option<String>> {
    match ImageRef::parse(image_id) {
        ImageRef::CfImages(_) => Ok(None),
        ImageRef::PhotoPrism(hash) => match &backends.photoprism {
            Some(photoprism) if !hash.is_empty() => photoprism
                .authenticated_thumbnail_url(hash, ORIGINAL_THUMB_SIZE)
                .map(Some),
            _ => Ok(None),
        },
        ImageRef::WebDav(path) => match &backends.webdav {
            Some(webdav) => webdav.authenticated_url(path).map(Some),
            None => Ok(None),
        },
    }
}

/// Handle one queued upload. `Ok` means the message is settled (including
/// every case where there is nothing to do); `Err` means try again later.
pub fn process_cf_images_upload(
    db: &Database,
    backends: &Backends,
    message: &CfImagesMessage,
) -> Result<()> {
    let CfImagesMessage { item_id, image_id } = message;
    if item_id.is_empty() || image_id.is_empty() || is_cf_image_ref(image_id) {
        return Ok(());
    }
    let Some(cf_images) = backends.cf_images.as_ref() else {
        tracing::debug!(item_id = %item_id, "Cloudflare Images not configured, dropping upload");
        return Ok(());
    };

    if db.live_item_image_id(item_id)?.as_deref() != Some(image_id.as_str()) {
        tracing::info!(item_id = %item_id, image_id = %image_id, "Item deleted or image changed, skipping upload");
        return Ok(());
    }

    let Some(source_url) = source_url_for_upload(backends, image_id)? else {
        tracing::warn!(item_id = %item_id, image_id = %image_id, "No source backend for image, skipping upload");
        return Ok(());
    };

    let cf_id = cf_images.upload_from_url(&source_url)?;
    let new_image_id = to_cf_image_ref(&cf_id);

    if db.replace_item_image(item_id, image_id, &new_image_id)? {
        tracing::info!(item_id = %item_id, image_id = %new_image_id, "Item image moved to Cloudflare Images");
    } else {
        tracing::info!(item_id = %item_id, cf_id = %cf_id, "Item changed during upload, keeping current image");
    }
    Ok(())
}
