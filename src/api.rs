//! Interface boundary: JSON request bodies in, status code plus JSON (or an
//! image stream) out. No web framework is assumed; a host server passes the
//! method, the raw body and the authenticated user id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::backends::Backends;
use crate::db::{Database, FocalPoint, ItemUpdate};
use crate::error::{Error, Result};
use crate::image_ref::to_photoprism_ref;
use crate::images::{ImageResolver, ImageResponse, ADMIN_THUMB_SIZE};
use crate::queue::enqueue_cf_images_upload;

/// Status code plus JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    pub status: u16,
    pub body: Value,
}

pub fn error_body(err: &Error) -> Value {
    json!({ "error": err.to_string() })
}

pub fn error_response(err: &Error) -> JsonResponse {
    let status = err.status_code();
    if status >= 500 {
        tracing::error!(status, error = %err, "Request failed");
    } else {
        tracing::debug!(status, error = %err, "Request rejected");
    }
    JsonResponse {
        status,
        body: error_body(err),
    }
}

/// 200 with the serialized value, or the error's status and `{"error"}`.
pub fn respond<T: Serialize>(result: Result<T>) -> JsonResponse {
    match result.and_then(|value| serde_json::to_value(value).map_err(Error::from)) {
        Ok(body) => JsonResponse { status: 200, body },
        Err(e) => error_response(&e),
    }
}

pub fn require_method(method: &str, allowed: &[&str]) -> Result<()> {
    if allowed.iter().any(|m| m.eq_ignore_ascii_case(method)) {
        Ok(())
    } else {
        Err(Error::MethodNotAllowed)
    }
}

pub fn parse_body<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|_| Error::validation("Invalid JSON body"))
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`).
fn explicit<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub photoprism_hash: Option<String>,
}

impl AddItemRequest {
    /// The explicit image id, or a PhotoPrism ref built from the hash.
    pub fn resolve_image_id(&self) -> Result<String> {
        let trimmed = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        trimmed(&self.image_id)
            .or_else(|| trimmed(&self.photoprism_hash).map(|h| to_photoprism_ref(&h)))
            .ok_or_else(|| Error::validation("imageId or photoprismHash is required"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[serde(default, deserialize_with = "explicit")]
    pub title: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "explicit")]
    pub crop_meta: Option<Option<BTreeMap<String, FocalPoint>>>,
}

impl From<UpdateItemRequest> for ItemUpdate {
    fn from(req: UpdateItemRequest) -> Self {
        ItemUpdate {
            title: req.title,
            description: req.description,
            // `null` clears every focal point.
            crop: req.crop_meta.map(Option::unwrap_or_default),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverRequest {
    #[serde(default)]
    pub cover_item_id: Option<String>,
}

/// `POST /api/albums/{id}/items`. Returns `{"id"}` and queues the image
/// for Cloudflare Images; a failure to queue does not fail the request.
pub fn add_item(
    db: &Database,
    backends: &Backends,
    album_id: &str,
    user_id: &str,
    method: &str,
    body: &str,
) -> Result<Value> {
    require_method(method, &["POST"])?;
    let request: AddItemRequest = parse_body(body)?;
    let image_id = request.resolve_image_id()?;

    let item_id = db.add_item_to_album(album_id, user_id, &image_id, None)?;
    if let Err(e) = enqueue_cf_images_upload(db, backends, &item_id, &image_id) {
        tracing::warn!(item_id = %item_id, error = %e, "Failed to queue Cloudflare Images upload");
    }
    Ok(json!({ "id": item_id }))
}

/// `PATCH|PUT /api/items/{id}`.
pub fn update_item(
    db: &Database,
    item_id: &str,
    user_id: &str,
    method: &str,
    body: &str,
) -> Result<Value> {
    require_method(method, &["PATCH", "PUT"])?;
    let request: UpdateItemRequest = parse_body(body)?;
    db.update_item(item_id, user_id, request.into())?;
    Ok(json!({ "ok": true }))
}

/// `PATCH|PUT /api/albums/{id}/cover`.
pub fn set_cover(
    db: &Database,
    album_id: &str,
    user_id: &str,
    method: &str,
    body: &str,
) -> Result<Value> {
    require_method(method, &["PATCH", "PUT"])?;
    let request: CoverRequest = parse_body(body)?;
    let cover = request.cover_item_id.as_deref().filter(|id| !id.is_empty());
    let album = db.set_album_cover(album_id, user_id, cover)?;
    Ok(json!({ "coverItemId": album.cover_item_id }))
}

/// Owner-only image for the album editor: PhotoPrism items at editor size,
/// cached privately.
pub fn serve_item_image_admin(
    db: &Database,
    backends: &Backends,
    item_id: &str,
    user_id: &str,
) -> Result<ImageResponse> {
    let image_id = db.item_image_id(item_id, user_id)?;
    let response = ImageResolver::new(backends).resolve_with_size(&image_id, ADMIN_THUMB_SIZE)?;
    Ok(response.into_private())
}

/// Anonymous image for items in a public album; anything else is 404.
pub fn serve_item_image_public(
    db: &Database,
    backends: &Backends,
    item_id: &str,
) -> Result<ImageResponse> {
    let image_id = db.public_item_image_id(item_id)?;
    ImageResolver::new(backends).resolve(&image_id)
}
