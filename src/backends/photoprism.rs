//! PhotoPrism library access.
//!
//! Every call logs in afresh; PhotoPrism sessions are never cached between
//! calls.

use serde::Serialize;
use serde_json::{json, Value};
use ureq::Agent;

use super::{join_url, trim_base, upstream_error, with_userinfo, Fetched};
use crate::config::Credentials;
use crate::db::ExifMeta;
use crate::error::{Error, Result};

pub const SERVICE: &str = "PhotoPrism";

/// Page size used by [`PhotoPrismClient::all_photos`].
pub const PAGE_SIZE: usize = 120;

pub const DEFAULT_THUMB_SIZE: &str = "fit_720";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoPrismAlbum {
    pub uid: String,
    pub title: String,
    pub description: String,
    pub photo_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoPrismPhoto {
    pub uid: String,
    pub hash: String,
    pub title: String,
    pub taken_at: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exif: Option<ExifMeta>,
}

#[derive(Debug, Clone)]
pub struct PhotoQuery {
    pub album_uid: Option<String>,
    pub offset: usize,
    pub count: usize,
}

impl Default for PhotoQuery {
    fn default() -> Self {
        Self {
            album_uid: None,
            offset: 0,
            count: PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhotoPage {
    pub photos: Vec<PhotoPrismPhoto>,
    pub preview_token: String,
    pub has_more: bool,
}

struct ApiResponse {
    data: Value,
    preview_token: String,
}

#[derive(Clone)]
pub struct PhotoPrismClient {
    agent: Agent,
    base_url: String,
    credentials: Credentials,
}

impl PhotoPrismClient {
    pub fn new(agent: Agent, base_url: &str, username: &str, password: &str) -> Self {
        Self {
            agent,
            base_url: trim_base(base_url).to_string(),
            credentials: Credentials {
                username: username.to_string(),
                password: password.to_string(),
            },
        }
    }

    /// Open a session and return its id.
    pub fn login(&self) -> Result<String> {
        let url = join_url(&self.base_url, "/api/v1/session");
        let response = self
            .agent
            .post(&url)
            .send_json(json!({
                "username": self.credentials.username,
                "password": self.credentials.password,
            }))
            .map_err(|e| upstream_error(SERVICE, e))?;

        let body: Value = response
            .into_json()
            .map_err(|e| Error::upstream(SERVICE, None, format!("invalid session response: {}", e)))?;
        match body.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => Err(Error::upstream(SERVICE, None, "session missing id")),
        }
    }

    fn api_get(&self, path_and_query: &str) -> Result<ApiResponse> {
        let session_id = self.login()?;
        let url = join_url(&self.base_url, path_and_query);
        tracing::debug!(url = %url, "PhotoPrism API request");

        let response = self
            .agent
            .get(&url)
            .set("Accept", "application/json")
            .set("X-Session-ID", &session_id)
            .call()
            .map_err(|e| upstream_error(SERVICE, e))?;

        let preview_token = response
            .header("X-Preview-Token")
            .filter(|t| !t.is_empty())
            .unwrap_or("public")
            .to_string();
        let data = response
            .into_json()
            .map_err(|e| Error::upstream(SERVICE, None, format!("invalid JSON: {}", e)))?;
        Ok(ApiResponse {
            data,
            preview_token,
        })
    }

    pub fn albums(&self, offset: usize, count: usize) -> Result<Vec<PhotoPrismAlbum>> {
        let response = self.api_get(&format!(
            "/api/v1/albums?count={}&offset={}&type=album&order=favorites",
            count, offset
        ))?;

        let list = match &response.data {
            Value::Array(list) => list.as_slice(),
            other => other
                .get("albums")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        };
        Ok(list.iter().map(parse_album).collect())
    }

    pub fn photos(&self, query: &PhotoQuery) -> Result<PhotoPage> {
        let mut path = format!(
            "/api/v1/photos?count={}&offset={}&merged=true&order=oldest",
            query.count, query.offset
        );
        if let Some(album_uid) = query.album_uid.as_deref().filter(|u| !u.is_empty()) {
            path.push_str("&s=");
            path.push_str(album_uid);
        }

        let response = self.api_get(&path)?;
        let photos: Vec<PhotoPrismPhoto> = response
            .data
            .as_array()
            .map(|list| list.iter().map(parse_photo).collect())
            .unwrap_or_default();

        Ok(PhotoPage {
            has_more: photos.len() >= query.count,
            photos,
            preview_token: response.preview_token,
        })
    }

    /// Every photo in the library (or one album), paging until a short page.
    pub fn all_photos(&self, album_uid: Option<&str>) -> Result<Vec<PhotoPrismPhoto>> {
        let mut query = PhotoQuery {
            album_uid: album_uid.map(str::to_string),
            ..Default::default()
        };
        let mut all = Vec::new();

        loop {
            let page = self.photos(&query)?;
            let fetched = page.photos.len();
            all.extend(page.photos);
            if !page.has_more || fetched < query.count {
                break;
            }
            query.offset += query.count;
        }

        tracing::debug!(count = all.len(), album_uid, "Fetched PhotoPrism photos");
        Ok(all)
    }

    /// Current preview token, read from a one-photo listing.
    pub fn preview_token(&self) -> Result<String> {
        let page = self.photos(&PhotoQuery {
            count: 1,
            ..Default::default()
        })?;
        Ok(page.preview_token)
    }

    pub fn thumbnail_url(&self, hash: &str, preview_token: &str, size: &str) -> String {
        format!(
            "{}/api/v1/t/{}/{}/{}",
            self.base_url, hash, preview_token, size
        )
    }

    /// Thumbnail URL carrying the account credentials, for services that
    /// fetch it themselves.
    pub fn authenticated_thumbnail_url(&self, hash: &str, size: &str) -> Result<String> {
        let token = self.preview_token()?;
        with_userinfo(&self.thumbnail_url(hash, &token, size), &self.credentials)
    }

    /// Fetch a thumbnail, retrying once with a session header when the
    /// token-only request is refused.
    pub fn fetch_thumbnail(&self, hash: &str, size: &str) -> Result<Fetched> {
        let token = self.preview_token()?;
        let url = self.thumbnail_url(hash, &token, size);

        match self.agent.get(&url).set("Accept", "image/*").call() {
            Ok(response) => return Ok(Fetched::from_response(response)),
            Err(e) => {
                tracing::debug!(hash, error = %e, "Thumbnail refused without session, retrying");
            }
        }

        let session_id = self.login()?;
        let response = self
            .agent
            .get(&url)
            .set("Accept", "image/*")
            .set("X-Session-ID", &session_id)
            .call()
            .map_err(|e| upstream_error(SERVICE, e))?;
        Ok(Fetched::from_response(response))
    }
}

/// First present key among `keys`, treating JSON null as absent.
fn pick<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find(|v| !v.is_null())
}

fn pick_str(value: &Value, keys: &[&str]) -> String {
    pick(value, keys)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn non_empty_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_album(value: &Value) -> PhotoPrismAlbum {
    PhotoPrismAlbum {
        uid: pick_str(value, &["UID", "uid"]),
        title: pick_str(value, &["Title", "title"]),
        description: pick_str(value, &["Description", "description"]),
        photo_count: pick(value, &["PhotoCount", "photo_count"])
            .and_then(Value::as_i64)
            .unwrap_or(0),
        created_at: pick_str(value, &["CreatedAt", "created_at"]),
        updated_at: pick_str(value, &["UpdatedAt", "updated_at"]),
    }
}

fn primary_hash(photo: &Value) -> String {
    let files = photo
        .get("Files")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let primary = files
        .iter()
        .find(|f| f.get("Primary").and_then(Value::as_bool) == Some(true))
        .or_else(|| files.first());

    primary
        .and_then(|f| f.get("Hash"))
        .and_then(Value::as_str)
        .or_else(|| photo.get("Hash").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn parse_exif(photo: &Value) -> Option<ExifMeta> {
    let number = |key: &str| photo.get(key).and_then(Value::as_f64);
    let whole = |key: &str| {
        photo
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    };

    let exif = ExifMeta {
        camera_make: non_empty_str(photo, "CameraMake"),
        camera_model: non_empty_str(photo, "CameraModel"),
        lens_model: non_empty_str(photo, "LensModel"),
        iso: whole("Iso"),
        focal_length: number("FocalLength"),
        f_number: number("FNumber"),
        exposure: non_empty_str(photo, "Exposure"),
        taken_at: non_empty_str(photo, "TakenAt"),
        width: whole("Width"),
        height: whole("Height"),
        lat: number("Lat"),
        lng: number("Lng"),
    };
    (!exif.is_empty()).then_some(exif)
}

fn parse_photo(value: &Value) -> PhotoPrismPhoto {
    let title = non_empty_str(value, "Title")
        .or_else(|| non_empty_str(value, "Name"))
        .unwrap_or_default();
    let dimension = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };

    PhotoPrismPhoto {
        uid: pick_str(value, &["UID"]),
        hash: primary_hash(value),
        title,
        taken_at: pick_str(value, &["TakenAt"]),
        width: dimension("Width"),
        height: dimension("Height"),
        exif: parse_exif(value),
    }
}
