//! Blocking HTTP clients for the three image stores.
//!
//! All clients share one `ureq::Agent` (connection pool, redirect policy)
//! and report failures as [`Error::Upstream`] tagged with the service name.

pub mod cf_images;
pub mod photoprism;
pub mod webdav;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;
use std::io::Read;

use crate::config::{Config, Credentials};
use crate::error::{Error, Result};

pub use cf_images::{CfDelivery, CfImagesClient, DirectUpload};
pub use photoprism::{PhotoPage, PhotoPrismAlbum, PhotoPrismClient, PhotoPrismPhoto, PhotoQuery};
pub use webdav::WebDavClient;

/// Response body of a successful image fetch.
pub struct Fetched {
    pub content_type: Option<String>,
    pub body: Box<dyn Read + Send + Sync + 'static>,
}

impl Fetched {
    pub(crate) fn from_response(response: ureq::Response) -> Self {
        let content_type = response
            .header("Content-Type")
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        Self {
            content_type,
            body: response.into_reader(),
        }
    }
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetched")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Clients for every backend whose configuration is complete.
pub struct Backends {
    pub webdav: Option<WebDavClient>,
    pub photoprism: Option<PhotoPrismClient>,
    pub cf_images: Option<CfImagesClient>,
    /// Set whenever a delivery hash is, even without API credentials.
    pub cf_delivery: Option<CfDelivery>,
}

impl Backends {
    pub fn from_config(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .user_agent(concat!("moments-admin/", env!("CARGO_PKG_VERSION")))
            .build();

        let webdav = match (config.webdav_base_url(), config.webdav_credentials()) {
            (Some(base), Some(creds)) => Some(WebDavClient::new(
                agent.clone(),
                base,
                &creds.username,
                &creds.password,
            )),
            _ => None,
        };
        let photoprism = match (config.photoprism_base_url(), config.photoprism_credentials()) {
            (Some(base), Some(creds)) => Some(PhotoPrismClient::new(
                agent.clone(),
                base,
                &creds.username,
                &creds.password,
            )),
            _ => None,
        };
        let cf_delivery = CfDelivery::new(agent.clone(), &config.cf_images);
        let cf_images = CfImagesClient::new(agent, &config.cf_images);

        tracing::debug!(
            webdav = webdav.is_some(),
            photoprism = photoprism.is_some(),
            cf_images = cf_images.is_some(),
            cf_delivery = cf_delivery.is_some(),
            "Configured image backends"
        );
        Self {
            webdav,
            photoprism,
            cf_images,
            cf_delivery,
        }
    }

    pub fn webdav(&self) -> Result<&WebDavClient> {
        self.webdav.as_ref().ok_or(Error::NotConfigured(webdav::SERVICE))
    }

    pub fn photoprism(&self) -> Result<&PhotoPrismClient> {
        self.photoprism
            .as_ref()
            .ok_or(Error::NotConfigured(photoprism::SERVICE))
    }

    pub fn cf_images(&self) -> Result<&CfImagesClient> {
        self.cf_images
            .as_ref()
            .ok_or(Error::NotConfigured(cf_images::SERVICE))
    }

    pub fn cf_delivery(&self) -> Result<&CfDelivery> {
        self.cf_delivery
            .as_ref()
            .ok_or(Error::NotConfigured(cf_images::SERVICE))
    }
}

/// Map a ureq failure onto the upstream error for `service`, keeping the
/// response body text of a non-2xx status.
pub(crate) fn upstream_error(service: &'static str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            Error::upstream(service, Some(code), body.trim())
        }
        ureq::Error::Transport(transport) => Error::upstream(service, None, transport.to_string()),
    }
}

pub(crate) fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", username, password)))
}

pub(crate) fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}

/// `base` and `path` joined by exactly one slash.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", trim_base(base_url), path.trim_start_matches('/'))
}

/// Embed credentials in the URL userinfo, percent-encoded, for services
/// that fetch by URL and cannot send headers.
pub(crate) fn with_userinfo(raw_url: &str, creds: &Credentials) -> Result<String> {
    let mut url = url::Url::parse(raw_url)
        .map_err(|e| Error::validation(format!("Invalid URL {}: {}", raw_url, e)))?;
    url.set_username(&creds.username)
        .and_then(|_| url.set_password(Some(&creds.password)))
        .map_err(|_| Error::validation(format!("URL cannot carry credentials: {}", raw_url)))?;
    Ok(url.to_string())
}
