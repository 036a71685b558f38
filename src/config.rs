use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Public origin of the admin app, used for gallery image URLs and as the
    /// CDN transform origin.
    #[serde(default = "default_admin_base_url")]
    pub admin_base_url: String,

    #[serde(default)]
    pub webdav: WebDavConfig,

    #[serde(default)]
    pub photoprism: PhotoPrismConfig,

    #[serde(default)]
    pub cf_images: CfImagesConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WebDavConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// PhotoPrism shares the WebDAV credentials unless its own are set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PhotoPrismConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfImagesConfig {
    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default)]
    pub api_token: Option<String>,

    #[serde(default)]
    pub delivery_hash: Option<String>,

    #[serde(default = "default_cf_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_cf_delivery_base_url")]
    pub delivery_base_url: String,
}

fn default_cf_api_base_url() -> String {
    "https://api.cloudflare.com/client/v4".to_string()
}

fn default_cf_delivery_base_url() -> String {
    "https://imagedelivery.net".to_string()
}

impl Default for CfImagesConfig {
    fn default() -> Self {
        Self {
            account_id: None,
            api_token: None,
            delivery_hash: None,
            api_base_url: default_cf_api_base_url(),
            delivery_base_url: default_cf_delivery_base_url(),
        }
    }
}

impl CfImagesConfig {
    /// Upload and delivery both need all three values.
    pub fn is_configured(&self) -> bool {
        non_empty(&self.account_id).is_some()
            && non_empty(&self.api_token).is_some()
            && non_empty(&self.delivery_hash).is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_secret")]
    pub secret: String,
}

fn default_session_secret() -> String {
    "dev-secret-change-in-production".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: default_session_secret(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between queue polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Jobs claimed per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Deliveries before a job is dead-lettered.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential retry backoff.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_batch_size() -> usize {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_base_secs() -> u64 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_base_secs: default_retry_base_secs(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moments")
        .join("moments.db")
}

fn default_admin_base_url() -> String {
    "http://localhost:5173".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            admin_base_url: default_admin_base_url(),
            webdav: WebDavConfig::default(),
            photoprism: PhotoPrismConfig::default(),
            cf_images: CfImagesConfig::default(),
            session: SessionConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Basic-auth credentials resolved for one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl Config {
    /// Load from `MOMENTS_CONFIG` or the default location, then apply
    /// environment overrides. A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("MOMENTS_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::config_path());
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("moments")
    }

    fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Override file values with deployment environment variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let set = |slot: &mut Option<String>, key: &str| {
            if let Some(value) = lookup(key) {
                *slot = Some(value);
            }
        };
        set(&mut self.webdav.base_url, "WEBDAV_BASE_URL");
        set(&mut self.webdav.username, "WEBDAV_USERNAME");
        set(&mut self.webdav.password, "WEBDAV_PASSWORD");
        set(&mut self.photoprism.base_url, "PHOTOPRISM_BASE_URL");
        set(&mut self.photoprism.username, "PHOTOPRISM_USERNAME");
        set(&mut self.photoprism.password, "PHOTOPRISM_PASSWORD");
        set(&mut self.cf_images.account_id, "CF_IMAGES_ACCOUNT_ID");
        set(&mut self.cf_images.api_token, "CF_IMAGES_API_TOKEN");
        set(&mut self.cf_images.delivery_hash, "CF_IMAGES_DELIVERY_HASH");

        if let Some(url) = lookup("ADMIN_BASE_URL") {
            self.admin_base_url = url;
        }
        if let Some(secret) = lookup("SESSION_SECRET") {
            self.session.secret = secret;
        }
        if let Some(path) = lookup("MOMENTS_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
    }

    pub fn webdav_credentials(&self) -> Option<Credentials> {
        Some(Credentials {
            username: non_empty(&self.webdav.username)?.to_string(),
            password: non_empty(&self.webdav.password)?.to_string(),
        })
    }

    pub fn photoprism_credentials(&self) -> Option<Credentials> {
        match (non_empty(&self.photoprism.username), non_empty(&self.photoprism.password)) {
            (Some(username), Some(password)) => Some(Credentials {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => self.webdav_credentials(),
        }
    }

    pub fn webdav_base_url(&self) -> Option<&str> {
        non_empty(&self.webdav.base_url)
    }

    pub fn photoprism_base_url(&self) -> Option<&str> {
        non_empty(&self.photoprism.base_url)
    }
}
