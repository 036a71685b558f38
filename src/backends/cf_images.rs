//! Cloudflare Images: upload by URL, direct creator uploads, and delivery.

use multipart::client::lazy::Multipart;
use serde::Deserialize;
use ureq::Agent;

use super::{trim_base, upstream_error, Fetched};
use crate::config::CfImagesConfig;
use crate::error::{Error, Result};

pub const SERVICE: &str = "Cloudflare Images";

/// One-time URL a browser can POST an image to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectUpload {
    pub id: String,
    pub upload_url: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectUploadResult {
    id: Option<String>,
    #[serde(rename = "uploadURL")]
    upload_url: Option<String>,
}

/// Delivery side of Cloudflare Images. Serving stored images needs only the
/// account's delivery hash, not API credentials.
#[derive(Clone)]
pub struct CfDelivery {
    agent: Agent,
    delivery_hash: String,
    delivery_base_url: String,
}

impl CfDelivery {
    /// `None` unless a delivery hash is set.
    pub fn new(agent: Agent, config: &CfImagesConfig) -> Option<Self> {
        let delivery_hash = config.delivery_hash.as_deref().filter(|h| !h.is_empty())?;
        Some(Self {
            agent,
            delivery_hash: delivery_hash.to_string(),
            delivery_base_url: trim_base(&config.delivery_base_url).to_string(),
        })
    }

    pub fn delivery_hash(&self) -> &str {
        &self.delivery_hash
    }

    pub fn delivery_url(&self, cf_id: &str, variant: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.delivery_base_url, self.delivery_hash, cf_id, variant
        )
    }

    pub fn fetch_delivery(&self, cf_id: &str, variant: &str) -> Result<Fetched> {
        let url = self.delivery_url(cf_id, variant);
        tracing::debug!(url = %url, "Cloudflare Images delivery fetch");

        let response = self
            .agent
            .get(&url)
            .set("Accept", "image/*")
            .call()
            .map_err(|e| upstream_error(SERVICE, e))?;
        Ok(Fetched::from_response(response))
    }
}

#[derive(Clone)]
pub struct CfImagesClient {
    agent: Agent,
    account_id: String,
    api_token: String,
    api_base_url: String,
    delivery: CfDelivery,
}

impl CfImagesClient {
    /// `None` unless account id, API token and delivery hash are all set.
    pub fn new(agent: Agent, config: &CfImagesConfig) -> Option<Self> {
        if !config.is_configured() {
            return None;
        }
        Some(Self {
            delivery: CfDelivery::new(agent.clone(), config)?,
            agent,
            account_id: config.account_id.clone()?,
            api_token: config.api_token.clone()?,
            api_base_url: trim_base(&config.api_base_url).to_string(),
        })
    }

    pub fn delivery(&self) -> &CfDelivery {
        &self.delivery
    }

    fn images_url(&self, version_path: &str) -> String {
        format!(
            "{}/accounts/{}/images/{}",
            self.api_base_url, self.account_id, version_path
        )
    }

    fn post_form<T: for<'de> Deserialize<'de>>(&self, url: &str, fields: &[(&str, &str)]) -> Result<T> {
        let mut form = Multipart::new();
        for (name, value) in fields {
            form.add_text(*name, *value);
        }
        let body = form
            .prepare()
            .map_err(|e| Error::upstream(SERVICE, None, format!("failed to encode form: {}", e.error)))?;
        let content_type = format!("multipart/form-data; boundary={}", body.boundary());

        let response = self
            .agent
            .post(url)
            .set("Authorization", &format!("Bearer {}", self.api_token))
            .set("Content-Type", &content_type)
            .send(body)
            .map_err(|e| upstream_error(SERVICE, e))?;

        let envelope: Envelope<T> = response
            .into_json()
            .map_err(|e| Error::upstream(SERVICE, None, format!("invalid JSON: {}", e)))?;
        if !envelope.success {
            let detail = envelope
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .filter(|m| !m.is_empty())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(Error::upstream(SERVICE, None, format!("request unsuccessful: {}", detail)));
        }
        envelope
            .result
            .ok_or_else(|| Error::upstream(SERVICE, None, "no result in response"))
    }

    /// Have Cloudflare pull the image at `source_url`; returns the new image id.
    pub fn upload_from_url(&self, source_url: &str) -> Result<String> {
        let url = self.images_url("v1");
        let result: UploadResult = self.post_form(&url, &[("url", source_url)])?;

        let id = result
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::upstream(SERVICE, None, "no id in response"))?;
        tracing::info!(cf_id = %id, "Uploaded image to Cloudflare Images");
        Ok(id)
    }

    pub fn create_direct_upload(&self) -> Result<DirectUpload> {
        let url = self.images_url("v2/direct_upload");
        let result: DirectUploadResult = self.post_form(&url, &[("requireSignedURLs", "false")])?;

        match (result.id, result.upload_url) {
            (Some(id), Some(upload_url)) if !id.is_empty() => Ok(DirectUpload { id, upload_url }),
            _ => Err(Error::upstream(SERVICE, None, "no id in response")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer) -> CfImagesClient {
        let config = CfImagesConfig {
            account_id: Some("acct".into()),
            api_token: Some("token".into()),
            delivery_hash: Some("dhash".into()),
            api_base_url: server.url("/client/v4"),
            delivery_base_url: server.url("/delivery"),
        };
        CfImagesClient::new(Agent::new(), &config).unwrap()
    }

    #[test]
    fn test_requires_all_three_settings() {
        let mut config = CfImagesConfig {
            account_id: Some("acct".into()),
            api_token: Some("token".into()),
            ..Default::default()
        };
        assert!(CfImagesClient::new(Agent::new(), &config).is_none());
        config.delivery_hash = Some(String::new());
        assert!(CfImagesClient::new(Agent::new(), &config).is_none());
        config.delivery_hash = Some("h".into());
        assert!(CfImagesClient::new(Agent::new(), &config).is_some());
    }

    #[test]
    fn test_upload_from_url_posts_multipart() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/client/v4/accounts/acct/images/v1")
                .header("Authorization", "Bearer token")
                .header_exists("Content-Type")
                .body_contains("name=\"url\"")
                .body_contains("https://nas/dav/a.jpg");
            then.status(200)
                .json_body(json!({"success": true, "result": {"id": "cf-123"}}));
        });

        let id = client(&server).upload_from_url("https://nas/dav/a.jpg").unwrap();
        assert_eq!(id, "cf-123");
        mock.assert();
    }

    #[test]
    fn test_upload_without_id_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({"success": true, "result": {}}));
        });

        let err = client(&server).upload_from_url("https://x/y.jpg").unwrap_err();
        assert!(err.to_string().contains("no id in response"));
    }

    #[test]
    fn test_upload_unsuccessful_envelope() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({
                "success": false,
                "result": null,
                "errors": [{"code": 5400, "message": "Bad request"}]
            }));
        });

        let err = client(&server).upload_from_url("https://x/y.jpg").unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("Bad request"));
    }

    #[test]
    fn test_upload_http_error_keeps_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST);
            then.status(429).body("rate limited");
        });

        let err = client(&server).upload_from_url("https://x/y.jpg").unwrap_err();
        assert!(matches!(err, Error::Upstream { status: Some(429), .. }));
    }

    #[test]
    fn test_create_direct_upload() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/client/v4/accounts/acct/images/v2/direct_upload");
            then.status(200).json_body(json!({
                "success": true,
                "result": {"id": "du-1", "uploadURL": "https://upload.example/du-1"}
            }));
        });

        let upload = client(&server).create_direct_upload().unwrap();
        assert_eq!(
            upload,
            DirectUpload {
                id: "du-1".into(),
                upload_url: "https://upload.example/du-1".into(),
            }
        );
    }

    #[test]
    fn test_fetch_delivery() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/delivery/dhash/abc123/public");
            then.status(200).header("Content-Type", "image/avif").body("img");
        });

        let fetched = client(&server)
            .delivery()
            .fetch_delivery("abc123", "public")
            .unwrap();
        assert_eq!(fetched.content_type.as_deref(), Some("image/avif"));
        mock.assert();
    }

    #[test]
    fn test_delivery_needs_only_hash() {
        let config = CfImagesConfig {
            delivery_hash: Some("dhash".into()),
            delivery_base_url: "https://cdn.example/".into(),
            ..Default::default()
        };
        assert!(CfImagesClient::new(Agent::new(), &config).is_none());
        let delivery = CfDelivery::new(Agent::new(), &config).unwrap();
        assert_eq!(delivery.delivery_hash(), "dhash");
        assert_eq!(
            delivery.delivery_url("abc", "thumbnail"),
            "https://cdn.example/dhash/abc/thumbnail"
        );

        let empty = CfImagesConfig {
            delivery_hash: Some(String::new()),
            ..Default::default()
        };
        assert!(CfDelivery::new(Agent::new(), &empty).is_none());
    }

    #[test]
    fn test_form_value_is_sent_intact() {
        let server = MockServer::start();
        let tricky = "https://nas/dav/a.jpg?x=1\r\n--boundary--";
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/client/v4/accounts/acct/images/v1")
                .body_contains("Content-Disposition: form-data; name=\"url\"")
                .body_contains(tricky);
            then.status(200)
                .json_body(json!({"success": true, "result": {"id": "cf-9"}}));
        });

        assert_eq!(client(&server).upload_from_url(tricky).unwrap(), "cf-9");
        mock.assert();
    }

    #[test]
    fn test_direct_upload_sends_signed_url_flag() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/client/v4/accounts/acct/images/v2/direct_upload")
                .body_contains("name=\"requireSignedURLs\"")
                .body_contains("false");
            then.status(200).json_body(json!({
                "success": true,
                "result": {"id": "du-2", "uploadURL": "https://upload.example/du-2"}
            }));
        });

        assert_eq!(client(&server).create_direct_upload().unwrap().id, "du-2");
        mock.assert();
    }
}
