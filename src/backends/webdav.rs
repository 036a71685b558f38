//! WebDAV storage (the NAS share holding uploaded originals).

use ureq::Agent;

use super::{basic_auth, join_url, upstream_error, with_userinfo, Fetched};
use crate::config::Credentials;
use crate::error::Result;

pub const SERVICE: &str = "WebDAV";

#[derive(Clone)]
pub struct WebDavClient {
    agent: Agent,
    base_url: String,
    credentials: Credentials,
}

impl WebDavClient {
    pub fn new(agent: Agent, base_url: &str, username: &str, password: &str) -> Self {
        Self {
            agent,
            base_url: base_url.to_string(),
            credentials: Credentials {
                username: username.to_string(),
                password: password.to_string(),
            },
        }
    }

    pub fn url_for(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    /// URL with the share credentials in its userinfo, for services that
    /// pull the file themselves.
    pub fn authenticated_url(&self, path: &str) -> Result<String> {
        with_userinfo(&self.url_for(path), &self.credentials)
    }

    fn authorization(&self) -> String {
        basic_auth(&self.credentials.username, &self.credentials.password)
    }

    pub fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        let url = self.url_for(path);
        tracing::debug!(url = %url, size = bytes.len(), "WebDAV PUT");

        self.agent
            .put(&url)
            .set("Authorization", &self.authorization())
            .set("Content-Type", content_type)
            .send_bytes(bytes)
            .map_err(|e| upstream_error(SERVICE, e))?;
        Ok(())
    }

    pub fn get(&self, path: &str) -> Result<Fetched> {
        let url = self.url_for(path);
        tracing::debug!(url = %url, "WebDAV GET");

        let response = self
            .agent
            .get(&url)
            .set("Authorization", &self.authorization())
            .call()
            .map_err(|e| upstream_error(SERVICE, e))?;
        Ok(Fetched::from_response(response))
    }
}
