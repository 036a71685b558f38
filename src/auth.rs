//! Signed session cookies.
//!
//! A token is `base64("{user_id}:{expiry_ms}")` + `.` + base64 HMAC-SHA256
//! of that payload. The key is the session secret padded with `0` or cut
//! to 32 characters.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "moments_session";

/// Seven days.
pub const SESSION_MAX_AGE_SECS: i64 = 60 * 60 * 24 * 7;

const KEY_LEN: usize = 32;

fn signing_key(secret: &str) -> Vec<u8> {
    secret
        .chars()
        .chain(std::iter::repeat('0'))
        .take(KEY_LEN)
        .collect::<String>()
        .into_bytes()
}

fn mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(&signing_key(secret))
        .map_err(|e| Error::validation(format!("invalid session secret: {}", e)))
}

pub fn create_session_token(user_id: &str, secret: &str, now: DateTime<Utc>) -> Result<String> {
    let expiry = now + Duration::seconds(SESSION_MAX_AGE_SECS);
    let payload = BASE64.encode(format!("{}:{}", user_id, expiry.timestamp_millis()));

    let mut mac = mac(secret)?;
    mac.update(payload.as_bytes());
    let signature = BASE64.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", payload, signature))
}

/// The user id of a valid, unexpired token.
pub fn verify_session_token(token: &str, secret: &str, now: DateTime<Utc>) -> Option<String> {
    let (payload, signature) = token.split_once('.')?;
    if payload.is_empty() || signature.is_empty() {
        return None;
    }

    let signature = BASE64.decode(signature).ok()?;
    let mut mac = mac(secret).ok()?;
    mac.update(payload.as_bytes());
    if mac.verify_slice(&signature).is_err() {
        tracing::debug!("Session signature mismatch");
        return None;
    }

    let decoded = String::from_utf8(BASE64.decode(payload).ok()?).ok()?;
    let (user_id, expiry) = decoded.rsplit_once(':')?;
    let expiry: i64 = expiry.parse().ok()?;
    if user_id.is_empty() || now.timestamp_millis() > expiry {
        return None;
    }
    Some(user_id.to_string())
}

/// `Set-Cookie` value for a fresh session.
pub fn session_cookie(user_id: &str, secret: &str, now: DateTime<Utc>) -> Result<String> {
    Ok(format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        create_session_token(user_id, secret, now)?,
        SESSION_MAX_AGE_SECS
    ))
}

/// User id from a request `Cookie` header, if it carries a valid session.
pub fn session_user_id(cookie_header: Option<&str>, secret: &str, now: DateTime<Utc>) -> Option<String> {
    let token = cookie_header?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)?;
    verify_session_token(token, secret, now)
}
