//! Error taxonomy shared by the data-access, backend and resolution layers.
//!
//! Every variant maps onto one HTTP status so the interface boundary can
//! translate a failure without inspecting messages.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Required backend credentials or base URL are missing.
    #[error("{0} not configured")]
    NotConfigured(&'static str),

    /// No matching owned row, or the item has no image attached.
    #[error("{0}")]
    NotFound(String),

    /// Non-2xx or malformed response from an external service.
    #[error("{}", upstream_message(service, *status, message))]
    Upstream {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn upstream_message(service: &str, status: Option<u16>, message: &str) -> String {
    match (status, message.is_empty()) {
        (Some(code), false) => format!("{} request failed: {} {}", service, code, message),
        (Some(code), true) => format!("{} request failed: {}", service, code),
        (None, _) => format!("{} request failed: {}", service, message),
    }
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn upstream(service: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Upstream {
            service,
            status,
            message: message.into(),
        }
    }

    /// HTTP status the interface boundary reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotConfigured(_) => 500,
            Error::NotFound(_) => 404,
            Error::Upstream { .. } => 502,
            Error::Validation(_) => 400,
            Error::Unauthorized => 401,
            Error::MethodNotAllowed => 405,
            Error::Database(_) | Error::Json(_) | Error::Io(_) => 500,
        }
    }

    /// True for a unique/primary key violation reported by SQLite.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Error::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}
