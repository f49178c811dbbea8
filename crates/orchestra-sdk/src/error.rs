// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for orchestra-sdk.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type using SdkError.
pub type Result<T> = std::result::Result<T, SdkError>;

/// Errors that can occur when using the SDK.
#[derive(Debug, Error)]
pub enum SdkError {
    /// Configuration error (malformed URL, missing TLS material).
    #[error("configuration error: {0}")]
    Config(String),

    /// DNS, connect, TLS or timeout failure reported by the HTTP stack.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Login or logout was rejected.
    #[error("authentication failed [{code}]: {message}")]
    Auth { code: i64, message: String },

    /// The API answered with a status >= 400.
    #[error("api error {status} [{code}]: {message}")]
    Api {
        status: StatusCode,
        code: i64,
        message: String,
    },

    /// The response body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller's deadline elapsed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A lookup that requires a result found none.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lookup that requires exactly one result found several.
    #[error("ambiguous result: {0}")]
    Ambiguous(String),

    /// The retry chain asked for more resends than allowed.
    #[error("retry limit reached after {0} resends")]
    RetryLimit(u32),

    /// Unexpected response from server.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// I/O error while reading a request body or local file.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Another error annotated with the operation that produced it.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<SdkError>,
    },
}

impl SdkError {
    /// The innermost error, looking through `Context` wrappers.
    pub fn root(&self) -> &SdkError {
        match self {
            SdkError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Message reported by the remote API for `Auth` and `Api` errors.
    pub fn message(&self) -> Option<&str> {
        match self.root() {
            SdkError::Auth { message, .. } | SdkError::Api { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Numeric code from the error envelope for `Auth` and `Api` errors.
    pub fn api_code(&self) -> Option<i64> {
        match self.root() {
            SdkError::Auth { code, .. } | SdkError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// HTTP status of an `Api` error.
    pub fn status(&self) -> Option<StatusCode> {
        match self.root() {
            SdkError::Api { status, .. } => Some(*status),
            SdkError::Transport(err) => err.status(),
            _ => None,
        }
    }

    /// True for `NotFound` and for API errors carrying a 404 status.
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            SdkError::NotFound(_) => true,
            SdkError::Api { status, .. } => *status == StatusCode::NOT_FOUND,
            _ => false,
        }
    }

    /// True when the operation did not complete in time.
    pub fn is_timeout(&self) -> bool {
        match self.root() {
            SdkError::DeadlineExceeded => true,
            SdkError::Transport(err) => err.is_timeout(),
            _ => false,
        }
    }

    /// True when the caller's context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), SdkError::Cancelled)
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(err: serde_json::Error) -> Self {
        SdkError::Decode(err.to_string())
    }
}

impl From<url::ParseError> for SdkError {
    fn from(err: url::ParseError) -> Self {
        SdkError::Config(format!("invalid url: {}", err))
    }
}

/// Attach call-site context to errors.
pub trait ResultExt<T> {
    /// Wrap the error, if any, with the context produced by `f`.
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|source| SdkError::Context {
            context: f().into(),
            source: Box::new(source),
        })
    }
}
