// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response envelope decoding.
//!
//! Every endpoint wraps its payload as `{"data": ..., "error": {"code", "message"}}`.
//! Bodies are always read to the end before interpretation so the connection
//! returns to the pool, whatever the outcome.

use bytes::Bytes;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::Context;
use crate::error::{Result, SdkError};
use crate::request::ApiRequest;

/// The `{data, error}` wrapper used by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// The `error` member of an [`Envelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorInfo>,
}

/// Decode a fully-read body.
///
/// A status >= 400 yields the envelope's error. Otherwise the `data` member
/// is decoded, `None` when absent or the body is empty.
pub fn decode_envelope<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Result<Option<T>> {
    if status.as_u16() >= 400 {
        return Err(api_error(status, body));
    }
    if is_blank(body) {
        return Ok(None);
    }
    let envelope: Envelope<T> = serde_json::from_slice(body)
        .map_err(|e| SdkError::Decode(format!("invalid response body (status {}): {}", status, e)))?;
    Ok(envelope.data)
}

/// Convert an error body into [`SdkError::Api`].
pub fn api_error(status: StatusCode, body: &[u8]) -> SdkError {
    match parse_error_info(status, body) {
        Ok(info) => SdkError::Api {
            status,
            code: info.code,
            message: info.message,
        },
        Err(err) => err,
    }
}

/// Convert a rejected login/logout body into [`SdkError::Auth`].
pub(crate) fn auth_error(status: StatusCode, body: &[u8]) -> SdkError {
    match parse_error_info(status, body) {
        Ok(info) => SdkError::Auth {
            code: info.code,
            message: info.message,
        },
        Err(err) => err,
    }
}

fn parse_error_info(status: StatusCode, body: &[u8]) -> Result<ErrorInfo> {
    let fallback = || ErrorInfo {
        code: i64::from(status.as_u16()),
        message: status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    if is_blank(body) {
        return Ok(fallback());
    }
    let envelope: ErrorEnvelope = serde_json::from_slice(body)
        .map_err(|e| SdkError::Decode(format!("invalid error body (status {}): {}", status, e)))?;
    Ok(envelope.error.unwrap_or_else(fallback))
}

fn is_blank(body: &[u8]) -> bool {
    body.iter().all(u8::is_ascii_whitespace)
}

/// Drain and close `response`, returning its status and body.
///
/// The read is bounded by `ctx` like the send that produced the response.
pub(crate) async fn drain(ctx: &Context, response: Response) -> Result<(StatusCode, Bytes)> {
    let status = response.status();
    let body = ctx
        .run(async move { response.bytes().await.map_err(SdkError::from) })
        .await?;
    debug!(status = %status, bytes = body.len(), "response drained");
    Ok((status, body))
}

/// The final response of a dispatch, together with the request that produced it.
///
/// Every reader consumes the body in full and then closes the request's
/// reader body, if it has one.
#[derive(Debug)]
pub struct Dispatched {
    pub(crate) response: Response,
    pub(crate) request: ApiRequest,
    pub(crate) ctx: Context,
}

impl Dispatched {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// The request that was last sent (after any retries).
    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Read the body and its status without interpreting it.
    pub async fn bytes(self) -> Result<(StatusCode, Bytes)> {
        let Dispatched {
            response,
            request,
            ctx,
        } = self;
        let drained = drain(&ctx, response).await;
        request.close_body().await;
        drained
    }

    /// Decode the envelope's `data` member, `None` if absent.
    pub async fn read<T: DeserializeOwned>(self) -> Result<Option<T>> {
        let (status, body) = self.bytes().await?;
        decode_envelope(status, &body)
    }

    /// Decode the envelope's `data` member, which must be present.
    pub async fn read_data<T: DeserializeOwned>(self) -> Result<T> {
        self.read()
            .await?
            .ok_or_else(|| SdkError::UnexpectedResponse("response carried no data".to_string()))
    }

    /// Read and discard the body, failing only on an error status.
    pub async fn discard(self) -> Result<()> {
        let (status, body) = self.bytes().await?;
        if status.as_u16() >= 400 {
            return Err(api_error(status, &body));
        }
        Ok(())
    }
}
