// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request dispatch with a chain of retry policies.
//!
//! After each response the policies are consulted in order. The first one
//! that asks for a resend wins; the new request is then dispatched from the
//! top of the chain again. The built-in [`ReloginOnForbidden`] policy always
//! runs last.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::client::Client;
use crate::context::Context;
use crate::error::{Result, SdkError};
use crate::request::ApiRequest;
use crate::response::{Dispatched, drain};

/// Status line and headers of a received response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub url: Url,
}

impl From<&Response> for ResponseHead {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            url: response.url().clone(),
        }
    }
}

/// Per-round information handed to each policy.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// Caller context of the dispatch.
    pub ctx: &'a Context,
    /// Number of resends already performed by this dispatch.
    pub attempt: u32,
}

/// Decision of a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryAction {
    /// Discard the response and send this request instead.
    Retry(ApiRequest),
    /// No opinion; ask the next policy.
    Continue,
    /// Abort the dispatch with this error.
    Fail(SdkError),
}

/// Decides, after each response, whether a request should be resent.
///
/// Policies may issue their own calls on `client`; the dispatcher holds no
/// lock while a policy runs.
#[async_trait]
pub trait RetryPolicy: Send + Sync {
    async fn check(
        &self,
        client: &Client,
        retry: RetryContext<'_>,
        request: &ApiRequest,
        response: &ResponseHead,
    ) -> RetryAction;
}

/// Re-authenticates and resends the request on `403 Forbidden`.
///
/// Fires at most once per dispatch.
#[derive(Debug, Default)]
pub struct ReloginOnForbidden {
    fired: AtomicBool,
}

#[async_trait]
impl RetryPolicy for ReloginOnForbidden {
    async fn check(
        &self,
        client: &Client,
        retry: RetryContext<'_>,
        request: &ApiRequest,
        response: &ResponseHead,
    ) -> RetryAction {
        if response.status != StatusCode::FORBIDDEN || self.fired.swap(true, Ordering::SeqCst) {
            return RetryAction::Continue;
        }

        warn!(path = request.path(), "got 403, logging in again");
        match client.login(retry.ctx).await {
            Ok(()) => RetryAction::Retry(request.clone()),
            Err(err) => RetryAction::Fail(err),
        }
    }
}

impl Client {
    /// Send `request`, applying `policies` and then the built-in re-login
    /// policy to every response.
    ///
    /// Returns the final response unread; use [`Dispatched::read`] or
    /// [`Dispatched::discard`] to consume it.
    pub async fn dispatch(
        &self,
        ctx: &Context,
        request: ApiRequest,
        policies: &[&dyn RetryPolicy],
    ) -> Result<Dispatched> {
        let relogin = ReloginOnForbidden::default();
        let mut chain: Vec<&dyn RetryPolicy> = policies.to_vec();
        chain.push(&relogin);

        let mut current = request;
        let mut attempt: u32 = 0;

        'send: loop {
            let response = match self.send_once(ctx, &current).await {
                Ok(response) => response,
                Err(err) => {
                    current.close_body().await;
                    return Err(err);
                }
            };
            let head = ResponseHead::from(&response);

            for policy in &chain {
                if let Err(err) = current.rewind().await {
                    current.close_body().await;
                    return Err(err);
                }

                let retry = RetryContext { ctx, attempt };
                match policy.check(self, retry, &current, &head).await {
                    RetryAction::Continue => {}
                    RetryAction::Fail(err) => {
                        discard_response(ctx, response).await;
                        current.close_body().await;
                        return Err(err);
                    }
                    RetryAction::Retry(next) => {
                        discard_response(ctx, response).await;
                        if attempt >= self.config().max_resends {
                            current.close_body().await;
                            next.close_body().await;
                            return Err(SdkError::RetryLimit(attempt));
                        }
                        attempt += 1;
                        debug!(
                            attempt,
                            method = %next.method(),
                            path = next.path(),
                            "resending request"
                        );
                        if !current.shares_body_with(&next) {
                            current.close_body().await;
                        }
                        current = next;
                        continue 'send;
                    }
                }
            }

            return Ok(Dispatched {
                response,
                request: current,
                ctx: ctx.clone(),
            });
        }
    }

    /// Send a single attempt, bounded by `ctx`.
    pub(crate) async fn send_once(&self, ctx: &Context, request: &ApiRequest) -> Result<Response> {
        let http_request = request.build(self.http(), self.base_url()).await?;
        debug!(
            method = %http_request.method(),
            url = %http_request.url(),
            "sending request"
        );
        ctx.run(async {
            self.http()
                .execute(http_request)
                .await
                .map_err(SdkError::from)
        })
        .await
    }
}

async fn discard_response(ctx: &Context, response: Response) {
    if let Err(err) = drain(ctx, response).await {
        debug!(error = %err, "failed to drain discarded response");
    }
}
