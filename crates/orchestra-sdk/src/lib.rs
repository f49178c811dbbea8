// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Orchestra SDK
//!
//! Client SDK for the orchestration platform's REST API.
//!
//! The [`Client`] logs in with a form post, keeps the session cookie, and
//! sends JSON requests under `/rest/latest`. Every response is an envelope
//! `{"data": ..., "error": {"code", "message"}}`; the SDK unwraps `data`
//! and turns `error` into [`SdkError::Api`].
//!
//! # Architecture
//!
//! - Session: login/logout, cookie jar, TLS trust configuration
//! - Requests: [`ApiRequest`] with bodies that can be replayed on a resend
//! - Dispatch: caller [`RetryPolicy`] chain plus a built-in re-login on `403`
//! - Workflows: trigger, then poll the execution until a terminal status
//! - Topology editing: [`TopologyEditor`] sessions
//!
//! Every network call takes a [`Context`] carrying cancellation and an
//! optional deadline.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use orchestra_sdk::{Client, Context, SdkConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(SdkConfig::new("http://127.0.0.1:8088", "admin", "admin"))?;
//! let ctx = Context::background();
//!
//! client.login(&ctx).await?;
//!
//! let app = client.get_application_by_name(&ctx, "shop").await?;
//! let env_id = client.get_environment_id(&ctx, &app.id, "Environment").await?;
//!
//! let execution = client
//!     .run_workflow_and_wait(&ctx, &app.id, &env_id, "install", Some(Duration::from_secs(600)))
//!     .await?;
//! println!("workflow finished: {:?}", execution.status);
//!
//! client.logout(&ctx).await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod context;
mod dispatch;
mod editor;
mod error;
mod request;
mod response;
mod session;
mod types;
mod workflow;

pub use client::Client;
pub use config::SdkConfig;
pub use context::Context;
pub use dispatch::{ReloginOnForbidden, ResponseHead, RetryAction, RetryContext, RetryPolicy};
pub use editor::{AppliedOperation, EditorOperation, TopologyEditor, TopologyState};
pub use error::{Result, ResultExt, SdkError};
pub use request::{ApiRequest, MultipartBody, ReaderBody, RequestBody, SeekableSource};
pub use response::{Dispatched, Envelope, ErrorInfo, api_error, decode_envelope};
pub use session::CookieJar;
pub use types::{
    Application, ApplicationEnvironment, ArchiveUploadResult, CreateApplicationOptions,
    CreateGroupOptions, CreateUserOptions, Deployment, DeploymentEvent, DeploymentStatus,
    Execution, ExecutionQuery, ExecutionStatus, Group, InstanceInformation, LogEntry, LogFilter,
    NodeInstanceStates, SearchRequest, SearchResult, Tag, User,
};
pub use workflow::{ExecutionTarget, PollSettings};

pub use reqwest::{Method, StatusCode, header};
