// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the orchestration platform's REST API.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONNECTION, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::SdkConfig;
use crate::context::Context;
use crate::error::{Result, ResultExt, SdkError};
use crate::request::{ApiRequest, MultipartBody, RequestBody};
use crate::response::{Dispatched, auth_error, drain};
use crate::session::{CookieJar, build_http_client};
use crate::types::{
    Application, ApplicationEnvironment, ArchiveUploadResult, CreateApplicationOptions,
    CreateGroupOptions, CreateUserOptions, Deployment, DeploymentEvent, DeploymentStatus, Group,
    LogEntry, LogFilter, NodeInstanceStates, SearchRequest, SearchResult, User,
};

const REST: &str = "/rest/latest";

/// High-level client for the platform's REST API.
///
/// Holds one authenticated session: the HTTP transport, its cookie jar and
/// the configuration. Cloning is cheap and clones share the session, so a
/// client can be handed to several tasks at once.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: reqwest::Client,
    base_url: Url,
    config: SdkConfig,
    cookies: Arc<CookieJar>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url.as_str())
            .field("username", &self.inner.config.username)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Create a client with the given configuration.
    ///
    /// Fails with [`SdkError::Config`] on a malformed base URL or missing TLS
    /// material. No request is sent; call [`Client::login`] to open a session.
    pub fn new(config: SdkConfig) -> Result<Self> {
        let base_url = config.validate()?;
        let cookies = Arc::new(CookieJar::new());
        let http = build_http_client(&config, &base_url, cookies.clone())?;

        debug!(base_url = %base_url, "client created");

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                config,
                cookies,
            }),
        })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        let config = SdkConfig::from_env()?;
        Self::new(config)
    }

    /// Create a client for localhost development.
    pub fn localhost() -> Result<Self> {
        Self::new(SdkConfig::localhost())
    }

    pub fn config(&self) -> &SdkConfig {
        &self.inner.config
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Session cookies collected so far.
    pub fn cookies(&self) -> &CookieJar {
        &self.inner.cookies
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    // =========================================================================
    // Session
    // =========================================================================

    /// Open a session with the configured credentials.
    ///
    /// The session cookie returned by the server is kept in the client's jar
    /// and sent with every later request.
    #[instrument(skip(self, ctx), fields(username = %self.inner.config.username))]
    pub async fn login(&self, ctx: &Context) -> Result<()> {
        let config = &self.inner.config;
        let request = ApiRequest::post("/login").form(&[
            ("username", config.username.as_str()),
            ("password", config.password.as_str()),
            ("submit", "Login"),
        ]);

        self.send_session_request(ctx, &request)
            .await
            .with_context(|| format!("login as {}", config.username))?;

        info!("Logged in");
        Ok(())
    }

    /// Close the session and ask the server to drop the connection.
    #[instrument(skip(self, ctx))]
    pub async fn logout(&self, ctx: &Context) -> Result<()> {
        let request =
            ApiRequest::post("/logout").header(CONNECTION, HeaderValue::from_static("close"));

        self.send_session_request(ctx, &request)
            .await
            .with_context(|| "logout")?;

        self.inner.cookies.clear();
        info!("Logged out");
        Ok(())
    }

    /// Send a login/logout request outside the retry chain; anything but
    /// `200 OK` is an [`SdkError::Auth`].
    async fn send_session_request(&self, ctx: &Context, request: &ApiRequest) -> Result<()> {
        let response = self.send_once(ctx, request).await?;
        let (status, body) = drain(ctx, response).await?;
        if status != StatusCode::OK {
            return Err(auth_error(status, &body));
        }
        Ok(())
    }

    // =========================================================================
    // Request helpers
    // =========================================================================

    /// Dispatch `request` with only the built-in retry policy.
    pub async fn execute(&self, ctx: &Context, request: ApiRequest) -> Result<Dispatched> {
        self.dispatch(ctx, request, &[]).await
    }

    /// Dispatch `request` and decode the envelope's `data`.
    ///
    /// Callers attach their context to the whole result, so dispatch and
    /// read failures carry the same annotation.
    pub(crate) async fn fetch<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        request: ApiRequest,
    ) -> Result<Option<T>> {
        self.execute(ctx, request).await?.read().await
    }

    /// Dispatch `request` and discard the body, failing on an error status.
    pub(crate) async fn send_discard(&self, ctx: &Context, request: ApiRequest) -> Result<()> {
        self.execute(ctx, request).await?.discard().await
    }

    /// GET `path` and decode the envelope's `data`.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        path: &str,
    ) -> Result<Option<T>> {
        self.fetch(ctx, ApiRequest::get(path))
            .await
            .with_context(|| format!("GET {}", path))
    }

    /// POST the JSON encoding of `body` to `path` and decode the envelope's `data`.
    pub async fn post_json<B, T>(&self, ctx: &Context, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).json(body)?;
        self.fetch(ctx, request)
            .await
            .with_context(|| format!("POST {}", path))
    }

    /// PUT the JSON encoding of `body` to `path` and decode the envelope's `data`.
    pub async fn put_json<B, T>(&self, ctx: &Context, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::put(path).json(body)?;
        self.fetch(ctx, request)
            .await
            .with_context(|| format!("PUT {}", path))
    }

    /// DELETE `path`, discarding the response body.
    pub async fn delete(&self, ctx: &Context, path: &str) -> Result<()> {
        self.send_discard(ctx, ApiRequest::delete(path))
            .await
            .with_context(|| format!("DELETE {}", path))
    }

    // =========================================================================
    // Applications
    // =========================================================================

    /// Create an application and return its id.
    #[instrument(skip(self, ctx, options), fields(name = %options.name))]
    pub async fn create_application(
        &self,
        ctx: &Context,
        options: CreateApplicationOptions,
    ) -> Result<String> {
        info!("Creating application");

        let path = format!("{}/applications", REST);
        self.post_json::<_, String>(ctx, &path, &options)
            .await?
            .ok_or_else(|| SdkError::UnexpectedResponse("no application id returned".to_string()))
    }

    /// Get an application by id.
    #[instrument(skip(self, ctx), fields(application_id = %application_id))]
    pub async fn get_application(&self, ctx: &Context, application_id: &str) -> Result<Application> {
        debug!("Getting application");

        let path = format!("{}/applications/{}", REST, application_id);
        self.get_json(ctx, &path)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("application {}", application_id)))
    }

    /// Delete an application.
    #[instrument(skip(self, ctx), fields(application_id = %application_id))]
    pub async fn delete_application(&self, ctx: &Context, application_id: &str) -> Result<()> {
        info!("Deleting application");

        let path = format!("{}/applications/{}", REST, application_id);
        self.delete(ctx, &path).await
    }

    /// Search applications. An empty result is not an error.
    #[instrument(skip(self, ctx))]
    pub async fn search_applications(
        &self,
        ctx: &Context,
        request: &SearchRequest,
    ) -> Result<SearchResult<Application>> {
        debug!("Searching applications");

        let path = format!("{}/applications/search", REST);
        Ok(self.post_json(ctx, &path, request).await?.unwrap_or_default())
    }

    /// Get the application whose name is exactly `name`.
    #[instrument(skip(self, ctx))]
    pub async fn get_application_by_name(&self, ctx: &Context, name: &str) -> Result<Application> {
        let result = self
            .search_applications(ctx, &SearchRequest::new().with_query(name))
            .await?;
        if result.total_results == 0 {
            return Err(SdkError::NotFound(format!("application named {}", name)));
        }
        result
            .data
            .into_iter()
            .find(|app| app.name == name)
            .ok_or_else(|| SdkError::NotFound(format!("application named {}", name)))
    }

    // =========================================================================
    // Environments
    // =========================================================================

    /// Search the environments of an application.
    #[instrument(skip(self, ctx), fields(application_id = %application_id))]
    pub async fn search_environments(
        &self,
        ctx: &Context,
        application_id: &str,
        request: &SearchRequest,
    ) -> Result<SearchResult<ApplicationEnvironment>> {
        debug!("Searching environments");

        let path = format!(
            "{}/applications/{}/environments/search",
            REST, application_id
        );
        Ok(self.post_json(ctx, &path, request).await?.unwrap_or_default())
    }

    /// Id of the environment called `name` in an application.
    #[instrument(skip(self, ctx), fields(application_id = %application_id))]
    pub async fn get_environment_id(
        &self,
        ctx: &Context,
        application_id: &str,
        name: &str,
    ) -> Result<String> {
        let result = self
            .search_environments(ctx, application_id, &SearchRequest::new())
            .await?;
        result
            .data
            .into_iter()
            .find(|env| env.name == name)
            .map(|env| env.id)
            .ok_or_else(|| {
                SdkError::NotFound(format!(
                    "environment {} of application {}",
                    name, application_id
                ))
            })
    }

    /// Id of the topology deployed by an environment.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn get_topology_id(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
    ) -> Result<String> {
        let path = format!(
            "{}/applications/{}/environments/{}/topology",
            REST, application_id, environment_id
        );
        self.get_json(ctx, &path).await?.ok_or_else(|| {
            SdkError::NotFound(format!("topology of environment {}", environment_id))
        })
    }

    // =========================================================================
    // Deployments
    // =========================================================================

    /// Deploy an application environment.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn deploy_application(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
    ) -> Result<()> {
        info!("Deploying application");

        let request = ApiRequest::post(format!("{}/applications/deployment", REST)).json(&json!({
            "applicationId": application_id,
            "applicationEnvironmentId": environment_id,
        }))?;
        self.send_discard(ctx, request)
            .await
            .with_context(|| format!("deploy application {}", application_id))
    }

    /// Undeploy an application environment.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn undeploy_application(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
    ) -> Result<()> {
        info!("Undeploying application");

        let path = format!(
            "{}/applications/{}/environments/{}/deployment",
            REST, application_id, environment_id
        );
        self.delete(ctx, &path).await
    }

    /// Current deployment status of an environment.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn get_deployment_status(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
    ) -> Result<DeploymentStatus> {
        let path = format!(
            "{}/applications/{}/environments/{}/status",
            REST, application_id, environment_id
        );
        self.get_json(ctx, &path).await?.ok_or_else(|| {
            SdkError::UnexpectedResponse(format!("no status for environment {}", environment_id))
        })
    }

    /// The active deployment of an environment.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn get_deployment(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
    ) -> Result<Deployment> {
        let path = format!(
            "{}/applications/{}/environments/{}/active-deployment",
            REST, application_id, environment_id
        );
        self.get_json(ctx, &path).await?.ok_or_else(|| {
            SdkError::NotFound(format!("active deployment of environment {}", environment_id))
        })
    }

    /// Runtime state of every node instance of a deployed environment.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn get_node_instance_states(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
    ) -> Result<NodeInstanceStates> {
        let path = format!(
            "{}/applications/{}/environments/{}/deployment/informations",
            REST, application_id, environment_id
        );
        Ok(self.get_json(ctx, &path).await?.unwrap_or_default())
    }

    /// Poll the deployment status every `interval` until it equals `expected`.
    ///
    /// A failure status other than `expected` ends the wait with an error.
    /// The wait itself is bounded only by `ctx`.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn wait_for_deployment_status(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
        expected: DeploymentStatus,
        interval: Duration,
    ) -> Result<DeploymentStatus> {
        loop {
            let status = self
                .get_deployment_status(ctx, application_id, environment_id)
                .await?;
            debug!(?status, "Polled deployment status");

            if status == expected {
                return Ok(status);
            }
            if status.is_failure() {
                return Err(SdkError::UnexpectedResponse(format!(
                    "environment {} reached {:?} while waiting for {:?}",
                    environment_id, status, expected
                )));
            }

            ctx.sleep(interval).await?;
        }
    }

    /// Page of events emitted by a deployment.
    #[instrument(skip(self, ctx), fields(deployment_id = %deployment_id))]
    pub async fn get_deployment_events(
        &self,
        ctx: &Context,
        deployment_id: &str,
        from: u32,
        size: u32,
    ) -> Result<SearchResult<DeploymentEvent>> {
        let request = ApiRequest::get(format!("{}/deployments/{}/events", REST, deployment_id))
            .query("from", from)
            .query("size", size);
        Ok(self
            .fetch(ctx, request)
            .await
            .with_context(|| format!("events of deployment {}", deployment_id))?
            .unwrap_or_default())
    }

    // =========================================================================
    // Logs
    // =========================================================================

    /// Search deployment logs.
    #[instrument(skip(self, ctx, filter))]
    pub async fn search_logs(
        &self,
        ctx: &Context,
        filter: &LogFilter,
    ) -> Result<SearchResult<LogEntry>> {
        let path = format!("{}/deployment/logs/search", REST);
        Ok(self.post_json(ctx, &path, filter).await?.unwrap_or_default())
    }

    // =========================================================================
    // Archives
    // =========================================================================

    /// Upload a CSAR archive.
    ///
    /// The archive body is kept in memory so a re-login resend carries it
    /// again unchanged.
    #[instrument(skip(self, ctx, archive), fields(file_name = %file_name))]
    pub async fn upload_archive(
        &self,
        ctx: &Context,
        file_name: &str,
        archive: impl Into<Bytes>,
    ) -> Result<ArchiveUploadResult> {
        let archive = archive.into();
        info!(bytes = archive.len(), "Uploading archive");

        let body = MultipartBody::new().file("file", file_name, archive);
        let request =
            ApiRequest::post(format!("{}/csars", REST)).with_body(RequestBody::Multipart(body));
        let result: ArchiveUploadResult = self
            .fetch(ctx, request)
            .await
            .with_context(|| format!("upload archive {}", file_name))?
            .unwrap_or_default();

        if result.has_errors() {
            debug!(files = result.errors.len(), "Archive parsed with errors");
        }
        Ok(result)
    }

    // =========================================================================
    // Users & groups
    // =========================================================================

    /// Create a user.
    #[instrument(skip(self, ctx, options), fields(username = %options.username))]
    pub async fn create_user(&self, ctx: &Context, options: &CreateUserOptions) -> Result<()> {
        info!("Creating user");

        let request = ApiRequest::post(format!("{}/users", REST)).json(options)?;
        self.send_discard(ctx, request)
            .await
            .with_context(|| format!("create user {}", options.username))
    }

    /// Get a user by name.
    #[instrument(skip(self, ctx))]
    pub async fn get_user(&self, ctx: &Context, username: &str) -> Result<User> {
        let path = format!("{}/users/{}", REST, username);
        self.get_json(ctx, &path)
            .await?
            .ok_or_else(|| SdkError::NotFound(format!("user {}", username)))
    }

    /// Delete a user.
    #[instrument(skip(self, ctx))]
    pub async fn delete_user(&self, ctx: &Context, username: &str) -> Result<()> {
        info!("Deleting user");

        let path = format!("{}/users/{}", REST, username);
        self.delete(ctx, &path).await
    }

    /// Search users.
    #[instrument(skip(self, ctx))]
    pub async fn search_users(
        &self,
        ctx: &Context,
        request: &SearchRequest,
    ) -> Result<SearchResult<User>> {
        let path = format!("{}/users/search", REST);
        Ok(self.post_json(ctx, &path, request).await?.unwrap_or_default())
    }

    /// Create a group and return its id.
    #[instrument(skip(self, ctx, options), fields(name = %options.name))]
    pub async fn create_group(&self, ctx: &Context, options: &CreateGroupOptions) -> Result<String> {
        info!("Creating group");

        let path = format!("{}/groups", REST);
        self.post_json::<_, String>(ctx, &path, options)
            .await?
            .ok_or_else(|| SdkError::UnexpectedResponse("no group id returned".to_string()))
    }

    /// Search groups.
    #[instrument(skip(self, ctx))]
    pub async fn search_groups(
        &self,
        ctx: &Context,
        request: &SearchRequest,
    ) -> Result<SearchResult<Group>> {
        let path = format!("{}/groups/search", REST);
        Ok(self.post_json(ctx, &path, request).await?.unwrap_or_default())
    }

    /// Delete a group.
    #[instrument(skip(self, ctx))]
    pub async fn delete_group(&self, ctx: &Context, group_id: &str) -> Result<()> {
        info!("Deleting group");

        let path = format!("{}/groups/{}", REST, group_id);
        self.delete(ctx, &path).await
    }
}
