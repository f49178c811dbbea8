// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow triggering and execution monitoring.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::client::Client;
use crate::context::Context;
use crate::error::{Result, ResultExt, SdkError};
use crate::request::ApiRequest;
use crate::types::{Execution, ExecutionQuery, SearchResult};

/// Timing of the execution polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Wait before the first search, so the platform can index the execution.
    pub settle_delay: Duration,
    /// Wait between two searches.
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            interval: Duration::from_secs(5),
        }
    }
}

/// The execution a lookup or monitor is after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    pub deployment_id: String,
    /// Execution id, when the launch reported one.
    pub execution_id: Option<String>,
    /// Narrows a search without an execution id to one workflow.
    pub workflow_name: Option<String>,
}

impl ExecutionTarget {
    /// The execution with id `execution_id` in a deployment.
    pub fn new(deployment_id: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            execution_id: Some(execution_id.into()),
            workflow_name: None,
        }
    }

    /// The one execution of `workflow_name` in a deployment.
    pub fn for_workflow(deployment_id: impl Into<String>, workflow_name: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            execution_id: None,
            workflow_name: Some(workflow_name.into()),
        }
    }

    fn query(&self) -> ExecutionQuery {
        let query = ExecutionQuery::for_deployment(&self.deployment_id);
        match self.execution_id.as_ref().or(self.workflow_name.as_ref()) {
            Some(text) => query.with_query(text),
            None => query,
        }
    }

    fn label(&self) -> &str {
        self.execution_id
            .as_deref()
            .or(self.workflow_name.as_deref())
            .unwrap_or("*")
    }
}

impl Client {
    /// Launch a workflow on an environment.
    ///
    /// Returns the execution id when the platform reports one.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn run_workflow(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
        workflow_name: &str,
    ) -> Result<Option<String>> {
        info!("Launching workflow");

        let request = ApiRequest::post(format!(
            "/rest/latest/applications/{}/environments/{}/workflows/{}",
            application_id, environment_id, workflow_name
        ));
        let data: Option<Value> = self
            .fetch(ctx, request)
            .await
            .with_context(|| format!("run workflow {}", workflow_name))?;

        let execution_id = match data {
            Some(Value::String(id)) => Some(id),
            _ => None,
        };
        debug!(execution_id = ?execution_id, "Workflow launched");
        Ok(execution_id)
    }

    /// Search workflow executions.
    #[instrument(skip(self, ctx))]
    pub async fn search_executions(
        &self,
        ctx: &Context,
        query: &ExecutionQuery,
    ) -> Result<SearchResult<Execution>> {
        let mut request = ApiRequest::get("/rest/latest/executions/search");
        if let Some(text) = &query.query {
            request = request.query("query", text);
        }
        if let Some(deployment_id) = &query.deployment_id {
            request = request.query("deploymentId", deployment_id);
        }
        let request = request.query("from", query.from).query("size", query.size);

        Ok(self
            .fetch(ctx, request)
            .await
            .with_context(|| "search executions")?
            .unwrap_or_default())
    }

    /// Find the one execution matching `target`.
    ///
    /// Zero matches is [`SdkError::NotFound`]; several is [`SdkError::Ambiguous`].
    pub async fn find_execution(
        &self,
        ctx: &Context,
        target: &ExecutionTarget,
    ) -> Result<Execution> {
        let mut result = self.search_executions(ctx, &target.query()).await?;

        match result.data.len() {
            0 => Err(SdkError::NotFound(format!(
                "execution {} of deployment {}",
                target.label(),
                target.deployment_id
            ))),
            1 => Ok(result.data.remove(0)),
            n => Err(SdkError::Ambiguous(format!(
                "{} executions match {} in deployment {}",
                n,
                target.label(),
                target.deployment_id
            ))),
        }
    }

    /// Watch an execution in the background until it reaches a terminal status.
    ///
    /// The execution is looked up again on every poll. `on_done` runs exactly
    /// once: with the terminal execution, with the first search error, or
    /// with the context's error when `ctx` is cancelled or expires.
    /// Cancellation aborts an in-flight search.
    pub fn monitor_workflow<F>(
        &self,
        ctx: &Context,
        target: ExecutionTarget,
        settings: PollSettings,
        on_done: F,
    ) -> JoinHandle<()>
    where
        F: FnOnce(Result<Execution>) + Send + 'static,
    {
        let client = self.clone();
        let ctx = ctx.clone();
        let span = info_span!(
            "monitor_workflow",
            deployment_id = %target.deployment_id,
            execution = %target.label()
        );

        tokio::spawn(
            async move {
                let result = client.poll_execution(&ctx, &target, settings).await;
                match &result {
                    Ok(execution) => info!(status = ?execution.status, "Execution finished"),
                    Err(err) => warn!(error = %err, "Execution monitoring stopped"),
                }
                on_done(result);
            }
            .instrument(span),
        )
    }

    async fn poll_execution(
        &self,
        ctx: &Context,
        target: &ExecutionTarget,
        settings: PollSettings,
    ) -> Result<Execution> {
        ctx.sleep(settings.settle_delay).await?;

        let mut polls: u32 = 0;
        loop {
            let execution = match self.find_execution(ctx, target).await {
                Ok(execution) => execution,
                // A search aborted by the context reports the context's own error.
                Err(err) => return Err(ctx.err().unwrap_or(err)),
            };
            polls += 1;
            debug!(polls, status = ?execution.status, "Polled execution");

            if execution.status.is_terminal() {
                // A deadline that passed during the last search wins over its result.
                if let Some(err) = ctx.err() {
                    return Err(err);
                }
                return Ok(execution);
            }

            ctx.sleep(settings.interval).await?;
        }
    }

    /// Wait for an execution to reach a terminal status, for at most `timeout`.
    ///
    /// Returns [`SdkError::DeadlineExceeded`] when the timeout passes first.
    pub async fn wait_for_workflow(
        &self,
        ctx: &Context,
        target: ExecutionTarget,
        settings: PollSettings,
        timeout: Duration,
    ) -> Result<Execution> {
        let ctx = ctx.with_timeout(timeout);
        let (tx, rx) = oneshot::channel();
        let handle = self.monitor_workflow(&ctx, target, settings, move |result| {
            let _ = tx.send(result);
        });

        let result = tokio::select! {
            biased;
            delivered = rx => delivered.unwrap_or_else(|_| {
                Err(SdkError::UnexpectedResponse("execution monitor stopped".to_string()))
            }),
            err = ctx.done() => Err(err),
        };

        ctx.cancel();
        if let Err(err) = handle.await {
            warn!(error = %err, "Execution monitor task failed");
        }
        result
    }

    /// Launch a workflow and wait for its execution to finish.
    ///
    /// `timeout` bounds the whole call and defaults to the configured
    /// workflow timeout. When the platform reports no execution id, the
    /// execution is searched by deployment and workflow name.
    #[instrument(skip(self, ctx), fields(application_id = %application_id, environment_id = %environment_id))]
    pub async fn run_workflow_and_wait(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
        workflow_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Execution> {
        let timeout = timeout.unwrap_or(self.config().workflow_timeout);
        let ctx = ctx.with_timeout(timeout);

        let result = self
            .launch_and_wait(&ctx, application_id, environment_id, workflow_name, timeout)
            .await;
        match (result, ctx.err()) {
            (Err(_), Some(done)) => Err(done),
            (result, _) => result,
        }
    }

    async fn launch_and_wait(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
        workflow_name: &str,
        timeout: Duration,
    ) -> Result<Execution> {
        let deployment = self
            .get_deployment(ctx, application_id, environment_id)
            .await?;
        let target = match self
            .run_workflow(ctx, application_id, environment_id, workflow_name)
            .await?
        {
            Some(execution_id) => ExecutionTarget::new(deployment.id, execution_id),
            None => {
                debug!("No execution id reported, searching by workflow name");
                ExecutionTarget::for_workflow(deployment.id, workflow_name)
            }
        };

        self.wait_for_workflow(ctx, target, PollSettings::default(), timeout)
            .await
    }
}
