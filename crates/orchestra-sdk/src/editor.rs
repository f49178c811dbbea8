// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Topology editing sessions.
//!
//! The platform's topology editor is operation based: every operation names
//! the operation it follows, and a save names the last one applied. A
//! [`TopologyEditor`] carries that cursor for one topology and serializes
//! calls on it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::client::Client;
use crate::context::Context;
use crate::error::{Result, ResultExt, SdkError};
use crate::request::ApiRequest;

const OPERATIONS: &str = "org.alien4cloud.tosca.editor.operations";

/// One editor operation: its type plus type-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorOperation {
    #[serde(rename = "type")]
    pub operation_type: String,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl EditorOperation {
    pub fn new(operation_type: impl Into<String>) -> Self {
        Self {
            operation_type: operation_type.into(),
            params: Map::new(),
        }
    }

    /// Set a parameter of the operation.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a node template of the given type.
    pub fn add_node(name: &str, node_type: &str, version: &str) -> Self {
        Self::new(format!("{}.nodetemplate.AddNodeOperation", OPERATIONS))
            .param("nodeName", name)
            .param("indexedNodeTypeId", format!("{}:{}", node_type, version))
    }

    /// Delete a node template.
    pub fn delete_node(name: &str) -> Self {
        Self::new(format!("{}.nodetemplate.DeleteNodeOperation", OPERATIONS))
            .param("nodeName", name)
    }

    /// Set a property of a node template.
    pub fn update_node_property(node: &str, property: &str, value: impl Into<Value>) -> Self {
        Self::new(format!(
            "{}.nodetemplate.UpdateNodePropertyValueOperation",
            OPERATIONS
        ))
        .param("nodeName", node)
        .param("propertyName", property)
        .param("propertyValue", value)
    }

    /// Add a relationship from `source` to `target`.
    pub fn add_relationship(
        source: &str,
        name: &str,
        relationship_type: &str,
        version: &str,
        requirement: &str,
        target: &str,
        capability: &str,
    ) -> Self {
        Self::new(format!(
            "{}.relationshiptemplate.AddRelationshipOperation",
            OPERATIONS
        ))
        .param("nodeName", source)
        .param("relationshipName", name)
        .param("relationshipType", relationship_type)
        .param("relationshipVersion", version)
        .param("requirementName", requirement)
        .param("target", target)
        .param("targetedCapabilityName", capability)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteRequest<'a> {
    #[serde(flatten)]
    operation: &'a EditorOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_operation_id: Option<&'a str>,
}

/// Editor state returned after each call.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyState {
    #[serde(default)]
    pub topology: Option<Value>,
    #[serde(default = "no_operation")]
    pub last_operation_index: i64,
    #[serde(default)]
    pub operations: Vec<AppliedOperation>,
}

fn no_operation() -> i64 {
    -1
}

/// An operation recorded in the editor history.
#[derive(Debug, Clone, Deserialize)]
pub struct AppliedOperation {
    pub id: String,
    #[serde(rename = "type", default)]
    pub operation_type: Option<String>,
}

impl TopologyState {
    /// Id of the most recently applied operation, if any.
    pub fn last_operation_id(&self) -> Option<&str> {
        usize::try_from(self.last_operation_index)
            .ok()
            .and_then(|index| self.operations.get(index))
            .map(|op| op.id.as_str())
    }
}

/// An editing session on one topology.
#[derive(Debug)]
pub struct TopologyEditor {
    client: Client,
    topology_id: String,
    last_operation_id: Mutex<Option<String>>,
}

impl TopologyEditor {
    pub fn topology_id(&self) -> &str {
        &self.topology_id
    }

    /// Id of the last operation applied through this session.
    pub async fn last_operation_id(&self) -> Option<String> {
        self.last_operation_id.lock().await.clone()
    }

    /// Apply an operation after the last one applied.
    ///
    /// The session cursor only moves when the platform accepts the operation.
    #[instrument(skip(self, ctx, operation), fields(topology_id = %self.topology_id, operation = %operation.operation_type))]
    pub async fn apply(&self, ctx: &Context, operation: &EditorOperation) -> Result<TopologyState> {
        let mut cursor = self.last_operation_id.lock().await;

        let body = ExecuteRequest {
            operation,
            previous_operation_id: cursor.as_deref(),
        };
        let request =
            ApiRequest::post(format!("/rest/latest/editor/{}/execute", self.topology_id))
                .json(&body)?;
        let state: TopologyState = self
            .client
            .fetch(ctx, request)
            .await
            .with_context(|| format!("apply {}", operation.operation_type))?
            .ok_or_else(|| SdkError::UnexpectedResponse("editor returned no state".to_string()))?;

        let applied = state.last_operation_id().ok_or_else(|| {
            SdkError::UnexpectedResponse("editor returned no applied operation".to_string())
        })?;
        debug!(operation_id = applied, "Operation applied");
        *cursor = Some(applied.to_string());

        Ok(state)
    }

    /// Apply several operations in order, stopping at the first failure.
    pub async fn apply_all(
        &self,
        ctx: &Context,
        operations: &[EditorOperation],
    ) -> Result<Option<TopologyState>> {
        let mut state = None;
        for operation in operations {
            state = Some(self.apply(ctx, operation).await?);
        }
        Ok(state)
    }

    /// Persist the operations applied so far.
    ///
    /// Nothing is sent when no operation has been applied.
    #[instrument(skip(self, ctx), fields(topology_id = %self.topology_id))]
    pub async fn save(&self, ctx: &Context) -> Result<()> {
        let mut cursor = self.last_operation_id.lock().await;
        let Some(last) = cursor.clone() else {
            debug!("Nothing to save");
            return Ok(());
        };

        let request = ApiRequest::post(format!("/rest/latest/editor/{}", self.topology_id))
            .query("lastOperationId", &last);
        let state: Option<TopologyState> = self
            .client
            .fetch(ctx, request)
            .await
            .with_context(|| format!("save topology {}", self.topology_id))?;

        *cursor = state.and_then(|s| s.last_operation_id().map(str::to_string));
        info!(last_operation_id = %last, "Topology saved");
        Ok(())
    }
}

impl Client {
    /// Open an editing session on a topology.
    pub fn topology_editor(&self, topology_id: impl Into<String>) -> TopologyEditor {
        TopologyEditor {
            client: self.clone(),
            topology_id: topology_id.into(),
            last_operation_id: Mutex::new(None),
        }
    }

    /// Open an editing session on the topology of an environment.
    pub async fn edit_environment_topology(
        &self,
        ctx: &Context,
        application_id: &str,
        environment_id: &str,
    ) -> Result<TopologyEditor> {
        let topology_id = self
            .get_topology_id(ctx, application_id, environment_id)
            .await?;
        Ok(self.topology_editor(topology_id))
    }
}
