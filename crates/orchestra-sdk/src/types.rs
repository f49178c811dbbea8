// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payload types for the platform's REST resources.
//!
//! Timestamps travel as integer milliseconds since the epoch and are exposed
//! as `DateTime<Utc>`; sub-millisecond precision does not survive a round trip.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Search
// ============================================================================

/// Body of the `.../search` endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub from: u32,
    pub size: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub filters: BTreeMap<String, Vec<String>>,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self {
            size: 100,
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters
            .entry(field.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn with_page(mut self, from: u32, size: u32) -> Self {
        self.from = from;
        self.size = size;
        self
    }
}

/// Payload of the `.../search` endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult<T> {
    #[serde(default)]
    pub types: Option<Vec<String>>,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub total_results: i64,
    #[serde(default)]
    pub from: i64,
    #[serde(default)]
    pub to: i64,
}

impl<T> Default for SearchResult<T> {
    fn default() -> Self {
        Self {
            types: None,
            data: Vec::new(),
            total_results: 0,
            from: 0,
            to: 0,
        }
    }
}

impl<T> SearchResult<T> {
    pub fn is_empty(&self) -> bool {
        self.total_results == 0 || self.data.is_empty()
    }
}

// ============================================================================
// Applications & environments
// ============================================================================

/// An application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_update_date: Option<DateTime<Utc>>,
}

/// A key/value tag attached to an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// Options for creating an application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationOptions {
    pub name: String,
    pub archive_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology_template_version_id: Option<String>,
}

impl CreateApplicationOptions {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            archive_name: name.replace(|c: char| !c.is_ascii_alphanumeric(), ""),
            name,
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Create the application from a topology template version.
    pub fn with_template(mut self, topology_template_version_id: impl Into<String>) -> Self {
        self.topology_template_version_id = Some(topology_template_version_id.into());
        self
    }
}

/// An environment of an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEnvironment {
    pub id: String,
    pub name: String,
    pub application_id: String,
    #[serde(default)]
    pub environment_type: Option<String>,
    #[serde(default)]
    pub status: Option<DeploymentStatus>,
    #[serde(default)]
    pub current_version_name: Option<String>,
}

// ============================================================================
// Deployments
// ============================================================================

/// Deployment status of an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Deployed,
    Undeployed,
    InitDeployment,
    DeploymentInProgress,
    UndeploymentInProgress,
    UpdateInProgress,
    Updated,
    UpdateFailure,
    Warning,
    Failure,
    #[serde(other)]
    Unknown,
}

impl DeploymentStatus {
    /// True for statuses from which the platform will not move on its own.
    pub fn is_settled(&self) -> bool {
        !matches!(
            self,
            DeploymentStatus::InitDeployment
                | DeploymentStatus::DeploymentInProgress
                | DeploymentStatus::UndeploymentInProgress
                | DeploymentStatus::UpdateInProgress
        )
    }

    /// True for failure statuses.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Failure | DeploymentStatus::UpdateFailure
        )
    }
}

/// A deployment of an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub id: String,
    #[serde(default)]
    pub orchestrator_deployment_id: Option<String>,
    #[serde(default)]
    pub orchestrator_id: Option<String>,
    #[serde(default)]
    pub location_ids: Vec<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub environment_id: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_date: Option<DateTime<Utc>>,
}

/// Runtime information for one node instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceInformation {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub instance_status: Option<String>,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Node name -> instance id -> instance information.
pub type NodeInstanceStates = HashMap<String, HashMap<String, InstanceInformation>>;

/// A deployment event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentEvent {
    #[serde(rename = "rawType", default)]
    pub event_type: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub node_template_id: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub instance_state: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
    /// Event-type specific members.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ============================================================================
// Workflow executions
// ============================================================================

/// Status of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl ExecutionStatus {
    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// A remote record of one workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub workflow_name: Option<String>,
    #[serde(default)]
    pub display_workflow_name: Option<String>,
    pub status: ExecutionStatus,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_failed_tasks: bool,
}

/// Query for the execution search endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionQuery {
    pub deployment_id: Option<String>,
    /// Free-text query; an execution id narrows the search to one record.
    pub query: Option<String>,
    pub from: u32,
    pub size: u32,
}

impl ExecutionQuery {
    pub fn for_deployment(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: Some(deployment_id.into()),
            size: 10,
            ..Self::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

// ============================================================================
// Logs
// ============================================================================

/// A deployment log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub deployment_id: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub interface_name: Option<String>,
    #[serde(default)]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// Options for searching deployment logs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub from: u32,
    pub size: u32,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub filters: BTreeMap<String, Vec<String>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub from_date: Option<DateTime<Utc>>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        default,
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub to_date: Option<DateTime<Utc>>,
}

impl LogFilter {
    pub fn for_deployment(deployment_id: impl Into<String>) -> Self {
        let mut filters = BTreeMap::new();
        filters.insert("deploymentId".to_string(), vec![deployment_id.into()]);
        Self {
            size: 100,
            filters,
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.filters
            .entry("level".to_string())
            .or_default()
            .push(level.into());
        self
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from_date = Some(from);
        self.to_date = Some(to);
        self
    }
}

// ============================================================================
// Archives
// ============================================================================

/// Result of uploading a CSAR archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveUploadResult {
    #[serde(default)]
    pub csar: Option<serde_json::Value>,
    /// Parsing errors grouped by file inside the archive.
    #[serde(default)]
    pub errors: BTreeMap<String, Vec<serde_json::Value>>,
}

impl ArchiveUploadResult {
    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|errors| !errors.is_empty())
    }
}

// ============================================================================
// Users & groups
// ============================================================================

/// A platform user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Options for creating a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserOptions {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub roles: Vec<String>,
}

impl CreateUserOptions {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

/// A group of users.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
}

/// Options for creating a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupOptions {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub roles: Vec<String>,
}

impl CreateGroupOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_execution_status_is_terminal() {
        assert!(!ExecutionStatus::Scheduled.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Unknown.is_terminal());
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_unknown_statuses_decode() {
        let status: ExecutionStatus = serde_json::from_value(json!("PAUSED")).unwrap();
        assert_eq!(status, ExecutionStatus::Unknown);
        let status: DeploymentStatus =
            serde_json::from_value(json!("DEPLOYMENT_IN_PROGRESS")).unwrap();
        assert_eq!(status, DeploymentStatus::DeploymentInProgress);
        assert!(!status.is_settled());
    }

    #[test]
    fn test_millisecond_timestamps_round_trip() {
        let created = Utc.timestamp_millis_opt(1_700_000_123_456).unwrap()
            + chrono::Duration::nanoseconds(789_000);
        let app = Application {
            id: "app-1".into(),
            name: "demo".into(),
            description: None,
            tags: vec![],
            creation_date: Some(created),
            last_update_date: None,
        };

        let encoded = serde_json::to_value(&app).unwrap();
        assert_eq!(encoded["creationDate"], json!(1_700_000_123_456i64));

        let decoded: Application = serde_json::from_value(encoded).unwrap();
        assert_eq!(
            decoded.creation_date.map(|t| t.timestamp_millis()),
            Some(created.timestamp_millis())
        );
    }

    #[test]
    fn test_log_filter_encoding() {
        let from = Utc.timestamp_millis_opt(1_000).unwrap();
        let to = Utc.timestamp_millis_opt(2_000).unwrap();
        let filter = LogFilter::for_deployment("dep-1")
            .with_level("ERROR")
            .between(from, to);

        let encoded = serde_json::to_value(&filter).unwrap();
        assert_eq!(encoded["filters"]["deploymentId"], json!(["dep-1"]));
        assert_eq!(encoded["filters"]["level"], json!(["ERROR"]));
        assert_eq!(encoded["fromDate"], json!(1_000));
        assert_eq!(encoded["toDate"], json!(2_000));
        assert!(encoded.get("query").is_none());
    }

    #[test]
    fn test_search_result_defaults() {
        let result: SearchResult<Application> =
            serde_json::from_value(json!({"data": [], "totalResults": 0})).unwrap();
        assert!(result.is_empty());
        assert!(result.types.is_none());
    }

    #[test]
    fn test_create_application_archive_name() {
        let opts = CreateApplicationOptions::new("my-app 2");
        assert_eq!(opts.archive_name, "myapp2");
        let encoded = serde_json::to_value(&opts).unwrap();
        assert_eq!(encoded, json!({"name": "my-app 2", "archiveName": "myapp2"}));
    }
}
