// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource service tests: applications, deployments, topology editing,
//! archives, logs and users.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{Sequence, client_for, envelope, error_envelope, received};
use orchestra_sdk::{
    Context, CreateApplicationOptions, CreateGroupOptions, CreateUserOptions, DeploymentStatus,
    EditorOperation, LogFilter, SdkError, SearchRequest,
};
use serde_json::{Value, json};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn app(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "creationDate": 1_700_000_000_000i64})
}

fn search_page(data: Vec<Value>) -> ResponseTemplate {
    let total = data.len();
    envelope(json!({"types": ["application"], "data": data, "totalResults": total}))
}

fn body_of(request: &wiremock::Request) -> Value {
    serde_json::from_slice(&request.body).unwrap()
}

// ============================================================================
// Applications
// ============================================================================

#[tokio::test]
async fn test_empty_search_is_ok_but_lookup_by_name_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/applications/search"))
        .respond_with(search_page(vec![]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = Context::background();

    let result = client
        .search_applications(&ctx, &SearchRequest::new())
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(result.total_results, 0);

    let err = client
        .get_application_by_name(&ctx, "shop")
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::NotFound(_)));
}

#[tokio::test]
async fn test_lookup_by_name_requires_exact_match() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/applications/search"))
        .and(body_json(json!({"query": "shop", "from": 0, "size": 100})))
        .respond_with(search_page(vec![
            app("app-1", "shop-staging"),
            app("app-2", "shop"),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let found = client
        .get_application_by_name(&Context::background(), "shop")
        .await
        .unwrap();
    assert_eq!(found.id, "app-2");
    assert_eq!(
        found.creation_date,
        Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap())
    );
}

#[tokio::test]
async fn test_create_application_returns_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/applications"))
        .and(body_json(json!({
            "name": "shop",
            "archiveName": "shop",
            "topologyTemplateVersionId": "tpl:1.0.0",
        })))
        .respond_with(envelope(json!("app-7")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let id = client
        .create_application(
            &Context::background(),
            CreateApplicationOptions::new("shop").with_template("tpl:1.0.0"),
        )
        .await
        .unwrap();
    assert_eq!(id, "app-7");
}

#[tokio::test]
async fn test_environment_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/applications/app-1/environments/search"))
        .respond_with(search_page(vec![
            json!({"id": "env-1", "name": "Environment", "applicationId": "app-1", "status": "DEPLOYED"}),
            json!({"id": "env-2", "name": "staging", "applicationId": "app-1"}),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = Context::background();
    assert_eq!(
        client.get_environment_id(&ctx, "app-1", "staging").await.unwrap(),
        "env-2"
    );
    let err = client
        .get_environment_id(&ctx, "app-1", "production")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

// ============================================================================
// Deployments
// ============================================================================

#[tokio::test]
async fn test_deploy_and_undeploy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/applications/deployment"))
        .and(body_json(json!({
            "applicationId": "app-1",
            "applicationEnvironmentId": "env-1",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/latest/applications/app-1/environments/env-1/deployment"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = Context::background();
    client.deploy_application(&ctx, "app-1", "env-1").await.unwrap();
    client.undeploy_application(&ctx, "app-1", "env-1").await.unwrap();
}

#[tokio::test]
async fn test_wait_for_deployment_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/latest/applications/app-1/environments/env-1/status"))
        .respond_with(Sequence::new(vec![
            envelope(json!("INIT_DEPLOYMENT")),
            envelope(json!("DEPLOYMENT_IN_PROGRESS")),
            envelope(json!("DEPLOYED")),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let status = client
        .wait_for_deployment_status(
            &Context::background(),
            "app-1",
            "env-1",
            DeploymentStatus::Deployed,
            Duration::from_millis(10),
        )
        .await
        .unwrap();
    assert_eq!(status, DeploymentStatus::Deployed);
    assert_eq!(
        received(&server, "/rest/latest/applications/app-1/environments/env-1/status")
            .await
            .len(),
        3
    );
}

#[tokio::test]
async fn test_wait_for_deployment_status_stops_on_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/latest/applications/app-1/environments/env-1/status"))
        .respond_with(envelope(json!("FAILURE")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .wait_for_deployment_status(
            &Context::background(),
            "app-1",
            "env-1",
            DeploymentStatus::Deployed,
            Duration::from_millis(10),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failure"));
}

#[tokio::test]
async fn test_node_instance_states() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(
            "/rest/latest/applications/app-1/environments/env-1/deployment/informations",
        ))
        .respond_with(envelope(json!({
            "Compute": {
                "0": {"state": "started", "instanceStatus": "SUCCESS", "attributes": {"ip_address": "10.0.0.4"}},
                "1": {"state": "starting", "instanceStatus": "PROCESSING"},
            },
            "Database": {
                "0": {"state": "error", "instanceStatus": "FAILURE"},
            },
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let states = client
        .get_node_instance_states(&Context::background(), "app-1", "env-1")
        .await
        .unwrap();

    assert_eq!(states.len(), 2);
    assert_eq!(states["Compute"].len(), 2);
    assert_eq!(states["Compute"]["0"].state, "started");
    assert_eq!(states["Compute"]["0"].attributes["ip_address"], "10.0.0.4");
    assert_eq!(
        states["Database"]["0"].instance_status.as_deref(),
        Some("FAILURE")
    );
}

#[tokio::test]
async fn test_deployment_events_page() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/latest/deployments/dep-1/events"))
        .and(query_param("from", "0"))
        .and(query_param("size", "50"))
        .respond_with(envelope(json!({
            "data": [{
                "rawType": "paasdeploymentstatusmonitorevent",
                "date": 1_700_000_000_500i64,
                "deploymentId": "dep-1",
                "deploymentStatus": "DEPLOYED",
            }],
            "totalResults": 1,
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let events = client
        .get_deployment_events(&Context::background(), "dep-1", 0, 50)
        .await
        .unwrap();
    assert_eq!(events.data.len(), 1);
    let event = &events.data[0];
    assert_eq!(event.event_type, "paasdeploymentstatusmonitorevent");
    assert_eq!(event.date.timestamp_millis(), 1_700_000_000_500);
    assert_eq!(event.extra["deploymentStatus"], "DEPLOYED");
}

// ============================================================================
// Topology editor
// ============================================================================

#[tokio::test]
async fn test_editor_chains_operation_ids_and_saves() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/latest/applications/app-1/environments/env-1/topology"))
        .respond_with(envelope(json!("app-1:0.1.0-SNAPSHOT")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/editor/app-1:0.1.0-SNAPSHOT/execute"))
        .respond_with(Sequence::new(vec![
            envelope(json!({
                "lastOperationIndex": 0,
                "operations": [{"id": "op-1"}],
            })),
            envelope(json!({
                "lastOperationIndex": 1,
                "operations": [{"id": "op-1"}, {"id": "op-2"}],
            })),
        ]))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/editor/app-1:0.1.0-SNAPSHOT"))
        .and(query_param("lastOperationId", "op-2"))
        .respond_with(envelope(json!({"lastOperationIndex": -1, "operations": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = Context::background();
    let editor = client
        .edit_environment_topology(&ctx, "app-1", "env-1")
        .await
        .unwrap();
    assert_eq!(editor.topology_id(), "app-1:0.1.0-SNAPSHOT");

    editor
        .apply(
            &ctx,
            &EditorOperation::add_node("Compute", "tosca.nodes.Compute", "1.0.0"),
        )
        .await
        .unwrap();
    editor
        .apply(
            &ctx,
            &EditorOperation::update_node_property("Compute", "instances", 2),
        )
        .await
        .unwrap();
    assert_eq!(editor.last_operation_id().await, Some("op-2".to_string()));

    editor.save(&ctx).await.unwrap();
    assert_eq!(editor.last_operation_id().await, None);

    let executes = received(&server, "/rest/latest/editor/app-1:0.1.0-SNAPSHOT/execute").await;
    assert_eq!(executes.len(), 2);
    assert!(body_of(&executes[0]).get("previousOperationId").is_none());
    assert_eq!(body_of(&executes[1])["previousOperationId"], "op-1");
    assert_eq!(body_of(&executes[1])["propertyValue"], 2);
}

#[tokio::test]
async fn test_rejected_operation_keeps_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/editor/topo-1/execute"))
        .respond_with(Sequence::new(vec![
            envelope(json!({"lastOperationIndex": 0, "operations": [{"id": "op-1"}]})),
            error_envelope(400, 850, "node Compute already exists"),
        ]))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = Context::background();
    let editor = client.topology_editor("topo-1");
    let add = EditorOperation::add_node("Compute", "tosca.nodes.Compute", "1.0.0");

    editor.apply(&ctx, &add).await.unwrap();
    let err = editor.apply(&ctx, &add).await.unwrap_err();
    assert_eq!(err.api_code(), Some(850));
    assert_eq!(editor.last_operation_id().await, Some("op-1".to_string()));
}

#[tokio::test]
async fn test_save_without_operations_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client
        .topology_editor("topo-1")
        .save(&Context::background())
        .await
        .unwrap();
}

// ============================================================================
// Archives & logs
// ============================================================================

#[tokio::test]
async fn test_upload_archive_is_multipart() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/csars"))
        .respond_with(envelope(json!({
            "csar": {"name": "shop", "version": "1.0.0"},
            "errors": {"types.yml": []},
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let result = client
        .upload_archive(&Context::background(), "shop.zip", b"PK\x03\x04zip".to_vec())
        .await
        .unwrap();
    assert!(!result.has_errors());

    let uploads = received(&server, "/rest/latest/csars").await;
    let content_type = uploads[0].headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data; boundary="));
    let body = String::from_utf8_lossy(&uploads[0].body);
    assert!(body.contains("name=\"file\""));
    assert!(body.contains("filename=\"shop.zip\""));
    assert!(body.contains("zip"));
}

#[tokio::test]
async fn test_search_logs_uses_millisecond_dates() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/deployment/logs/search"))
        .respond_with(envelope(json!({
            "data": [{
                "deploymentId": "dep-1",
                "level": "INFO",
                "timestamp": 1_700_000_000_123i64,
                "content": "Deployment started",
            }],
            "totalResults": 1,
        })))
        .mount(&server)
        .await;

    let from = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
    let to = Utc.timestamp_millis_opt(1_700_000_060_000).unwrap();
    let filter = LogFilter::for_deployment("dep-1").between(from, to);

    let client = client_for(&server);
    let logs = client
        .search_logs(&Context::background(), &filter)
        .await
        .unwrap();
    assert_eq!(logs.total_results, 1);
    assert_eq!(logs.data[0].timestamp.timestamp_millis(), 1_700_000_000_123);
    assert_eq!(logs.data[0].content, "Deployment started");

    let searches = received(&server, "/rest/latest/deployment/logs/search").await;
    let sent = body_of(&searches[0]);
    assert_eq!(sent["fromDate"], 1_700_000_000_000i64);
    assert_eq!(sent["toDate"], 1_700_000_060_000i64);
    assert_eq!(sent["filters"]["deploymentId"], json!(["dep-1"]));
}

// ============================================================================
// Users & groups
// ============================================================================

#[tokio::test]
async fn test_user_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/users"))
        .and(body_json(json!({
            "username": "ops",
            "password": "s3cret",
            "email": "ops@example.com",
            "roles": ["APPLICATIONS_MANAGER"],
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/latest/users/ops"))
        .respond_with(envelope(json!({"username": "ops", "roles": ["APPLICATIONS_MANAGER"]})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/latest/users/ghost"))
        .respond_with(error_envelope(404, 504, "user not found"))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/latest/users/ops"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = Context::background();
    let options = CreateUserOptions::new("ops", "s3cret")
        .with_email("ops@example.com")
        .with_role("APPLICATIONS_MANAGER");
    client.create_user(&ctx, &options).await.unwrap();

    let user = client.get_user(&ctx, "ops").await.unwrap();
    assert_eq!(user.roles, vec!["APPLICATIONS_MANAGER".to_string()]);
    assert!(client.get_user(&ctx, "ghost").await.unwrap_err().is_not_found());

    client.delete_user(&ctx, "ops").await.unwrap();
}

#[tokio::test]
async fn test_groups() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/groups"))
        .and(body_json(json!({"name": "operators", "description": "on call"})))
        .respond_with(envelope(json!("grp-1")))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/latest/groups/search"))
        .respond_with(envelope(json!({
            "data": [{"id": "grp-1", "name": "operators", "users": ["ops"]}],
            "totalResults": 1,
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/rest/latest/groups/grp-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let ctx = Context::background();
    let id = client
        .create_group(
            &ctx,
            &CreateGroupOptions::new("operators").with_description("on call"),
        )
        .await
        .unwrap();
    assert_eq!(id, "grp-1");

    let groups = client
        .search_groups(&ctx, &SearchRequest::new().with_query("operators"))
        .await
        .unwrap();
    assert_eq!(groups.data[0].users, vec!["ops".to_string()]);

    client.delete_group(&ctx, &id).await.unwrap();
}
