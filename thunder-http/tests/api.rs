//! Router-level tests driving the full stack: axum front door, flow
//! service over a composite store, and the engine with real executors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use thunder_core::config::{DefaultFlowConfig, FlowExecutionConfig};
use thunder_core::context::Application;
use thunder_core::provider::{
    ApplicationProvider, CredentialError, CredentialsVerifier, ProviderError, TokenError,
    TokenIssuer, User, UserProvider,
};
use thunder_executors::{
    AssertionDefaults, AuthAssertExecutor, BasicAuthExecutor, ExecutorRegistry,
};
use thunder_flow::{FlowEngine, InstanceStore};
use thunder_graph::GraphCache;
use thunder_http::{router, AppState, FlowMetadataProvider, MetaTargetType};
use thunder_store::{CompositeFlowStore, FileFlowStore, FlowService, SqlxFlowStore};
use tower::util::ServiceExt;

struct StaticUsers;

#[async_trait]
impl UserProvider for StaticUsers {
    async fn identify_user(
        &self,
        filters: &HashMap<String, String>,
    ) -> Result<String, ProviderError> {
        match filters.get("username").map(String::as_str) {
            Some("alice") => Ok("user-alice".into()),
            _ => Err(ProviderError::UserNotFound),
        }
    }

    async fn get_user(&self, user_id: &str) -> Result<User, ProviderError> {
        Ok(User {
            id: user_id.into(),
            attributes: HashMap::from([("username".into(), "alice".into())]),
            ..User::default()
        })
    }

    async fn create_user(
        &self,
        _user: thunder_core::provider::NewUser,
    ) -> Result<String, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    async fn update_user(
        &self,
        _user_id: &str,
        _attributes: HashMap<String, String>,
    ) -> Result<(), ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}

struct StaticCredentials;

#[async_trait]
impl CredentialsVerifier for StaticCredentials {
    async fn authenticate(
        &self,
        identifiers: &HashMap<String, String>,
        credentials: &HashMap<String, String>,
    ) -> Result<String, CredentialError> {
        if identifiers.get("username").map(String::as_str) == Some("alice")
            && credentials.get("password").map(String::as_str) == Some("p")
        {
            Ok("user-alice".into())
        } else {
            Err(CredentialError::InvalidCredentials)
        }
    }
}

struct StaticIssuer;

#[async_trait]
impl TokenIssuer for StaticIssuer {
    async fn issue(
        &self,
        user_id: &str,
        _app_id: &str,
        issuer: &str,
        _validity_secs: u64,
        _claims: HashMap<String, Value>,
    ) -> Result<String, TokenError> {
        Ok(format!("jwt;sub={user_id};iss={issuer}"))
    }
}

struct StaticOu;

#[async_trait]
impl thunder_core::provider::OrgUnitService for StaticOu {
    async fn get_ou(
        &self,
        ou_id: &str,
    ) -> Result<thunder_core::provider::OrgUnit, ProviderError> {
        Ok(thunder_core::provider::OrgUnit {
            id: ou_id.into(),
            name: "Root".into(),
            handle: "root".into(),
        })
    }
}

struct StaticApplications;

#[async_trait]
impl ApplicationProvider for StaticApplications {
    async fn get_application(&self, app_id: &str) -> Result<Application, ProviderError> {
        if app_id != "A1" {
            return Err(ProviderError::UserNotFound);
        }
        Ok(Application {
            id: "A1".into(),
            allowed_user_types: vec!["customer".into()],
            registration_enabled: true,
            ..Application::default()
        })
    }
}

struct StaticMetadata;

#[async_trait]
impl FlowMetadataProvider for StaticMetadata {
    async fn application_info(&self, app_id: &str) -> Result<Value, ProviderError> {
        Ok(json!({ "id": app_id, "name": "Demo App" }))
    }

    async fn org_unit_info(&self, _ou_id: &str) -> Result<Value, ProviderError> {
        Err(ProviderError::UserNotFound)
    }

    async fn design(
        &self,
        _target: MetaTargetType,
        _id: &str,
    ) -> Result<Value, ProviderError> {
        // The design subsystem is down; the section must be omitted
        Err(ProviderError::Server("design service unavailable".into()))
    }

    async fn translations(
        &self,
        language: &str,
        namespace: &str,
    ) -> Result<Value, ProviderError> {
        Ok(json!({ "language": language, "namespace": namespace }))
    }

    async fn languages(&self) -> Result<Vec<String>, ProviderError> {
        Ok(vec!["en".into(), "fr".into()])
    }
}

fn auth_flow_yaml_definition() -> Value {
    json!({
        "id": "file-auth",
        "handle": "auth_flow_config_basic",
        "name": "Declarative Login",
        "flowType": "AUTHENTICATION",
        "nodes": [
            { "id": "start", "type": "START", "onSuccess": "authenticate" },
            {
                "id": "authenticate",
                "type": "TASK_EXECUTION",
                "executor": { "name": "BasicAuthExecutor" },
                "onSuccess": "assert"
            },
            {
                "id": "assert",
                "type": "TASK_EXECUTION",
                "executor": { "name": "AuthAssertExecutor" },
                "onSuccess": "end"
            },
            { "id": "end", "type": "END" }
        ]
    })
}

async fn app() -> Router {
    let users = Arc::new(StaticUsers);
    let mut registry = ExecutorRegistry::new();
    registry.register(Arc::new(BasicAuthExecutor::new(
        users.clone(),
        Arc::new(StaticCredentials),
    )));
    registry.register(Arc::new(AuthAssertExecutor::new(
        users,
        Arc::new(StaticOu),
        Arc::new(StaticIssuer),
        AssertionDefaults {
            issuer: "thunder".into(),
            validity_secs: 3600,
        },
    )));

    let db = SqlxFlowStore::connect("sqlite::memory:").await.unwrap();
    let file_flow: thunder_core::flow::FlowDefinition =
        serde_json::from_value(auth_flow_yaml_definition()).unwrap();
    let file = FileFlowStore::from_definitions(vec![file_flow]);
    let store = Arc::new(CompositeFlowStore::new(Arc::new(db), Arc::new(file)));

    let engine = FlowEngine::new(
        Arc::new(registry),
        Arc::new(GraphCache::new(16)),
        Arc::new(InstanceStore::new(Duration::from_secs(900))),
        FlowExecutionConfig::default(),
    );

    let state = AppState {
        flows: Arc::new(FlowService::new(store, 100)),
        engine: Arc::new(engine),
        applications: Arc::new(StaticApplications),
        metadata: Arc::new(StaticMetadata),
        default_flows: DefaultFlowConfig::default(),
    };
    router(state)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_endpoint_is_up() {
    let app = app().await;
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");
}

#[tokio::test]
async fn flow_crud_round_trip() {
    let app = app().await;

    let definition = json!({
        "id": "",
        "handle": "my-login",
        "name": "My Login",
        "flowType": "AUTHENTICATION",
        "nodes": [
            { "id": "start", "type": "START", "onSuccess": "end" },
            { "id": "end", "type": "END" }
        ]
    });
    let (status, created) = send(&app, post_json("/flows", definition)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["activeVersion"], 1);

    let (status, listed) = send(
        &app,
        Request::get("/flows?type=AUTHENTICATION")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["totalElements"], 2); // file flow + created flow

    let mut updated = created.clone();
    updated["name"] = json!("Renamed");
    let (status, after_update) = send(
        &app,
        Request::put(format!("/flows/{id}"))
            .header("content-type", "application/json")
            .body(Body::from(updated.to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after_update["activeVersion"], 2);

    let (status, versions) = send(
        &app,
        Request::get(format!("/flows/{id}/versions"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(versions.as_array().unwrap().len(), 2);

    let (status, restored) = send(
        &app,
        post_json(&format!("/flows/{id}/restore"), json!({ "version": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(restored["name"], "My Login");
}

#[tokio::test]
async fn declarative_flows_reject_mutation_with_conflict() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Request::put("/flows/file-auth")
            .header("content-type", "application/json")
            .body(Body::from(auth_flow_yaml_definition().to_string()))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "FLOW_READ_ONLY");
    assert_eq!(body["message"], "flow is read-only");

    let (status, _) = send(
        &app,
        Request::delete("/flows/file-auth").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn execute_runs_the_default_authentication_flow() {
    let app = app().await;

    let (status, first) = send(
        &app,
        post_json(
            "/flow/execute",
            json!({ "applicationId": "A1", "flowType": "AUTHENTICATION" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "INCOMPLETE");
    let flow_id = first["flowId"].as_str().unwrap().to_string();
    let inputs: Vec<&str> = first["nextNode"]["inputs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["identifier"].as_str().unwrap())
        .collect();
    assert!(inputs.contains(&"username") && inputs.contains(&"password"));

    let (status, done) = send(
        &app,
        post_json(
            "/flow/execute",
            json!({
                "applicationId": "A1",
                "flowId": flow_id,
                "inputs": { "username": "alice", "password": "p" },
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "COMPLETE");
    assert!(done["assertion"].as_str().unwrap().contains("sub=user-alice"));
}

#[tokio::test]
async fn execute_requires_flow_type_or_flow_id() {
    let app = app().await;
    let (status, body) = send(
        &app,
        post_json("/flow/execute", json!({ "applicationId": "A1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "FLOW_TYPE_REQUIRED");
}

#[tokio::test]
async fn cancel_returns_no_content_and_drops_the_instance() {
    let app = app().await;
    let (_, first) = send(
        &app,
        post_json(
            "/flow/execute",
            json!({ "applicationId": "A1", "flowType": "AUTHENTICATION" }),
        ),
    )
    .await;
    let flow_id = first["flowId"].as_str().unwrap();

    let (status, _) = send(
        &app,
        Request::delete(format!("/flow/execute/{flow_id}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(
        &app,
        post_json(
            "/flow/execute",
            json!({ "applicationId": "A1", "flowId": flow_id }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "FLOW_INSTANCE_NOT_FOUND");
}

#[tokio::test]
async fn meta_aggregates_and_omits_failed_sections() {
    let app = app().await;
    let (status, body) = send(
        &app,
        Request::get("/flow/meta?type=APP&id=A1&language=en")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["application"]["name"], "Demo App");
    assert!(body.get("design").is_none());
    assert_eq!(body["translations"]["language"], "en");
    assert_eq!(body["languages"], json!(["en", "fr"]));
}

#[tokio::test]
async fn mcp_lists_and_calls_tools() {
    let app = app().await;

    let (status, body) = send(
        &app,
        post_json(
            "/mcp",
            json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let tools: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert!(tools.contains(&"thunder_list_flows"));
    assert!(tools.contains(&"thunder_update_flow"));

    let (_, body) = send(
        &app,
        post_json(
            "/mcp",
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": {
                    "name": "thunder_get_flow_by_handle",
                    "arguments": { "handle": "auth_flow_config_basic", "flowType": "AUTHENTICATION" },
                },
            }),
        ),
    )
    .await;
    assert_eq!(body["result"]["isError"], false);
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    let flow: Value = serde_json::from_str(text).unwrap();
    assert_eq!(flow["id"], "file-auth");

    let (_, body) = send(
        &app,
        post_json(
            "/mcp",
            json!({ "jsonrpc": "2.0", "id": 3, "method": "no/such" }),
        ),
    )
    .await;
    assert_eq!(body["error"]["code"], -32601);
}
