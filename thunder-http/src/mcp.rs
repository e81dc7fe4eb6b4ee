//! MCP tool surface speaking a JSON-RPC 2.0 subset over `POST /mcp`.
//!
//! Mirrors the flow management HTTP surface with structured tool schemas so
//! MCP clients can list and mutate flow definitions.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use thunder_core::error::ServiceError;
use thunder_core::flow::{FlowDefinition, FlowType};
use thunder_core::page::Pageable;
use tracing::debug;

use crate::AppState;

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn rpc_result(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn rpc_error(id: Value, code: i64, message: &str) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message } })
}

/// Wrap a tool outcome in MCP content.
fn tool_result(payload: Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": payload.to_string() }],
        "isError": false,
    })
}

fn tool_failure(err: &ServiceError) -> Value {
    json!({
        "content": [{ "type": "text", "text": err.to_string() }],
        "isError": true,
    })
}

fn tool_definitions() -> Value {
    let flow_type_schema = json!({
        "type": "string",
        "enum": ["AUTHENTICATION", "REGISTRATION", "USER_ONBOARDING"],
    });
    json!({ "tools": [
        {
            "name": "thunder_list_flows",
            "description": "List flow definitions, optionally filtered by flow type.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "flowType": flow_type_schema,
                    "page": { "type": "integer", "minimum": 0 },
                    "size": { "type": "integer", "minimum": 1 },
                },
            },
        },
        {
            "name": "thunder_get_flow_by_handle",
            "description": "Fetch a flow definition by its handle and flow type.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "handle": { "type": "string" },
                    "flowType": flow_type_schema,
                },
                "required": ["handle", "flowType"],
            },
        },
        {
            "name": "thunder_get_flow_by_id",
            "description": "Fetch a flow definition by id.",
            "inputSchema": {
                "type": "object",
                "properties": { "id": { "type": "string" } },
                "required": ["id"],
            },
        },
        {
            "name": "thunder_create_flow",
            "description": "Create a new flow definition.",
            "inputSchema": {
                "type": "object",
                "properties": { "definition": { "type": "object" } },
                "required": ["definition"],
            },
        },
        {
            "name": "thunder_update_flow",
            "description": "Update an existing flow definition, creating a new version.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "definition": { "type": "object" },
                },
                "required": ["id", "definition"],
            },
        },
    ]})
}

fn parse_flow_type(value: Option<&Value>) -> Result<Option<FlowType>, ServiceError> {
    match value.and_then(Value::as_str) {
        Some(raw) => raw
            .parse::<FlowType>()
            .map(Some)
            .map_err(|_| {
                ServiceError::bad_request(
                    "FLOW_TYPE_INVALID",
                    format!("'{raw}' is not a valid flow type"),
                )
            }),
        None => Ok(None),
    }
}

fn parse_definition(value: Option<&Value>) -> Result<FlowDefinition, ServiceError> {
    let value = value.ok_or_else(|| {
        ServiceError::bad_request("MCP_ARGUMENT_MISSING", "'definition' argument is required")
    })?;
    serde_json::from_value(value.clone()).map_err(|e| {
        ServiceError::bad_request("FLOW_DEFINITION_INVALID", format!("Invalid definition: {e}"))
    })
}

fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, ServiceError> {
    args.get(name).and_then(Value::as_str).ok_or_else(|| {
        ServiceError::bad_request(
            "MCP_ARGUMENT_MISSING",
            format!("'{name}' argument is required"),
        )
    })
}

async fn call_tool(state: &AppState, name: &str, args: &Value) -> Result<Value, ServiceError> {
    match name {
        "thunder_list_flows" => {
            let flow_type = parse_flow_type(args.get("flowType"))?;
            let pageable = Pageable {
                page: args.get("page").and_then(Value::as_u64).unwrap_or(0),
                size: args.get("size").and_then(Value::as_u64).unwrap_or(20),
            };
            let page = state.flows.list(flow_type, pageable).await?;
            Ok(serde_json::to_value(page).unwrap_or(Value::Null))
        }
        "thunder_get_flow_by_handle" => {
            let handle = required_str(args, "handle")?;
            let flow_type = parse_flow_type(args.get("flowType"))?.ok_or_else(|| {
                ServiceError::bad_request("MCP_ARGUMENT_MISSING", "'flowType' argument is required")
            })?;
            let flow = state.flows.get_by_handle(handle, flow_type).await?;
            Ok(serde_json::to_value(flow).unwrap_or(Value::Null))
        }
        "thunder_get_flow_by_id" => {
            let id = required_str(args, "id")?;
            let flow = state.flows.get(id).await?;
            Ok(serde_json::to_value(flow).unwrap_or(Value::Null))
        }
        "thunder_create_flow" => {
            let definition = parse_definition(args.get("definition"))?;
            let created = state.flows.create(definition).await?;
            Ok(serde_json::to_value(created).unwrap_or(Value::Null))
        }
        "thunder_update_flow" => {
            let id = required_str(args, "id")?;
            let definition = parse_definition(args.get("definition"))?;
            let updated = state.flows.update(id, definition).await?;
            Ok(serde_json::to_value(updated).unwrap_or(Value::Null))
        }
        other => Err(ServiceError::bad_request(
            "MCP_UNKNOWN_TOOL",
            format!("Unknown tool '{other}'"),
        )),
    }
}

/// `POST /mcp`: JSON-RPC dispatch for the MCP tool surface.
pub async fn handle_rpc(
    State(state): State<AppState>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    debug!(method = %request.method, "MCP request");
    let id = request.id.clone();
    let response = match request.method.as_str() {
        "initialize" => rpc_result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "serverInfo": { "name": "thunder", "version": env!("CARGO_PKG_VERSION") },
                "capabilities": { "tools": {} },
            }),
        ),
        "tools/list" => rpc_result(id, tool_definitions()),
        "tools/call" => {
            let name = request
                .params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let empty = json!({});
            let args = request.params.get("arguments").unwrap_or(&empty);
            match call_tool(&state, name, args).await {
                Ok(payload) => rpc_result(id, tool_result(payload)),
                Err(err) => rpc_result(id, tool_failure(&err)),
            }
        }
        "notifications/initialized" | "ping" => rpc_result(id, json!({})),
        other => rpc_error(id, -32601, &format!("Method '{other}' not found")),
    };
    Json(response)
}
