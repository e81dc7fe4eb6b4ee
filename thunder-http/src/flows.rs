use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use thunder_core::error::ServiceError;
use thunder_core::flow::{FlowDefinition, FlowType};
use thunder_core::page::{Page, Pageable};
use thunder_store::FlowVersion;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub flow_type: Option<String>,
    pub page: Option<u64>,
    pub size: Option<u64>,
}

impl ListQuery {
    fn pageable(&self) -> Pageable {
        let defaults = Pageable::default();
        Pageable {
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
        }
    }
}

fn parse_flow_type(raw: &str) -> Result<FlowType, ApiError> {
    raw.parse::<FlowType>().map_err(|_| {
        ServiceError::bad_request(
            "FLOW_TYPE_INVALID",
            format!("'{raw}' is not a valid flow type"),
        )
        .into()
    })
}

pub async fn list_flows(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<FlowDefinition>>, ApiError> {
    let flow_type = query
        .flow_type
        .as_deref()
        .map(parse_flow_type)
        .transpose()?;
    let page = state.flows.list(flow_type, query.pageable()).await?;
    Ok(Json(page))
}

pub async fn create_flow(
    State(state): State<AppState>,
    Json(definition): Json<FlowDefinition>,
) -> Result<(StatusCode, Json<FlowDefinition>), ApiError> {
    let created = state.flows.create(definition).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FlowDefinition>, ApiError> {
    Ok(Json(state.flows.get(&id).await?))
}

pub async fn update_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(definition): Json<FlowDefinition>,
) -> Result<Json<FlowDefinition>, ApiError> {
    Ok(Json(state.flows.update(&id, definition).await?))
}

pub async fn delete_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.flows.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<FlowVersion>>, ApiError> {
    Ok(Json(state.flows.list_versions(&id).await?))
}

pub async fn get_version(
    State(state): State<AppState>,
    Path((id, version)): Path<(String, u32)>,
) -> Result<Json<FlowDefinition>, ApiError> {
    Ok(Json(state.flows.get_version(&id, version).await?))
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub version: u32,
}

pub async fn restore_flow(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RestoreRequest>,
) -> Result<Json<FlowDefinition>, ApiError> {
    Ok(Json(state.flows.restore(&id, request.version).await?))
}
