use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use thunder_core::error::ServiceError;
use thunder_core::provider::ProviderError;
use tracing::warn;

use crate::error::ApiError;
use crate::AppState;

/// What the metadata aggregation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MetaTargetType {
    #[serde(rename = "APP")]
    App,
    #[serde(rename = "OU")]
    Ou,
}

/// Aggregated UI metadata collaborator.
///
/// Theme, layout, and i18n live outside the engine; the front door only
/// aggregates whatever this provider can supply, omitting sections that
/// fail.
#[async_trait]
pub trait FlowMetadataProvider: Send + Sync {
    async fn application_info(&self, app_id: &str) -> Result<serde_json::Value, ProviderError>;

    async fn org_unit_info(&self, ou_id: &str) -> Result<serde_json::Value, ProviderError>;

    /// Theme and layout for the target.
    async fn design(
        &self,
        target: MetaTargetType,
        id: &str,
    ) -> Result<serde_json::Value, ProviderError>;

    async fn translations(
        &self,
        language: &str,
        namespace: &str,
    ) -> Result<serde_json::Value, ProviderError>;

    async fn languages(&self) -> Result<Vec<String>, ProviderError>;
}

#[derive(Debug, Deserialize)]
pub struct MetaQuery {
    #[serde(rename = "type")]
    pub target: MetaTargetType,
    pub id: String,
    pub language: Option<String>,
    pub namespace: Option<String>,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_unit: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translations: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,
}

/// `GET /flow/meta`: aggregate UI metadata for a flow client.
///
/// Optional-subsystem failures (design, i18n) are logged and their section
/// omitted; only a missing primary target is an error.
pub async fn flow_meta(
    State(state): State<AppState>,
    Query(query): Query<MetaQuery>,
) -> Result<Json<MetaResponse>, ApiError> {
    let provider = &state.metadata;
    let mut response = MetaResponse::default();

    match query.target {
        MetaTargetType::App => {
            let info = provider.application_info(&query.id).await.map_err(|e| {
                ServiceError::not_found(
                    "APPLICATION_NOT_FOUND",
                    format!("Application '{}' not found: {e}", query.id),
                )
            })?;
            response.application = Some(info);
        }
        MetaTargetType::Ou => {
            let info = provider.org_unit_info(&query.id).await.map_err(|e| {
                ServiceError::not_found(
                    "OU_NOT_FOUND",
                    format!("Organisation unit '{}' not found: {e}", query.id),
                )
            })?;
            response.org_unit = Some(info);
        }
    }

    match provider.design(query.target, &query.id).await {
        Ok(design) => response.design = Some(design),
        Err(err) => warn!(id = %query.id, error = %err, "Design metadata unavailable"),
    }

    if let Some(language) = &query.language {
        let namespace = query.namespace.as_deref().unwrap_or("flows");
        match provider.translations(language, namespace).await {
            Ok(translations) => response.translations = Some(translations),
            Err(err) => {
                warn!(language = %language, error = %err, "Translations unavailable")
            }
        }
    }

    match provider.languages().await {
        Ok(languages) => response.languages = Some(languages),
        Err(err) => warn!(error = %err, "Language list unavailable"),
    }

    Ok(Json(response))
}
