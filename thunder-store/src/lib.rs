//! Flow definition stores.
//!
//! Three backings implement [`FlowDefinitionStore`]: the sqlx-backed mutable
//! store with version history, the read-only YAML file store for declarative
//! deployments, and a composite that unions the two with the database
//! winning on conflicts. [`FlowService`] wraps the selected backing with
//! handle validation and read-only enforcement.

mod composite;
mod db;
mod error;
mod file;
mod service;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thunder_core::flow::{FlowDefinition, FlowType};
use thunder_core::page::{Page, Pageable};

pub use composite::CompositeFlowStore;
pub use db::SqlxFlowStore;
pub use error::StoreError;
pub use file::FileFlowStore;
pub use service::{open_store, FlowService};

/// A historical version record of a flow definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowVersion {
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

/// Persistence contract for flow definitions and their version history.
#[async_trait]
pub trait FlowDefinitionStore: Send + Sync {
    async fn list(
        &self,
        flow_type: Option<FlowType>,
        pageable: &Pageable,
    ) -> Result<Page<FlowDefinition>, StoreError>;

    async fn get(&self, id: &str) -> Result<FlowDefinition, StoreError>;

    async fn get_by_handle(
        &self,
        handle: &str,
        flow_type: FlowType,
    ) -> Result<FlowDefinition, StoreError>;

    async fn create(&self, definition: FlowDefinition) -> Result<FlowDefinition, StoreError>;

    async fn update(
        &self,
        id: &str,
        definition: FlowDefinition,
    ) -> Result<FlowDefinition, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;

    async fn list_versions(&self, id: &str) -> Result<Vec<FlowVersion>, StoreError>;

    async fn get_version(&self, id: &str, version: u32) -> Result<FlowDefinition, StoreError>;

    /// Copy a historical version's payload into a new active version.
    async fn restore(&self, id: &str, version: u32) -> Result<FlowDefinition, StoreError>;
}
