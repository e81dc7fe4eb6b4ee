use std::sync::Arc;

use thunder_core::config::{StoreMode, ThunderConfig};
use thunder_core::error::ServiceError;
use thunder_core::flow::{is_valid_handle, FlowDefinition, FlowType};
use thunder_core::page::{Page, Pageable};
use tracing::info;
use uuid::Uuid;

use crate::composite::CompositeFlowStore;
use crate::db::SqlxFlowStore;
use crate::error::StoreError;
use crate::file::FileFlowStore;
use crate::{FlowDefinitionStore, FlowVersion};

/// Build the flow definition store selected by configuration.
pub async fn open_store(
    config: &ThunderConfig,
) -> Result<Arc<dyn FlowDefinitionStore>, StoreError> {
    let mode = config.store_mode();
    info!(?mode, "Opening flow definition store");
    match mode {
        StoreMode::Mutable => {
            let db = SqlxFlowStore::connect(&config.database.url).await?;
            Ok(Arc::new(db))
        }
        StoreMode::Declarative => {
            let file = FileFlowStore::load(&config.declarative_resources.dir)?;
            Ok(Arc::new(file))
        }
        StoreMode::Composite => {
            let db = SqlxFlowStore::connect(&config.database.url).await?;
            let file = FileFlowStore::load(&config.declarative_resources.dir)?;
            Ok(Arc::new(CompositeFlowStore::new(
                Arc::new(db),
                Arc::new(file),
            )))
        }
    }
}

/// Service layer over the selected definition store: handle validation,
/// read-only enforcement, pagination clamping.
pub struct FlowService {
    store: Arc<dyn FlowDefinitionStore>,
    max_page_size: u64,
}

impl FlowService {
    pub fn new(store: Arc<dyn FlowDefinitionStore>, max_page_size: u64) -> Self {
        Self {
            store,
            max_page_size,
        }
    }

    fn validate(definition: &FlowDefinition) -> Result<(), ServiceError> {
        if !is_valid_handle(&definition.handle) {
            return Err(ServiceError::bad_request(
                "FLOW_HANDLE_INVALID",
                format!("'{}' is not a valid flow handle", definition.handle),
            ));
        }
        if definition.name.trim().is_empty() {
            return Err(ServiceError::bad_request(
                "FLOW_NAME_EMPTY",
                "Flow name must not be empty",
            ));
        }
        if definition.nodes.is_empty() {
            return Err(ServiceError::bad_request(
                "FLOW_NODES_EMPTY",
                "Flow must define at least one node",
            ));
        }
        Ok(())
    }

    /// Refuse mutation of declarative-origin definitions without touching
    /// storage.
    async fn ensure_mutable(&self, id: &str) -> Result<FlowDefinition, ServiceError> {
        let existing = self.store.get(id).await.map_err(ServiceError::from)?;
        if existing.is_read_only {
            return Err(StoreError::ReadOnly(id.to_string()).into());
        }
        Ok(existing)
    }

    pub async fn list(
        &self,
        flow_type: Option<FlowType>,
        pageable: Pageable,
    ) -> Result<Page<FlowDefinition>, ServiceError> {
        let pageable = pageable.clamped(self.max_page_size);
        self.store
            .list(flow_type, &pageable)
            .await
            .map_err(ServiceError::from)
    }

    pub async fn get(&self, id: &str) -> Result<FlowDefinition, ServiceError> {
        self.store.get(id).await.map_err(ServiceError::from)
    }

    pub async fn get_by_handle(
        &self,
        handle: &str,
        flow_type: FlowType,
    ) -> Result<FlowDefinition, ServiceError> {
        self.store
            .get_by_handle(handle, flow_type)
            .await
            .map_err(ServiceError::from)
    }

    pub async fn create(
        &self,
        mut definition: FlowDefinition,
    ) -> Result<FlowDefinition, ServiceError> {
        Self::validate(&definition)?;
        if definition.id.is_empty() {
            definition.id = Uuid::now_v7().to_string();
        }
        self.store.create(definition).await.map_err(ServiceError::from)
    }

    pub async fn update(
        &self,
        id: &str,
        definition: FlowDefinition,
    ) -> Result<FlowDefinition, ServiceError> {
        Self::validate(&definition)?;
        self.ensure_mutable(id).await?;
        self.store
            .update(id, definition)
            .await
            .map_err(ServiceError::from)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        self.ensure_mutable(id).await?;
        self.store.delete(id).await.map_err(ServiceError::from)
    }

    pub async fn list_versions(&self, id: &str) -> Result<Vec<FlowVersion>, ServiceError> {
        self.store.list_versions(id).await.map_err(ServiceError::from)
    }

    pub async fn get_version(
        &self,
        id: &str,
        version: u32,
    ) -> Result<FlowDefinition, ServiceError> {
        self.store
            .get_version(id, version)
            .await
            .map_err(ServiceError::from)
    }

    pub async fn restore(
        &self,
        id: &str,
        version: u32,
    ) -> Result<FlowDefinition, ServiceError> {
        self.ensure_mutable(id).await?;
        self.store
            .restore(id, version)
            .await
            .map_err(ServiceError::from)
    }
}
