use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use thunder_core::flow::{FlowDefinition, FlowType};
use thunder_core::page::{Page, Pageable};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::{FlowDefinitionStore, FlowVersion};

/// Immutable flow store backed by YAML resource files.
///
/// Resources are loaded once at startup; every definition is tagged
/// read-only and all write operations are refused.
pub struct FileFlowStore {
    flows: HashMap<String, FlowDefinition>,
}

impl FileFlowStore {
    /// Load every `*.yaml`/`*.yml` file under `dir`. Files that fail to
    /// parse are skipped with a warning; a missing directory yields an empty
    /// store.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        let mut flows = HashMap::new();
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Declarative flow directory missing, starting empty");
            return Ok(Self { flows });
        }
        let entries = std::fs::read_dir(dir)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        for entry in entries {
            let path = entry
                .map_err(|e| StoreError::Serialization(e.to_string()))?
                .path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                continue;
            }
            match Self::load_file(&path) {
                Ok(definition) => {
                    info!(
                        file = %path.display(),
                        flow_id = %definition.id,
                        handle = %definition.handle,
                        "Loaded declarative flow"
                    );
                    flows.insert(definition.id.clone(), definition);
                }
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "Skipping unparsable flow resource");
                }
            }
        }
        Ok(Self { flows })
    }

    fn load_file(path: &Path) -> Result<FlowDefinition, StoreError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut definition: FlowDefinition = serde_yaml::from_str(&content)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        definition.is_read_only = true;
        Ok(definition)
    }

    /// Build a store from in-memory definitions (used by the composite-store
    /// tests).
    pub fn from_definitions(definitions: Vec<FlowDefinition>) -> Self {
        let flows = definitions
            .into_iter()
            .map(|mut d| {
                d.is_read_only = true;
                (d.id.clone(), d)
            })
            .collect();
        Self { flows }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[async_trait]
impl FlowDefinitionStore for FileFlowStore {
    async fn list(
        &self,
        flow_type: Option<FlowType>,
        pageable: &Pageable,
    ) -> Result<Page<FlowDefinition>, StoreError> {
        let mut matching: Vec<FlowDefinition> = self
            .flows
            .values()
            .filter(|d| flow_type.is_none_or(|t| d.flow_type == t))
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.handle.cmp(&b.handle));
        let total = matching.len() as u64;
        let content = matching
            .into_iter()
            .skip(pageable.offset() as usize)
            .take(pageable.size as usize)
            .collect();
        Ok(Page::new(content, pageable, total))
    }

    async fn get(&self, id: &str) -> Result<FlowDefinition, StoreError> {
        self.flows
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn get_by_handle(
        &self,
        handle: &str,
        flow_type: FlowType,
    ) -> Result<FlowDefinition, StoreError> {
        self.flows
            .values()
            .find(|d| d.handle == handle && d.flow_type == flow_type)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(handle.to_string()))
    }

    async fn create(&self, _definition: FlowDefinition) -> Result<FlowDefinition, StoreError> {
        Err(StoreError::Unsupported("create on declarative store"))
    }

    async fn update(
        &self,
        _id: &str,
        _definition: FlowDefinition,
    ) -> Result<FlowDefinition, StoreError> {
        Err(StoreError::Unsupported("update on declarative store"))
    }

    async fn delete(&self, _id: &str) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("delete on declarative store"))
    }

    async fn list_versions(&self, id: &str) -> Result<Vec<FlowVersion>, StoreError> {
        let definition = self.get(id).await?;
        Ok(vec![FlowVersion {
            version: definition.active_version,
            created_at: Utc::now(),
        }])
    }

    async fn get_version(&self, id: &str, version: u32) -> Result<FlowDefinition, StoreError> {
        let definition = self.get(id).await?;
        if definition.active_version == version {
            Ok(definition)
        } else {
            Err(StoreError::VersionNotFound {
                id: id.to_string(),
                version,
            })
        }
    }

    async fn restore(&self, _id: &str, _version: u32) -> Result<FlowDefinition, StoreError> {
        Err(StoreError::Unsupported("restore on declarative store"))
    }
}
