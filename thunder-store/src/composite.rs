use std::sync::Arc;

use async_trait::async_trait;
use thunder_core::flow::{FlowDefinition, FlowType};
use thunder_core::page::{Page, Pageable};

use crate::error::StoreError;
use crate::{FlowDefinitionStore, FlowVersion};

/// Unions the mutable database store with the read-only file store.
///
/// Reads consult the database first; lists merge both sets deduplicating by
/// id with the database winning. Writes always route to the database; the
/// service layer refuses mutation of file-origin definitions before they
/// reach this store.
pub struct CompositeFlowStore {
    db: Arc<dyn FlowDefinitionStore>,
    file: Arc<dyn FlowDefinitionStore>,
}

impl CompositeFlowStore {
    pub fn new(db: Arc<dyn FlowDefinitionStore>, file: Arc<dyn FlowDefinitionStore>) -> Self {
        Self { db, file }
    }

    /// Fetch the full definition set of a backing for merging.
    async fn full_list(
        store: &Arc<dyn FlowDefinitionStore>,
        flow_type: Option<FlowType>,
    ) -> Result<Vec<FlowDefinition>, StoreError> {
        let all = Pageable {
            page: 0,
            size: u32::MAX as u64,
        };
        Ok(store.list(flow_type, &all).await?.content)
    }
}

#[async_trait]
impl FlowDefinitionStore for CompositeFlowStore {
    async fn list(
        &self,
        flow_type: Option<FlowType>,
        pageable: &Pageable,
    ) -> Result<Page<FlowDefinition>, StoreError> {
        let db_flows = Self::full_list(&self.db, flow_type).await?;
        let file_flows = Self::full_list(&self.file, flow_type).await?;

        let mut merged = db_flows;
        for flow in file_flows {
            if !merged.iter().any(|existing| existing.id == flow.id) {
                merged.push(flow);
            }
        }
        merged.sort_by(|a, b| a.handle.cmp(&b.handle));

        let total = merged.len() as u64;
        let content = merged
            .into_iter()
            .skip(pageable.offset() as usize)
            .take(pageable.size as usize)
            .collect();
        Ok(Page::new(content, pageable, total))
    }

    async fn get(&self, id: &str) -> Result<FlowDefinition, StoreError> {
        match self.db.get(id).await {
            Err(StoreError::NotFound(_)) => self.file.get(id).await,
            other => other,
        }
    }

    async fn get_by_handle(
        &self,
        handle: &str,
        flow_type: FlowType,
    ) -> Result<FlowDefinition, StoreError> {
        match self.db.get_by_handle(handle, flow_type).await {
            Err(StoreError::NotFound(_)) => self.file.get_by_handle(handle, flow_type).await,
            other => other,
        }
    }

    async fn create(&self, definition: FlowDefinition) -> Result<FlowDefinition, StoreError> {
        self.db.create(definition).await
    }

    async fn update(
        &self,
        id: &str,
        definition: FlowDefinition,
    ) -> Result<FlowDefinition, StoreError> {
        self.db.update(id, definition).await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.db.delete(id).await
    }

    async fn list_versions(&self, id: &str) -> Result<Vec<FlowVersion>, StoreError> {
        match self.db.list_versions(id).await {
            Err(StoreError::NotFound(_)) => self.file.list_versions(id).await,
            other => other,
        }
    }

    async fn get_version(&self, id: &str, version: u32) -> Result<FlowDefinition, StoreError> {
        match self.db.get_version(id, version).await {
            Err(StoreError::NotFound(_)) => self.file.get_version(id, version).await,
            other => other,
        }
    }

    async fn restore(&self, id: &str, version: u32) -> Result<FlowDefinition, StoreError> {
        self.db.restore(id, version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlxFlowStore;
    use crate::file::FileFlowStore;
    use thunder_core::flow::{NodeDefinition, NodeType};

    fn definition(id: &str, handle: &str) -> FlowDefinition {
        let mut start = NodeDefinition::new("start", NodeType::Start);
        start.on_success = Some("end".into());
        FlowDefinition {
            id: id.into(),
            handle: handle.into(),
            name: handle.into(),
            flow_type: FlowType::Authentication,
            nodes: vec![start, NodeDefinition::new("end", NodeType::End)],
            active_version: 1,
            is_read_only: false,
        }
    }

    async fn composite() -> CompositeFlowStore {
        let db = SqlxFlowStore::connect("sqlite::memory:").await.unwrap();
        db.create(definition("d1", "db-flow")).await.unwrap();
        let file = FileFlowStore::from_definitions(vec![definition("f1", "file-flow")]);
        CompositeFlowStore::new(Arc::new(db), Arc::new(file))
    }

    #[tokio::test]
    async fn list_merges_both_backings_with_read_only_tags() {
        let store = composite().await;
        let page = store
            .list(None, &Pageable { page: 0, size: 10 })
            .await
            .unwrap();
        assert_eq!(page.total_elements, 2);

        let db_flow = page.content.iter().find(|f| f.id == "d1").unwrap();
        let file_flow = page.content.iter().find(|f| f.id == "f1").unwrap();
        assert!(!db_flow.is_read_only);
        assert!(file_flow.is_read_only);
    }

    #[tokio::test]
    async fn database_wins_on_duplicate_ids() {
        let db = SqlxFlowStore::connect("sqlite::memory:").await.unwrap();
        db.create(definition("shared", "db-flow")).await.unwrap();
        let file = FileFlowStore::from_definitions(vec![definition("shared", "file-flow")]);
        let store = CompositeFlowStore::new(Arc::new(db), Arc::new(file));

        let page = store
            .list(None, &Pageable { page: 0, size: 10 })
            .await
            .unwrap();
        assert_eq!(page.total_elements, 1);
        assert_eq!(page.content[0].handle, "db-flow");
        assert!(!page.content[0].is_read_only);
    }

    #[tokio::test]
    async fn reads_fall_through_to_the_file_store() {
        let store = composite().await;
        let flow = store.get("f1").await.unwrap();
        assert!(flow.is_read_only);
        let flow = store
            .get_by_handle("file-flow", FlowType::Authentication)
            .await
            .unwrap();
        assert_eq!(flow.id, "f1");
    }

    #[tokio::test]
    async fn writes_route_to_the_database() {
        let store = composite().await;
        let created = store.create(definition("d2", "another")).await.unwrap();
        assert!(!created.is_read_only);
        assert_eq!(store.get("d2").await.unwrap().handle, "another");
    }
}
