use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use thunder_core::flow::{FlowDefinition, FlowType};
use thunder_core::page::{Page, Pageable};
use tracing::debug;

use crate::error::StoreError;
use crate::{FlowDefinitionStore, FlowVersion};

/// Database-backed mutable flow store with full CRUD and version history.
///
/// Definitions are persisted as a JSON payload column; every update archives
/// the previous payload under its version number so it can be restored.
pub struct SqlxFlowStore {
    pool: SqlitePool,
}

impl SqlxFlowStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and initialise the schema.
    ///
    /// In-memory databases are pinned to a single connection; a pool of
    /// `:memory:` connections would otherwise each see their own database.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let mut options = SqlitePoolOptions::new();
        if url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = options.connect(url).await.map_err(StoreError::database)?;
        let store = Self::new(pool);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS flows (
                id TEXT PRIMARY KEY,
                handle TEXT NOT NULL,
                flow_type TEXT NOT NULL,
                name TEXT NOT NULL,
                payload TEXT NOT NULL,
                active_version INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_flows_handle
             ON flows (handle, flow_type)",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS flow_versions (
                flow_id TEXT NOT NULL,
                version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (flow_id, version)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    fn encode(definition: &FlowDefinition) -> Result<String, StoreError> {
        serde_json::to_string(definition).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn decode(payload: &str) -> Result<FlowDefinition, StoreError> {
        serde_json::from_str(payload).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    async fn handle_taken(
        &self,
        handle: &str,
        flow_type: FlowType,
        exclude_id: Option<&str>,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT id FROM flows WHERE handle = ?1 AND flow_type = ?2",
        )
        .bind(handle)
        .bind(flow_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(match row {
            Some(row) => {
                let id: String = row.get("id");
                exclude_id != Some(id.as_str())
            }
            None => false,
        })
    }

    async fn archive_version(
        &self,
        id: &str,
        version: u32,
        payload: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO flow_versions (flow_id, version, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id)
        .bind(version as i64)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        Ok(())
    }

    /// Persist `definition` as the new active version of `id`.
    async fn write_new_version(
        &self,
        id: &str,
        mut definition: FlowDefinition,
        current_version: u32,
    ) -> Result<FlowDefinition, StoreError> {
        definition.id = id.to_string();
        definition.active_version = current_version + 1;
        definition.is_read_only = false;
        let payload = Self::encode(&definition)?;
        sqlx::query(
            "UPDATE flows
             SET handle = ?2, flow_type = ?3, name = ?4, payload = ?5,
                 active_version = ?6, updated_at = ?7
             WHERE id = ?1",
        )
        .bind(id)
        .bind(&definition.handle)
        .bind(definition.flow_type.as_str())
        .bind(&definition.name)
        .bind(&payload)
        .bind(definition.active_version as i64)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        self.archive_version(id, definition.active_version, &payload)
            .await?;
        debug!(flow_id = %id, version = definition.active_version, "Flow definition updated");
        Ok(definition)
    }
}

#[async_trait]
impl FlowDefinitionStore for SqlxFlowStore {
    async fn list(
        &self,
        flow_type: Option<FlowType>,
        pageable: &Pageable,
    ) -> Result<Page<FlowDefinition>, StoreError> {
        let (count_sql, list_sql) = match flow_type {
            Some(_) => (
                "SELECT COUNT(*) AS n FROM flows WHERE flow_type = ?1",
                "SELECT payload FROM flows WHERE flow_type = ?1
                 ORDER BY handle LIMIT ?2 OFFSET ?3",
            ),
            None => (
                "SELECT COUNT(*) AS n FROM flows",
                "SELECT payload FROM flows ORDER BY handle LIMIT ?1 OFFSET ?2",
            ),
        };

        let mut count_query = sqlx::query(count_sql);
        let mut list_query = sqlx::query(list_sql);
        if let Some(flow_type) = flow_type {
            count_query = count_query.bind(flow_type.as_str());
            list_query = list_query.bind(flow_type.as_str());
        }
        list_query = list_query
            .bind(pageable.size as i64)
            .bind(pageable.offset() as i64);

        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::database)?
            .get("n");
        let rows = list_query
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::database)?;
        let content = rows
            .iter()
            .map(|row| Self::decode(row.get::<String, _>("payload").as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Page::new(content, pageable, total as u64))
    }

    async fn get(&self, id: &str) -> Result<FlowDefinition, StoreError> {
        let row = sqlx::query("SELECT payload FROM flows WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::database)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Self::decode(row.get::<String, _>("payload").as_str())
    }

    async fn get_by_handle(
        &self,
        handle: &str,
        flow_type: FlowType,
    ) -> Result<FlowDefinition, StoreError> {
        let row = sqlx::query(
            "SELECT payload FROM flows WHERE handle = ?1 AND flow_type = ?2",
        )
        .bind(handle)
        .bind(flow_type.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?
        .ok_or_else(|| StoreError::NotFound(handle.to_string()))?;
        Self::decode(row.get::<String, _>("payload").as_str())
    }

    async fn create(&self, mut definition: FlowDefinition) -> Result<FlowDefinition, StoreError> {
        if self
            .handle_taken(&definition.handle, definition.flow_type, None)
            .await?
        {
            return Err(StoreError::HandleTaken {
                handle: definition.handle,
                flow_type: definition.flow_type,
            });
        }

        definition.active_version = 1;
        definition.is_read_only = false;
        let payload = Self::encode(&definition)?;
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO flows
                 (id, handle, flow_type, name, payload, active_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        )
        .bind(&definition.id)
        .bind(&definition.handle)
        .bind(definition.flow_type.as_str())
        .bind(&definition.name)
        .bind(&payload)
        .bind(definition.active_version as i64)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;
        self.archive_version(&definition.id, 1, &payload).await?;
        debug!(flow_id = %definition.id, handle = %definition.handle, "Flow definition created");
        Ok(definition)
    }

    async fn update(
        &self,
        id: &str,
        definition: FlowDefinition,
    ) -> Result<FlowDefinition, StoreError> {
        let existing = self.get(id).await?;
        if definition.handle != existing.handle
            && self
                .handle_taken(&definition.handle, definition.flow_type, Some(id))
                .await?
        {
            return Err(StoreError::HandleTaken {
                handle: definition.handle,
                flow_type: definition.flow_type,
            });
        }
        self.write_new_version(id, definition, existing.active_version)
            .await
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM flows WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        sqlx::query("DELETE FROM flow_versions WHERE flow_id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::database)?;
        Ok(())
    }

    async fn list_versions(&self, id: &str) -> Result<Vec<FlowVersion>, StoreError> {
        // Surface NotFound for unknown flows rather than an empty list
        self.get(id).await?;
        let rows = sqlx::query(
            "SELECT version, created_at FROM flow_versions
             WHERE flow_id = ?1 ORDER BY version",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::database)?;
        rows.iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?
                    .with_timezone(&Utc);
                Ok(FlowVersion {
                    version: row.get::<i64, _>("version") as u32,
                    created_at,
                })
            })
            .collect()
    }

    async fn get_version(&self, id: &str, version: u32) -> Result<FlowDefinition, StoreError> {
        let row = sqlx::query(
            "SELECT payload FROM flow_versions WHERE flow_id = ?1 AND version = ?2",
        )
        .bind(id)
        .bind(version as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?
        .ok_or(StoreError::VersionNotFound {
            id: id.to_string(),
            version,
        })?;
        Self::decode(row.get::<String, _>("payload").as_str())
    }

    async fn restore(&self, id: &str, version: u32) -> Result<FlowDefinition, StoreError> {
        let current = self.get(id).await?;
        let historical = self.get_version(id, version).await?;
        self.write_new_version(id, historical, current.active_version)
            .await
    }
}
