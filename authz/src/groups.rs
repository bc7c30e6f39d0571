//! Persistence for per-gateway admin groups.
//!
//! The engine creates the groups themselves in the sharing registry; this
//! store only remembers which group ids belong to a gateway so the lazy
//! initialization runs once.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{AuthzError, Result};
use crate::types::GatewayGroups;

#[async_trait]
pub trait GatewayGroupsStore: Send + Sync {
    async fn get(&self, gateway_id: &str) -> Result<Option<GatewayGroups>>;

    async fn put(&self, groups: GatewayGroups) -> Result<()>;
}

/// In-memory [`GatewayGroupsStore`].
#[derive(Default)]
pub struct MemoryGatewayGroupsStore {
    groups: RwLock<HashMap<String, GatewayGroups>>,
}

impl MemoryGatewayGroupsStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GatewayGroupsStore for MemoryGatewayGroupsStore {
    async fn get(&self, gateway_id: &str) -> Result<Option<GatewayGroups>> {
        Ok(self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(gateway_id)
            .cloned())
    }

    async fn put(&self, groups: GatewayGroups) -> Result<()> {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(groups.gateway_id.clone(), groups);
        Ok(())
    }
}

/// SQLite-backed [`GatewayGroupsStore`].
pub struct SqliteGatewayGroupsStore {
    pool: Pool<Sqlite>,
}

impl SqliteGatewayGroupsStore {
    pub async fn connect(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AuthzError::Unavailable(e.to_string()))?;
        }
        let pool = SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(database_path)
                .create_if_missing(true),
        )
        .await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        debug!("Running gateway groups migrations");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gateway_groups (
                gateway_id TEXT PRIMARY KEY,
                admins_group_id TEXT NOT NULL,
                read_only_admins_group_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl GatewayGroupsStore for SqliteGatewayGroupsStore {
    async fn get(&self, gateway_id: &str) -> Result<Option<GatewayGroups>> {
        let row = sqlx::query_as::<_, (String, String, String)>(
            "SELECT gateway_id, admins_group_id, read_only_admins_group_id FROM gateway_groups WHERE gateway_id = ?",
        )
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(gateway_id, admins_group_id, read_only_admins_group_id)| GatewayGroups {
                gateway_id,
                admins_group_id,
                read_only_admins_group_id,
            },
        ))
    }

    async fn put(&self, groups: GatewayGroups) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO gateway_groups
                (gateway_id, admins_group_id, read_only_admins_group_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&groups.gateway_id)
        .bind(&groups.admins_group_id)
        .bind(&groups.read_only_admins_group_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
