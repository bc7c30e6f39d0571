//! SQLite-backed sharing registry.

use std::collections::HashSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::{Result, SharingError};
use crate::ids::{EntityTypeId, PermissionId, PrincipalId};
use crate::registry::SharingRegistry;
use crate::types::{
    Domain, Entity, EntitySearchField, EntityType, PermissionType, RegistryUser, SearchCondition,
    SearchCriteria, UserGroup,
};

/// A [`SharingRegistry`] backed by a SQLite database.
pub struct SqliteSharingRegistry {
    pool: Pool<Sqlite>,
}

impl SqliteSharingRegistry {
    /// Open (creating if missing) the registry database at the given path.
    pub async fn connect(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SharingError::Unavailable(e.to_string()))?;
        }

        info!("Opening sharing registry at: {}", database_path.display());

        let pool = SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(database_path)
                .create_if_missing(true),
        )
        .await?;

        Self::from_pool(pool).await
    }

    /// Build a registry over an existing pool, running migrations.
    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let registry = Self { pool };
        registry.run_migrations().await?;
        Ok(registry)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        debug!("Running sharing registry migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_domains (
                domain_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_entity_types (
                entity_type_id TEXT PRIMARY KEY,
                domain_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_permission_types (
                permission_type_id TEXT PRIMARY KEY,
                domain_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_users (
                user_id TEXT PRIMARY KEY,
                domain_id TEXT NOT NULL,
                user_name TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_groups (
                group_id TEXT PRIMARY KEY,
                domain_id TEXT NOT NULL,
                name TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                description TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_group_members (
                domain_id TEXT NOT NULL,
                group_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                PRIMARY KEY (group_id, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_entities (
                entity_id TEXT PRIMARY KEY,
                domain_id TEXT NOT NULL,
                entity_type_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                created_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sharing_grants (
                domain_id TEXT NOT NULL,
                entity_id TEXT NOT NULL,
                grantee_id TEXT NOT NULL,
                grantee_kind TEXT NOT NULL CHECK (grantee_kind IN ('USER', 'GROUP')),
                permission_type_id TEXT NOT NULL,
                cascade_flag INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (entity_id, grantee_id, grantee_kind, permission_type_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Indexes for the access-check and search paths
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_grants_entity ON sharing_grants(entity_id, permission_type_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_entities_type ON sharing_entities(domain_id, entity_type_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_group_members_user ON sharing_group_members(domain_id, user_id)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Sharing registry migrations completed");

        Ok(())
    }

    async fn exists(&self, sql: &str, key: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(sql)
            .bind(key)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    fn row_to_entity(
        row: (
            String,
            String,
            String,
            String,
            String,
            Option<String>,
            NaiveDateTime,
        ),
    ) -> Result<Entity> {
        Ok(Entity {
            entity_id: row.0,
            domain_id: row.1,
            entity_type_id: EntityTypeId::parse(&row.2)?,
            owner_id: PrincipalId::parse(&row.3)?,
            name: row.4,
            description: row.5,
            created_at: row.6,
        })
    }
}

type EntityRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    NaiveDateTime,
);

#[async_trait]
impl SharingRegistry for SqliteSharingRegistry {
    async fn create_domain(&self, domain: Domain) -> Result<String> {
        if self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM sharing_domains WHERE domain_id = ?)",
                &domain.domain_id,
            )
            .await?
        {
            return Err(SharingError::DuplicateEntry(domain.domain_id));
        }
        sqlx::query("INSERT INTO sharing_domains (domain_id, name, description) VALUES (?, ?, ?)")
            .bind(&domain.domain_id)
            .bind(&domain.name)
            .bind(&domain.description)
            .execute(&self.pool)
            .await?;
        info!("Created sharing domain: {}", domain.domain_id);
        Ok(domain.domain_id)
    }

    async fn is_domain_exists(&self, domain_id: &str) -> Result<bool> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM sharing_domains WHERE domain_id = ?)",
            domain_id,
        )
        .await
    }

    async fn create_entity_type(&self, entity_type: EntityType) -> Result<String> {
        let key = entity_type.entity_type_id.to_string();
        if self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM sharing_entity_types WHERE entity_type_id = ?)",
                &key,
            )
            .await?
        {
            return Err(SharingError::DuplicateEntry(key));
        }
        sqlx::query(
            "INSERT INTO sharing_entity_types (entity_type_id, domain_id, name, description) VALUES (?, ?, ?, ?)",
        )
        .bind(&key)
        .bind(&entity_type.domain_id)
        .bind(&entity_type.name)
        .bind(&entity_type.description)
        .execute(&self.pool)
        .await?;
        Ok(key)
    }

    async fn is_entity_type_exists(&self, entity_type_id: &EntityTypeId) -> Result<bool> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM sharing_entity_types WHERE entity_type_id = ?)",
            &entity_type_id.to_string(),
        )
        .await
    }

    async fn create_permission_type(&self, permission_type: PermissionType) -> Result<String> {
        let key = permission_type.permission_type_id.to_string();
        if self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM sharing_permission_types WHERE permission_type_id = ?)",
                &key,
            )
            .await?
        {
            return Err(SharingError::DuplicateEntry(key));
        }
        sqlx::query(
            "INSERT INTO sharing_permission_types (permission_type_id, domain_id, name, description) VALUES (?, ?, ?, ?)",
        )
        .bind(&key)
        .bind(&permission_type.domain_id)
        .bind(&permission_type.name)
        .bind(&permission_type.description)
        .execute(&self.pool)
        .await?;
        Ok(key)
    }

    async fn is_permission_type_exists(&self, permission_type_id: &PermissionId) -> Result<bool> {
        self.exists(
            "SELECT EXISTS(SELECT 1 FROM sharing_permission_types WHERE permission_type_id = ?)",
            &permission_type_id.to_string(),
        )
        .await
    }

    async fn create_user(&self, user: RegistryUser) -> Result<String> {
        let key = user.user_id.to_string();
        if self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM sharing_users WHERE user_id = ?)",
                &key,
            )
            .await?
        {
            return Err(SharingError::DuplicateEntry(key));
        }
        sqlx::query("INSERT INTO sharing_users (user_id, domain_id, user_name) VALUES (?, ?, ?)")
            .bind(&key)
            .bind(&user.domain_id)
            .bind(&user.user_name)
            .execute(&self.pool)
            .await?;
        Ok(key)
    }

    async fn create_group(&self, group: UserGroup) -> Result<String> {
        if self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM sharing_groups WHERE group_id = ?)",
                &group.group_id,
            )
            .await?
        {
            return Err(SharingError::DuplicateEntry(group.group_id));
        }
        sqlx::query(
            "INSERT INTO sharing_groups (group_id, domain_id, name, owner_id, description) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&group.group_id)
        .bind(&group.domain_id)
        .bind(&group.name)
        .bind(group.owner_id.to_string())
        .bind(&group.description)
        .execute(&self.pool)
        .await?;
        Ok(group.group_id)
    }

    async fn add_users_to_group(
        &self,
        domain_id: &str,
        user_ids: &[PrincipalId],
        group_id: &str,
    ) -> Result<bool> {
        if !self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM sharing_groups WHERE group_id = ?)",
                group_id,
            )
            .await?
        {
            return Err(SharingError::GroupNotFound(group_id.to_string()));
        }
        for user in user_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO sharing_group_members (domain_id, group_id, user_id) VALUES (?, ?, ?)",
            )
            .bind(domain_id)
            .bind(group_id)
            .bind(user.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(true)
    }

    async fn remove_users_from_group(
        &self,
        domain_id: &str,
        user_ids: &[PrincipalId],
        group_id: &str,
    ) -> Result<bool> {
        for user in user_ids {
            sqlx::query(
                "DELETE FROM sharing_group_members WHERE domain_id = ? AND group_id = ? AND user_id = ?",
            )
            .bind(domain_id)
            .bind(group_id)
            .bind(user.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(true)
    }

    async fn create_entity(&self, entity: Entity) -> Result<String> {
        if self
            .exists(
                "SELECT EXISTS(SELECT 1 FROM sharing_entities WHERE entity_id = ?)",
                &entity.entity_id,
            )
            .await?
        {
            return Err(SharingError::DuplicateEntry(entity.entity_id));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO sharing_entities
                (entity_id, domain_id, entity_type_id, owner_id, name, description, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entity.entity_id)
        .bind(&entity.domain_id)
        .bind(entity.entity_type_id.to_string())
        .bind(entity.owner_id.to_string())
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(entity.created_at)
        .execute(&mut *tx)
        .await?;

        // Implicit OWNER grant for the entity owner.
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO sharing_grants
                (domain_id, entity_id, grantee_id, grantee_kind, permission_type_id, cascade_flag)
            VALUES (?, ?, ?, 'USER', ?, 1)
            "#,
        )
        .bind(&entity.domain_id)
        .bind(&entity.entity_id)
        .bind(entity.owner_id.to_string())
        .bind(PermissionId::new(&entity.domain_id, "OWNER").to_string())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        debug!("Created sharing entity: {}", entity.entity_id);
        Ok(entity.entity_id)
    }

    async fn get_entity(&self, domain_id: &str, entity_id: &str) -> Result<Entity> {
        let row = sqlx::query_as::<_, EntityRow>(
            r#"
            SELECT entity_id, domain_id, entity_type_id, owner_id, name, description, created_at
            FROM sharing_entities WHERE domain_id = ? AND entity_id = ?
            "#,
        )
        .bind(domain_id)
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| SharingError::EntityNotFound(entity_id.to_string()))?;
        Self::row_to_entity(row)
    }

    async fn update_entity(&self, entity: Entity) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sharing_entities SET name = ?, description = ? WHERE domain_id = ? AND entity_id = ?",
        )
        .bind(&entity.name)
        .bind(&entity.description)
        .bind(&entity.domain_id)
        .bind(&entity.entity_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(SharingError::EntityNotFound(entity.entity_id));
        }
        Ok(true)
    }

    async fn delete_entity(&self, domain_id: &str, entity_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM sharing_entities WHERE domain_id = ? AND entity_id = ?")
            .bind(domain_id)
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM sharing_grants WHERE domain_id = ? AND entity_id = ?")
            .bind(domain_id)
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn is_entity_exists(&self, domain_id: &str, entity_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sharing_entities WHERE domain_id = ? AND entity_id = ?)",
        )
        .bind(domain_id)
        .bind(entity_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn share_entity_with_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        user_ids: &[PrincipalId],
        permission_type_id: &PermissionId,
        cascade: bool,
    ) -> Result<bool> {
        for user in user_ids {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO sharing_grants
                    (domain_id, entity_id, grantee_id, grantee_kind, permission_type_id, cascade_flag)
                VALUES (?, ?, ?, 'USER', ?, ?)
                "#,
            )
            .bind(domain_id)
            .bind(entity_id)
            .bind(user.to_string())
            .bind(permission_type_id.to_string())
            .bind(cascade)
            .execute(&self.pool)
            .await?;
        }
        Ok(true)
    }

    async fn share_entity_with_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        group_ids: &[String],
        permission_type_id: &PermissionId,
        cascade: bool,
    ) -> Result<bool> {
        for group_id in group_ids {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO sharing_grants
                    (domain_id, entity_id, grantee_id, grantee_kind, permission_type_id, cascade_flag)
                VALUES (?, ?, ?, 'GROUP', ?, ?)
                "#,
            )
            .bind(domain_id)
            .bind(entity_id)
            .bind(group_id)
            .bind(permission_type_id.to_string())
            .bind(cascade)
            .execute(&self.pool)
            .await?;
        }
        Ok(true)
    }

    async fn revoke_entity_sharing_from_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        user_ids: &[PrincipalId],
        permission_type_id: &PermissionId,
    ) -> Result<bool> {
        for user in user_ids {
            sqlx::query(
                r#"
                DELETE FROM sharing_grants
                WHERE domain_id = ? AND entity_id = ? AND grantee_id = ?
                  AND grantee_kind = 'USER' AND permission_type_id = ?
                "#,
            )
            .bind(domain_id)
            .bind(entity_id)
            .bind(user.to_string())
            .bind(permission_type_id.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(true)
    }

    async fn revoke_entity_sharing_from_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        group_ids: &[String],
        permission_type_id: &PermissionId,
    ) -> Result<bool> {
        for group_id in group_ids {
            sqlx::query(
                r#"
                DELETE FROM sharing_grants
                WHERE domain_id = ? AND entity_id = ? AND grantee_id = ?
                  AND grantee_kind = 'GROUP' AND permission_type_id = ?
                "#,
            )
            .bind(domain_id)
            .bind(entity_id)
            .bind(group_id)
            .bind(permission_type_id.to_string())
            .execute(&self.pool)
            .await?;
        }
        Ok(true)
    }

    async fn user_has_access(
        &self,
        domain_id: &str,
        user_id: &PrincipalId,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<bool> {
        let principal = user_id.to_string();
        let has_access = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sharing_grants g
                WHERE g.domain_id = ? AND g.entity_id = ? AND g.permission_type_id = ?
                  AND (
                    (g.grantee_kind = 'USER' AND g.grantee_id = ?)
                    OR (g.grantee_kind = 'GROUP' AND g.grantee_id IN (
                        SELECT m.group_id FROM sharing_group_members m
                        WHERE m.domain_id = g.domain_id AND m.user_id = ?
                    ))
                  )
            )
            "#,
        )
        .bind(domain_id)
        .bind(entity_id)
        .bind(permission_type_id.to_string())
        .bind(&principal)
        .bind(&principal)
        .fetch_one(&self.pool)
        .await?;
        Ok(has_access)
    }

    async fn search_entities(
        &self,
        domain_id: &str,
        user_id: &PrincipalId,
        filters: &[SearchCriteria],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Entity>> {
        let mut sql = String::from(
            r#"
            SELECT e.entity_id, e.domain_id, e.entity_type_id, e.owner_id, e.name, e.description, e.created_at
            FROM sharing_entities e WHERE e.domain_id = ?
            "#,
        );
        for criteria in filters {
            let column = match criteria.field {
                EntitySearchField::EntityTypeId => "e.entity_type_id",
                EntitySearchField::Name => "e.name",
            };
            match criteria.condition {
                SearchCondition::Equal => {
                    sql.push_str(&format!(" AND {} = ?", column));
                }
                SearchCondition::Like => {
                    sql.push_str(&format!(" AND {} LIKE ?", column));
                }
            }
        }
        sql.push_str(
            r#"
            AND (e.owner_id = ?
                 OR EXISTS (
                     SELECT 1 FROM sharing_grants g
                     WHERE g.entity_id = e.entity_id AND g.domain_id = e.domain_id
                       AND g.permission_type_id IN (?, ?)
                       AND (
                         (g.grantee_kind = 'USER' AND g.grantee_id = ?)
                         OR (g.grantee_kind = 'GROUP' AND g.grantee_id IN (
                             SELECT m.group_id FROM sharing_group_members m
                             WHERE m.domain_id = g.domain_id AND m.user_id = ?
                         ))
                       )
                 ))
            ORDER BY e.rowid
            LIMIT ? OFFSET ?
            "#,
        );

        let principal = user_id.to_string();
        let read_permission = PermissionId::new(domain_id, "READ").to_string();
        let owner_permission = PermissionId::new(domain_id, "OWNER").to_string();

        let mut query = sqlx::query_as::<_, EntityRow>(&sql).bind(domain_id);
        for criteria in filters {
            query = query.bind(criteria.value.clone());
        }
        // SQLite treats a negative LIMIT as unbounded.
        let rows = query
            .bind(&principal)
            .bind(&read_permission)
            .bind(&owner_permission)
            .bind(&principal)
            .bind(&principal)
            .bind(limit)
            .bind(offset.max(0))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Self::row_to_entity).collect()
    }

    async fn get_list_of_shared_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<RegistryUser>> {
        let permission = permission_type_id.to_string();
        let direct = sqlx::query_as::<_, (String, Option<String>)>(
            r#"
            SELECT g.grantee_id, u.user_name FROM sharing_grants g
            LEFT JOIN sharing_users u ON u.user_id = g.grantee_id
            WHERE g.domain_id = ? AND g.entity_id = ? AND g.permission_type_id = ?
              AND g.grantee_kind = 'USER'
            "#,
        )
        .bind(domain_id)
        .bind(entity_id)
        .bind(&permission)
        .fetch_all(&self.pool)
        .await?;

        let via_groups = sqlx::query_as::<_, (String, Option<String>)>(
            r#"
            SELECT m.user_id, u.user_name FROM sharing_grants g
            JOIN sharing_group_members m
              ON m.group_id = g.grantee_id AND m.domain_id = g.domain_id
            LEFT JOIN sharing_users u ON u.user_id = m.user_id
            WHERE g.domain_id = ? AND g.entity_id = ? AND g.permission_type_id = ?
              AND g.grantee_kind = 'GROUP'
            "#,
        )
        .bind(domain_id)
        .bind(entity_id)
        .bind(&permission)
        .fetch_all(&self.pool)
        .await?;

        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for (raw_id, user_name) in direct.into_iter().chain(via_groups) {
            if seen.insert(raw_id.clone()) {
                let user_id = PrincipalId::parse(&raw_id)?;
                let user_name = user_name.unwrap_or_else(|| user_id.user_id.clone());
                users.push(RegistryUser {
                    user_id,
                    domain_id: domain_id.to_string(),
                    user_name,
                });
            }
        }
        Ok(users)
    }

    async fn get_list_of_directly_shared_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<RegistryUser>> {
        let rows = sqlx::query_as::<_, (String, Option<String>)>(
            r#"
            SELECT g.grantee_id, u.user_name FROM sharing_grants g
            LEFT JOIN sharing_users u ON u.user_id = g.grantee_id
            WHERE g.domain_id = ? AND g.entity_id = ? AND g.permission_type_id = ?
              AND g.grantee_kind = 'USER'
            "#,
        )
        .bind(domain_id)
        .bind(entity_id)
        .bind(permission_type_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for (raw_id, user_name) in rows {
            if seen.insert(raw_id.clone()) {
                let user_id = PrincipalId::parse(&raw_id)?;
                let user_name = user_name.unwrap_or_else(|| user_id.user_id.clone());
                users.push(RegistryUser {
                    user_id,
                    domain_id: domain_id.to_string(),
                    user_name,
                });
            }
        }
        Ok(users)
    }

    async fn get_list_of_shared_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<UserGroup>> {
        // Matches the directly-shared list; there is no inherited group
        // sharing without an entity hierarchy.
        self.get_list_of_directly_shared_groups(domain_id, entity_id, permission_type_id)
            .await
    }

    async fn get_list_of_directly_shared_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<UserGroup>> {
        let rows = sqlx::query_as::<_, (String, Option<String>, Option<String>, Option<String>)>(
            r#"
            SELECT g.grantee_id, gr.name, gr.owner_id, gr.description FROM sharing_grants g
            LEFT JOIN sharing_groups gr ON gr.group_id = g.grantee_id
            WHERE g.domain_id = ? AND g.entity_id = ? AND g.permission_type_id = ?
              AND g.grantee_kind = 'GROUP'
            "#,
        )
        .bind(domain_id)
        .bind(entity_id)
        .bind(permission_type_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let mut seen = HashSet::new();
        let mut groups = Vec::new();
        for (group_id, name, owner_id, description) in rows {
            if seen.insert(group_id.clone()) {
                let owner_id = match owner_id {
                    Some(raw) => PrincipalId::parse(&raw)?,
                    None => PrincipalId::new("unknown", domain_id),
                };
                groups.push(UserGroup {
                    name: name.unwrap_or_else(|| group_id.clone()),
                    group_id,
                    domain_id: domain_id.to_string(),
                    owner_id,
                    description,
                });
            }
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn test_registry() -> (SqliteSharingRegistry, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let registry = SqliteSharingRegistry::connect(temp_dir.path().join("sharing.db"))
            .await
            .unwrap();
        (registry, temp_dir)
    }

    fn entity(domain: &str, id: &str, entity_type: &str, owner: &str) -> Entity {
        Entity {
            entity_id: id.to_string(),
            domain_id: domain.to_string(),
            entity_type_id: EntityTypeId::new(domain, entity_type),
            owner_id: PrincipalId::new(owner, domain),
            name: id.to_string(),
            description: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn test_entity_round_trip() {
        let (registry, _dir) = test_registry().await;
        registry
            .create_entity(entity("gw1", "proj-1", "PROJECT", "alice"))
            .await
            .unwrap();

        let fetched = registry.get_entity("gw1", "proj-1").await.unwrap();
        assert_eq!(fetched.owner_id, PrincipalId::new("alice", "gw1"));
        assert_eq!(fetched.entity_type_id, EntityTypeId::new("gw1", "PROJECT"));

        // Owner grant is implicit.
        let has_owner = registry
            .user_has_access(
                "gw1",
                &PrincipalId::new("alice", "gw1"),
                "proj-1",
                &PermissionId::new("gw1", "OWNER"),
            )
            .await
            .unwrap();
        assert!(has_owner);
    }

    #[tokio::test]
    async fn test_share_and_revoke() {
        let (registry, _dir) = test_registry().await;
        registry
            .create_entity(entity("gw1", "proj-1", "PROJECT", "alice"))
            .await
            .unwrap();

        let bob = PrincipalId::new("bob", "gw1");
        let write = PermissionId::new("gw1", "WRITE");
        registry
            .share_entity_with_users("gw1", "proj-1", &[bob.clone()], &write, true)
            .await
            .unwrap();
        assert!(registry
            .user_has_access("gw1", &bob, "proj-1", &write)
            .await
            .unwrap());

        registry
            .revoke_entity_sharing_from_users("gw1", "proj-1", &[bob.clone()], &write)
            .await
            .unwrap();
        assert!(!registry
            .user_has_access("gw1", &bob, "proj-1", &write)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_search_entities_window() {
        let (registry, _dir) = test_registry().await;
        for i in 0..5 {
            registry
                .create_entity(entity("gw1", &format!("proj-{}", i), "PROJECT", "alice"))
                .await
                .unwrap();
        }

        let alice = PrincipalId::new("alice", "gw1");
        let filters = [SearchCriteria::entity_type(&EntityTypeId::new("gw1", "PROJECT"))];
        let all = registry
            .search_entities("gw1", &alice, &filters, 0, -1)
            .await
            .unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all[0].entity_id, "proj-0");

        let page = registry
            .search_entities("gw1", &alice, &filters, 2, 2)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].entity_id, "proj-2");
    }

    #[tokio::test]
    async fn test_group_membership_access() {
        let (registry, _dir) = test_registry().await;
        registry
            .create_entity(entity("gw1", "exp-1", "EXPERIMENT", "alice"))
            .await
            .unwrap();
        registry
            .create_group(UserGroup {
                group_id: "admins".to_string(),
                domain_id: "gw1".to_string(),
                name: "Admins".to_string(),
                owner_id: PrincipalId::new("alice", "gw1"),
                description: None,
            })
            .await
            .unwrap();
        let carol = PrincipalId::new("carol", "gw1");
        registry
            .add_users_to_group("gw1", &[carol.clone()], "admins")
            .await
            .unwrap();
        let write = PermissionId::new("gw1", "WRITE");
        registry
            .share_entity_with_groups("gw1", "exp-1", &["admins".to_string()], &write, true)
            .await
            .unwrap();

        assert!(registry
            .user_has_access("gw1", &carol, "exp-1", &write)
            .await
            .unwrap());

        let groups = registry
            .get_list_of_shared_groups("gw1", "exp-1", &write)
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].group_id, "admins");
    }
}
