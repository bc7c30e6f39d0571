//! SQLite-backed catalog and profile store.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::catalog::{ComputeResourceDescription, ResourceCatalog, StorageResourceDescription};
use crate::error::{ResourcesError, Result};
use crate::profiles::{
    GatewayResourceProfile, GatewayStoragePreference, GroupComputeResourcePreference,
    GroupResourceProfile, UserComputeResourcePreference, UserResourceProfile,
    UserStoragePreference,
};
use crate::store::ProfileStore;

/// A [`ResourceCatalog`] + [`ProfileStore`] backed by a SQLite database.
pub struct SqliteResourceStore {
    pool: Pool<Sqlite>,
}

impl SqliteResourceStore {
    /// Open (creating if missing) the resource database at the given path.
    pub async fn connect(database_path: impl AsRef<Path>) -> Result<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ResourcesError::Unavailable(e.to_string()))?;
        }

        info!("Opening resource store at: {}", database_path.display());

        let pool = SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(database_path)
                .create_if_missing(true),
        )
        .await?;

        Self::from_pool(pool).await
    }

    /// Build a store over an existing pool, running migrations.
    pub async fn from_pool(pool: Pool<Sqlite>) -> Result<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn run_migrations(&self) -> Result<()> {
        debug!("Running resource store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS compute_resources (
                compute_resource_id TEXT PRIMARY KEY,
                host_name TEXT NOT NULL,
                description TEXT,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS storage_resources (
                storage_resource_id TEXT PRIMARY KEY,
                host_name TEXT NOT NULL,
                description TEXT,
                enabled INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_resource_profiles (
                user_id TEXT NOT NULL,
                gateway_id TEXT NOT NULL,
                credential_store_token TEXT,
                PRIMARY KEY (user_id, gateway_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_compute_preferences (
                user_id TEXT NOT NULL,
                gateway_id TEXT NOT NULL,
                compute_resource_id TEXT NOT NULL,
                login_user_name TEXT,
                resource_specific_credential_store_token TEXT,
                PRIMARY KEY (user_id, gateway_id, compute_resource_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_storage_preferences (
                user_id TEXT NOT NULL,
                gateway_id TEXT NOT NULL,
                storage_resource_id TEXT NOT NULL,
                login_user_name TEXT,
                resource_specific_credential_store_token TEXT,
                PRIMARY KEY (user_id, gateway_id, storage_resource_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS group_resource_profiles (
                group_resource_profile_id TEXT PRIMARY KEY,
                gateway_id TEXT NOT NULL,
                group_resource_profile_name TEXT NOT NULL,
                default_credential_store_token TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS group_compute_preferences (
                group_resource_profile_id TEXT NOT NULL,
                compute_resource_id TEXT NOT NULL,
                login_user_name TEXT,
                resource_specific_credential_store_token TEXT,
                PRIMARY KEY (group_resource_profile_id, compute_resource_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gateway_resource_profiles (
                gateway_id TEXT PRIMARY KEY,
                credential_store_token TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gateway_storage_preferences (
                gateway_id TEXT NOT NULL,
                storage_resource_id TEXT NOT NULL,
                login_user_name TEXT,
                resource_specific_credential_store_token TEXT,
                PRIMARY KEY (gateway_id, storage_resource_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Resource store migrations completed");

        Ok(())
    }
}

#[async_trait]
impl ResourceCatalog for SqliteResourceStore {
    async fn register_compute_resource(
        &self,
        resource: ComputeResourceDescription,
    ) -> Result<String> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO compute_resources
                (compute_resource_id, host_name, description, enabled)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&resource.compute_resource_id)
        .bind(&resource.host_name)
        .bind(&resource.description)
        .bind(resource.enabled)
        .execute(&self.pool)
        .await?;
        Ok(resource.compute_resource_id)
    }

    async fn get_compute_resource(
        &self,
        compute_resource_id: &str,
    ) -> Result<Option<ComputeResourceDescription>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, bool)>(
            "SELECT compute_resource_id, host_name, description, enabled FROM compute_resources WHERE compute_resource_id = ?",
        )
        .bind(compute_resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(compute_resource_id, host_name, description, enabled)| {
            ComputeResourceDescription {
                compute_resource_id,
                host_name,
                description,
                enabled,
            }
        }))
    }

    async fn list_compute_resources(&self) -> Result<Vec<ComputeResourceDescription>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, bool)>(
            "SELECT compute_resource_id, host_name, description, enabled FROM compute_resources ORDER BY compute_resource_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(compute_resource_id, host_name, description, enabled)| {
                ComputeResourceDescription {
                    compute_resource_id,
                    host_name,
                    description,
                    enabled,
                }
            })
            .collect())
    }

    async fn register_storage_resource(
        &self,
        resource: StorageResourceDescription,
    ) -> Result<String> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO storage_resources
                (storage_resource_id, host_name, description, enabled)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&resource.storage_resource_id)
        .bind(&resource.host_name)
        .bind(&resource.description)
        .bind(resource.enabled)
        .execute(&self.pool)
        .await?;
        Ok(resource.storage_resource_id)
    }

    async fn get_storage_resource(
        &self,
        storage_resource_id: &str,
    ) -> Result<Option<StorageResourceDescription>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, bool)>(
            "SELECT storage_resource_id, host_name, description, enabled FROM storage_resources WHERE storage_resource_id = ?",
        )
        .bind(storage_resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(storage_resource_id, host_name, description, enabled)| {
            StorageResourceDescription {
                storage_resource_id,
                host_name,
                description,
                enabled,
            }
        }))
    }

    async fn list_storage_resources(&self) -> Result<Vec<StorageResourceDescription>> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, bool)>(
            "SELECT storage_resource_id, host_name, description, enabled FROM storage_resources ORDER BY storage_resource_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(storage_resource_id, host_name, description, enabled)| {
                StorageResourceDescription {
                    storage_resource_id,
                    host_name,
                    description,
                    enabled,
                }
            })
            .collect())
    }
}

#[async_trait]
impl ProfileStore for SqliteResourceStore {
    async fn put_user_resource_profile(&self, profile: UserResourceProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO user_resource_profiles
                (user_id, gateway_id, credential_store_token)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.gateway_id)
        .bind(&profile.credential_store_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_resource_profile(
        &self,
        user_id: &str,
        gateway_id: &str,
    ) -> Result<Option<UserResourceProfile>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>)>(
            "SELECT user_id, gateway_id, credential_store_token FROM user_resource_profiles WHERE user_id = ? AND gateway_id = ?",
        )
        .bind(user_id)
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(user_id, gateway_id, credential_store_token)| UserResourceProfile {
            user_id,
            gateway_id,
            credential_store_token,
        }))
    }

    async fn is_user_resource_profile_exists(
        &self,
        user_id: &str,
        gateway_id: &str,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM user_resource_profiles WHERE user_id = ? AND gateway_id = ?)",
        )
        .bind(user_id)
        .bind(gateway_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn put_user_compute_preference(
        &self,
        preference: UserComputeResourcePreference,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO user_compute_preferences
                (user_id, gateway_id, compute_resource_id, login_user_name,
                 resource_specific_credential_store_token)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&preference.user_id)
        .bind(&preference.gateway_id)
        .bind(&preference.compute_resource_id)
        .bind(&preference.login_user_name)
        .bind(&preference.resource_specific_credential_store_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_compute_preference(
        &self,
        user_id: &str,
        gateway_id: &str,
        compute_resource_id: &str,
    ) -> Result<Option<UserComputeResourcePreference>> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            r#"
            SELECT user_id, gateway_id, compute_resource_id, login_user_name,
                   resource_specific_credential_store_token
            FROM user_compute_preferences
            WHERE user_id = ? AND gateway_id = ? AND compute_resource_id = ?
            "#,
        )
        .bind(user_id)
        .bind(gateway_id)
        .bind(compute_resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(user_id, gateway_id, compute_resource_id, login_user_name, token)| {
                UserComputeResourcePreference {
                    user_id,
                    gateway_id,
                    compute_resource_id,
                    login_user_name,
                    resource_specific_credential_store_token: token,
                }
            },
        ))
    }

    async fn put_user_storage_preference(&self, preference: UserStoragePreference) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO user_storage_preferences
                (user_id, gateway_id, storage_resource_id, login_user_name,
                 resource_specific_credential_store_token)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&preference.user_id)
        .bind(&preference.gateway_id)
        .bind(&preference.storage_resource_id)
        .bind(&preference.login_user_name)
        .bind(&preference.resource_specific_credential_store_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_storage_preference(
        &self,
        user_id: &str,
        gateway_id: &str,
        storage_resource_id: &str,
    ) -> Result<Option<UserStoragePreference>> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, Option<String>)>(
            r#"
            SELECT user_id, gateway_id, storage_resource_id, login_user_name,
                   resource_specific_credential_store_token
            FROM user_storage_preferences
            WHERE user_id = ? AND gateway_id = ? AND storage_resource_id = ?
            "#,
        )
        .bind(user_id)
        .bind(gateway_id)
        .bind(storage_resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(user_id, gateway_id, storage_resource_id, login_user_name, token)| {
                UserStoragePreference {
                    user_id,
                    gateway_id,
                    storage_resource_id,
                    login_user_name,
                    resource_specific_credential_store_token: token,
                }
            },
        ))
    }

    async fn put_group_resource_profile(&self, profile: GroupResourceProfile) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO group_resource_profiles
                (group_resource_profile_id, gateway_id, group_resource_profile_name,
                 default_credential_store_token)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&profile.group_resource_profile_id)
        .bind(&profile.gateway_id)
        .bind(&profile.group_resource_profile_name)
        .bind(&profile.default_credential_store_token)
        .execute(&mut *tx)
        .await?;

        // Replace the preference set wholesale.
        sqlx::query("DELETE FROM group_compute_preferences WHERE group_resource_profile_id = ?")
            .bind(&profile.group_resource_profile_id)
            .execute(&mut *tx)
            .await?;
        for preference in &profile.compute_preferences {
            sqlx::query(
                r#"
                INSERT INTO group_compute_preferences
                    (group_resource_profile_id, compute_resource_id, login_user_name,
                     resource_specific_credential_store_token)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&profile.group_resource_profile_id)
            .bind(&preference.compute_resource_id)
            .bind(&preference.login_user_name)
            .bind(&preference.resource_specific_credential_store_token)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_group_resource_profile(
        &self,
        group_resource_profile_id: &str,
    ) -> Result<Option<GroupResourceProfile>> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>)>(
            r#"
            SELECT group_resource_profile_id, gateway_id, group_resource_profile_name,
                   default_credential_store_token
            FROM group_resource_profiles WHERE group_resource_profile_id = ?
            "#,
        )
        .bind(group_resource_profile_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((profile_id, gateway_id, name, default_token)) = row else {
            return Ok(None);
        };

        let preferences = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            r#"
            SELECT group_resource_profile_id, compute_resource_id, login_user_name,
                   resource_specific_credential_store_token
            FROM group_compute_preferences
            WHERE group_resource_profile_id = ?
            ORDER BY rowid
            "#,
        )
        .bind(&profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(GroupResourceProfile {
            group_resource_profile_id: profile_id,
            gateway_id,
            group_resource_profile_name: name,
            default_credential_store_token: default_token,
            compute_preferences: preferences
                .into_iter()
                .map(
                    |(group_resource_profile_id, compute_resource_id, login_user_name, token)| {
                        GroupComputeResourcePreference {
                            group_resource_profile_id,
                            compute_resource_id,
                            login_user_name,
                            resource_specific_credential_store_token: token,
                        }
                    },
                )
                .collect(),
        }))
    }

    async fn get_group_resource_profiles(
        &self,
        gateway_id: &str,
        ids: &[String],
    ) -> Result<Vec<GroupResourceProfile>> {
        let mut profiles = Vec::new();
        for id in ids {
            if let Some(profile) = self.get_group_resource_profile(id).await? {
                if profile.gateway_id == gateway_id {
                    profiles.push(profile);
                }
            }
        }
        Ok(profiles)
    }

    async fn delete_group_resource_profile(&self, group_resource_profile_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result =
            sqlx::query("DELETE FROM group_resource_profiles WHERE group_resource_profile_id = ?")
                .bind(group_resource_profile_id)
                .execute(&mut *tx)
                .await?;
        sqlx::query("DELETE FROM group_compute_preferences WHERE group_resource_profile_id = ?")
            .bind(group_resource_profile_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn put_gateway_resource_profile(&self, profile: GatewayResourceProfile) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO gateway_resource_profiles (gateway_id, credential_store_token) VALUES (?, ?)",
        )
        .bind(&profile.gateway_id)
        .bind(&profile.credential_store_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_gateway_resource_profile(
        &self,
        gateway_id: &str,
    ) -> Result<Option<GatewayResourceProfile>> {
        let row = sqlx::query_as::<_, (String, Option<String>)>(
            "SELECT gateway_id, credential_store_token FROM gateway_resource_profiles WHERE gateway_id = ?",
        )
        .bind(gateway_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(gateway_id, credential_store_token)| GatewayResourceProfile {
            gateway_id,
            credential_store_token,
        }))
    }

    async fn is_gateway_resource_profile_exists(&self, gateway_id: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM gateway_resource_profiles WHERE gateway_id = ?)",
        )
        .bind(gateway_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn put_gateway_storage_preference(
        &self,
        preference: GatewayStoragePreference,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO gateway_storage_preferences
                (gateway_id, storage_resource_id, login_user_name,
                 resource_specific_credential_store_token)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&preference.gateway_id)
        .bind(&preference.storage_resource_id)
        .bind(&preference.login_user_name)
        .bind(&preference.resource_specific_credential_store_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_gateway_storage_preference(
        &self,
        gateway_id: &str,
        storage_resource_id: &str,
    ) -> Result<Option<GatewayStoragePreference>> {
        let row = sqlx::query_as::<_, (String, String, Option<String>, Option<String>)>(
            r#"
            SELECT gateway_id, storage_resource_id, login_user_name,
                   resource_specific_credential_store_token
            FROM gateway_storage_preferences
            WHERE gateway_id = ? AND storage_resource_id = ?
            "#,
        )
        .bind(gateway_id)
        .bind(storage_resource_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(
            |(gateway_id, storage_resource_id, login_user_name, token)| GatewayStoragePreference {
                gateway_id,
                storage_resource_id,
                login_user_name,
                resource_specific_credential_store_token: token,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (SqliteResourceStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteResourceStore::connect(temp_dir.path().join("resources.db"))
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_user_preference_round_trip() {
        let (store, _dir) = test_store().await;
        store
            .put_user_compute_preference(UserComputeResourcePreference {
                user_id: "alice".to_string(),
                gateway_id: "gw1".to_string(),
                compute_resource_id: "cluster-a".to_string(),
                login_user_name: Some("asmith".to_string()),
                resource_specific_credential_store_token: None,
            })
            .await
            .unwrap();

        let fetched = store
            .get_user_compute_preference("alice", "gw1", "cluster-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.login_user_name.as_deref(), Some("asmith"));
        assert!(fetched.resource_specific_credential_store_token.is_none());

        assert!(store
            .get_user_compute_preference("alice", "gw1", "cluster-b")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_group_profile_preferences_replaced_on_put() {
        let (store, _dir) = test_store().await;
        let mut profile = GroupResourceProfile {
            group_resource_profile_id: "grp-1".to_string(),
            gateway_id: "gw1".to_string(),
            group_resource_profile_name: "Lab".to_string(),
            default_credential_store_token: Some("tok-g".to_string()),
            compute_preferences: vec![GroupComputeResourcePreference {
                group_resource_profile_id: "grp-1".to_string(),
                compute_resource_id: "cluster-a".to_string(),
                login_user_name: Some("lab".to_string()),
                resource_specific_credential_store_token: None,
            }],
        };
        store.put_group_resource_profile(profile.clone()).await.unwrap();

        profile.compute_preferences = vec![GroupComputeResourcePreference {
            group_resource_profile_id: "grp-1".to_string(),
            compute_resource_id: "cluster-b".to_string(),
            login_user_name: Some("lab2".to_string()),
            resource_specific_credential_store_token: None,
        }];
        store.put_group_resource_profile(profile).await.unwrap();

        let fetched = store
            .get_group_resource_profile("grp-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.compute_preferences.len(), 1);
        assert_eq!(fetched.compute_preferences[0].compute_resource_id, "cluster-b");
    }

    #[tokio::test]
    async fn test_gateway_profile_existence() {
        let (store, _dir) = test_store().await;
        assert!(!store.is_gateway_resource_profile_exists("gw1").await.unwrap());

        store
            .put_gateway_resource_profile(GatewayResourceProfile {
                gateway_id: "gw1".to_string(),
                credential_store_token: Some("tok-gw".to_string()),
            })
            .await
            .unwrap();

        assert!(store.is_gateway_resource_profile_exists("gw1").await.unwrap());
    }
}
