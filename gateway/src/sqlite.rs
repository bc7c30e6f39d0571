//! SQLite-backed primary store for projects, experiments and credential
//! token records.

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::models::{CredentialTokenRecord, Experiment, Project};
use crate::store::{CredentialTokenStore, ExperimentStore, ProjectStore, StoreError, StoreResult};

/// A [`ProjectStore`] + [`ExperimentStore`] + [`CredentialTokenStore`]
/// backed by a SQLite database.
pub struct SqlitePrimaryStore {
    pool: Pool<Sqlite>,
}

impl SqlitePrimaryStore {
    /// Open (creating if missing) the primary database at the given path.
    pub async fn connect(database_path: impl AsRef<Path>) -> StoreResult<Self> {
        let database_path = database_path.as_ref();
        if let Some(parent) = database_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }

        info!("Opening primary store at: {}", database_path.display());

        let pool = SqlitePool::connect_with(
            sqlx::sqlite::SqliteConnectOptions::new()
                .filename(database_path)
                .create_if_missing(true),
        )
        .await?;

        Self::from_pool(pool).await
    }

    /// Build a store over an existing pool, running migrations.
    pub async fn from_pool(pool: Pool<Sqlite>) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        debug!("Running primary store migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                project_id TEXT PRIMARY KEY,
                gateway_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                creation_time TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS experiments (
                experiment_id TEXT PRIMARY KEY,
                gateway_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                user_name TEXT NOT NULL,
                experiment_name TEXT NOT NULL,
                description TEXT,
                creation_time TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS credential_tokens (
                token_id TEXT PRIMARY KEY,
                gateway_id TEXT NOT NULL,
                owner TEXT NOT NULL,
                description TEXT,
                creation_time TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_gateway ON projects(gateway_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_experiments_project ON experiments(project_id)")
            .execute(&self.pool)
            .await?;

        debug!("Primary store migrations completed");

        Ok(())
    }
}

type ProjectRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    NaiveDateTime,
);

fn row_to_project(row: ProjectRow) -> Project {
    Project {
        project_id: row.0,
        gateway_id: row.1,
        owner: row.2,
        name: row.3,
        description: row.4,
        creation_time: row.5,
    }
}

type ExperimentRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    NaiveDateTime,
);

fn row_to_experiment(row: ExperimentRow) -> Experiment {
    Experiment {
        experiment_id: row.0,
        gateway_id: row.1,
        project_id: row.2,
        user_name: row.3,
        experiment_name: row.4,
        description: row.5,
        creation_time: row.6,
    }
}

#[async_trait]
impl ProjectStore for SqlitePrimaryStore {
    async fn create_project(&self, project: Project) -> StoreResult<String> {
        sqlx::query(
            r#"
            INSERT INTO projects
                (project_id, gateway_id, owner, name, description, creation_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&project.project_id)
        .bind(&project.gateway_id)
        .bind(&project.owner)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.creation_time)
        .execute(&self.pool)
        .await?;
        Ok(project.project_id)
    }

    async fn get_project(&self, project_id: &str) -> StoreResult<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(
            "SELECT project_id, gateway_id, owner, name, description, creation_time FROM projects WHERE project_id = ?",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_project))
    }

    async fn update_project(&self, project: Project) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE projects SET name = ?, description = ? WHERE project_id = ?",
        )
        .bind(&project.name)
        .bind(&project.description)
        .bind(&project.project_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_project(&self, project_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM projects WHERE project_id = ?")
            .bind(project_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_projects(&self, project_ids: &[String]) -> StoreResult<Vec<Project>> {
        let mut projects = Vec::new();
        for project_id in project_ids {
            if let Some(project) = self.get_project(project_id).await? {
                projects.push(project);
            }
        }
        Ok(projects)
    }
}

#[async_trait]
impl ExperimentStore for SqlitePrimaryStore {
    async fn create_experiment(&self, experiment: Experiment) -> StoreResult<String> {
        sqlx::query(
            r#"
            INSERT INTO experiments
                (experiment_id, gateway_id, project_id, user_name, experiment_name,
                 description, creation_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&experiment.experiment_id)
        .bind(&experiment.gateway_id)
        .bind(&experiment.project_id)
        .bind(&experiment.user_name)
        .bind(&experiment.experiment_name)
        .bind(&experiment.description)
        .bind(experiment.creation_time)
        .execute(&self.pool)
        .await?;
        Ok(experiment.experiment_id)
    }

    async fn get_experiment(&self, experiment_id: &str) -> StoreResult<Option<Experiment>> {
        let row = sqlx::query_as::<_, ExperimentRow>(
            r#"
            SELECT experiment_id, gateway_id, project_id, user_name, experiment_name,
                   description, creation_time
            FROM experiments WHERE experiment_id = ?
            "#,
        )
        .bind(experiment_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_experiment))
    }

    async fn delete_experiment(&self, experiment_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM experiments WHERE experiment_id = ?")
            .bind(experiment_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_experiments(&self, experiment_ids: &[String]) -> StoreResult<Vec<Experiment>> {
        let mut experiments = Vec::new();
        for experiment_id in experiment_ids {
            if let Some(experiment) = self.get_experiment(experiment_id).await? {
                experiments.push(experiment);
            }
        }
        Ok(experiments)
    }
}

#[async_trait]
impl CredentialTokenStore for SqlitePrimaryStore {
    async fn create_token(&self, record: CredentialTokenRecord) -> StoreResult<String> {
        sqlx::query(
            r#"
            INSERT INTO credential_tokens
                (token_id, gateway_id, owner, description, creation_time)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.token_id)
        .bind(&record.gateway_id)
        .bind(&record.owner)
        .bind(&record.description)
        .bind(record.creation_time)
        .execute(&self.pool)
        .await?;
        Ok(record.token_id)
    }

    async fn get_token(&self, token_id: &str) -> StoreResult<Option<CredentialTokenRecord>> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, NaiveDateTime)>(
            "SELECT token_id, gateway_id, owner, description, creation_time FROM credential_tokens WHERE token_id = ?",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(token_id, gateway_id, owner, description, creation_time)| {
            CredentialTokenRecord {
                token_id,
                gateway_id,
                owner,
                description,
                creation_time,
            }
        }))
    }

    async fn delete_token(&self, token_id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM credential_tokens WHERE token_id = ?")
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_project_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqlitePrimaryStore::connect(temp_dir.path().join("primary.db"))
            .await
            .unwrap();

        let project = Project {
            project_id: "proj-1".to_string(),
            gateway_id: "gw1".to_string(),
            owner: "alice".to_string(),
            name: "Demo".to_string(),
            description: Some("demo project".to_string()),
            creation_time: Utc::now().naive_utc(),
        };
        store.create_project(project.clone()).await.unwrap();

        let fetched = store.get_project("proj-1").await.unwrap().unwrap();
        assert_eq!(fetched.owner, "alice");

        assert!(store.delete_project("proj-1").await.unwrap());
        assert!(store.get_project("proj-1").await.unwrap().is_none());
        assert!(!store.delete_project("proj-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_experiment_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = SqlitePrimaryStore::connect(temp_dir.path().join("primary.db"))
            .await
            .unwrap();

        let experiment = Experiment {
            experiment_id: "exp-1".to_string(),
            gateway_id: "gw1".to_string(),
            project_id: "proj-1".to_string(),
            user_name: "alice".to_string(),
            experiment_name: "Run 1".to_string(),
            description: None,
            creation_time: Utc::now().naive_utc(),
        };
        store.create_experiment(experiment).await.unwrap();

        let fetched = store.get_experiment("exp-1").await.unwrap().unwrap();
        assert_eq!(fetched.experiment_name, "Run 1");
    }
}
