//! Primary-store traits for business records, with in-memory
//! implementations. The SQLite implementation lives in [`crate::sqlite`].

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CredentialTokenRecord, Experiment, Project};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn create_project(&self, project: Project) -> StoreResult<String>;

    async fn get_project(&self, project_id: &str) -> StoreResult<Option<Project>>;

    async fn update_project(&self, project: Project) -> StoreResult<bool>;

    async fn delete_project(&self, project_id: &str) -> StoreResult<bool>;

    /// Fetch projects by id, preserving the order of the given id list.
    async fn get_projects(&self, project_ids: &[String]) -> StoreResult<Vec<Project>>;
}

#[async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn create_experiment(&self, experiment: Experiment) -> StoreResult<String>;

    async fn get_experiment(&self, experiment_id: &str) -> StoreResult<Option<Experiment>>;

    async fn delete_experiment(&self, experiment_id: &str) -> StoreResult<bool>;

    async fn get_experiments(&self, experiment_ids: &[String]) -> StoreResult<Vec<Experiment>>;
}

#[async_trait]
pub trait CredentialTokenStore: Send + Sync {
    async fn create_token(&self, record: CredentialTokenRecord) -> StoreResult<String>;

    async fn get_token(&self, token_id: &str) -> StoreResult<Option<CredentialTokenRecord>>;

    async fn delete_token(&self, token_id: &str) -> StoreResult<bool>;
}

impl From<StoreError> for crate::error::ServiceError {
    fn from(err: StoreError) -> Self {
        crate::error::ServiceError::system("Primary store failure", err)
    }
}

fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory [`ProjectStore`].
#[derive(Default)]
pub struct MemoryProjectStore {
    projects: RwLock<HashMap<String, Project>>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn create_project(&self, project: Project) -> StoreResult<String> {
        let project_id = project.project_id.clone();
        write_lock(&self.projects).insert(project_id.clone(), project);
        Ok(project_id)
    }

    async fn get_project(&self, project_id: &str) -> StoreResult<Option<Project>> {
        Ok(read_lock(&self.projects).get(project_id).cloned())
    }

    async fn update_project(&self, project: Project) -> StoreResult<bool> {
        let mut projects = write_lock(&self.projects);
        if !projects.contains_key(&project.project_id) {
            return Ok(false);
        }
        projects.insert(project.project_id.clone(), project);
        Ok(true)
    }

    async fn delete_project(&self, project_id: &str) -> StoreResult<bool> {
        Ok(write_lock(&self.projects).remove(project_id).is_some())
    }

    async fn get_projects(&self, project_ids: &[String]) -> StoreResult<Vec<Project>> {
        let projects = read_lock(&self.projects);
        Ok(project_ids
            .iter()
            .filter_map(|id| projects.get(id))
            .cloned()
            .collect())
    }
}

/// In-memory [`ExperimentStore`].
#[derive(Default)]
pub struct MemoryExperimentStore {
    experiments: RwLock<HashMap<String, Experiment>>,
}

impl MemoryExperimentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExperimentStore for MemoryExperimentStore {
    async fn create_experiment(&self, experiment: Experiment) -> StoreResult<String> {
        let experiment_id = experiment.experiment_id.clone();
        write_lock(&self.experiments).insert(experiment_id.clone(), experiment);
        Ok(experiment_id)
    }

    async fn get_experiment(&self, experiment_id: &str) -> StoreResult<Option<Experiment>> {
        Ok(read_lock(&self.experiments).get(experiment_id).cloned())
    }

    async fn delete_experiment(&self, experiment_id: &str) -> StoreResult<bool> {
        Ok(write_lock(&self.experiments).remove(experiment_id).is_some())
    }

    async fn get_experiments(&self, experiment_ids: &[String]) -> StoreResult<Vec<Experiment>> {
        let experiments = read_lock(&self.experiments);
        Ok(experiment_ids
            .iter()
            .filter_map(|id| experiments.get(id))
            .cloned()
            .collect())
    }
}

/// In-memory [`CredentialTokenStore`].
#[derive(Default)]
pub struct MemoryCredentialTokenStore {
    tokens: RwLock<HashMap<String, CredentialTokenRecord>>,
}

impl MemoryCredentialTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialTokenStore for MemoryCredentialTokenStore {
    async fn create_token(&self, record: CredentialTokenRecord) -> StoreResult<String> {
        let token_id = record.token_id.clone();
        write_lock(&self.tokens).insert(token_id.clone(), record);
        Ok(token_id)
    }

    async fn get_token(&self, token_id: &str) -> StoreResult<Option<CredentialTokenRecord>> {
        Ok(read_lock(&self.tokens).get(token_id).cloned())
    }

    async fn delete_token(&self, token_id: &str) -> StoreResult<bool> {
        Ok(write_lock(&self.tokens).remove(token_id).is_some())
    }
}
