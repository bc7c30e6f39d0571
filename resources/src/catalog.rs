//! Compute and storage resource catalogs.
//!
//! The catalogs answer one question for the credential engine: does this
//! id name a compute resource, a storage resource, or neither? Lookups
//! that miss return `Ok(None)` so the probe-both-and-branch entry point
//! can fall through without treating a miss as a failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A registered compute resource (cluster, HPC system).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputeResourceDescription {
    pub compute_resource_id: String,
    pub host_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// A registered storage resource (data store, archive host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageResourceDescription {
    pub storage_resource_id: String,
    pub host_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// Keyed catalog of compute and storage resources.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    async fn register_compute_resource(
        &self,
        resource: ComputeResourceDescription,
    ) -> Result<String>;

    async fn get_compute_resource(
        &self,
        compute_resource_id: &str,
    ) -> Result<Option<ComputeResourceDescription>>;

    async fn list_compute_resources(&self) -> Result<Vec<ComputeResourceDescription>>;

    async fn register_storage_resource(
        &self,
        resource: StorageResourceDescription,
    ) -> Result<String>;

    async fn get_storage_resource(
        &self,
        storage_resource_id: &str,
    ) -> Result<Option<StorageResourceDescription>>;

    async fn list_storage_resources(&self) -> Result<Vec<StorageResourceDescription>>;
}
