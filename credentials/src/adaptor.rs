//! The external adaptor seam.
//!
//! Resolution ends by exchanging (gateway, resource, token, user, login)
//! for a live connection handle; everything behind the handle — SSH,
//! agents, remote I/O — is outside this crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Volume-level storage information for a remote path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageVolumeInfo {
    pub mount_point: String,
    pub total_bytes: u64,
    pub free_bytes: u64,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub size_bytes: u64,
    pub is_directory: bool,
}

/// A remote directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDirectoryInfo {
    pub path: String,
    pub entries: Vec<DirectoryEntry>,
    pub total_size_bytes: u64,
}

/// A live connection to a compute or storage resource.
#[async_trait]
pub trait AdaptorHandle: Send + Sync {
    async fn storage_volume_info(&self, path: &str) -> Result<StorageVolumeInfo>;

    async fn storage_directory_info(&self, path: &str) -> Result<StorageDirectoryInfo>;
}

/// Turns resolved identity and credentials into connection handles.
#[async_trait]
pub trait AdaptorFactory: Send + Sync {
    async fn fetch_compute_ssh_adaptor(
        &self,
        gateway_id: &str,
        compute_resource_id: &str,
        credential_token: &str,
        user_id: &str,
        login_user_name: &str,
    ) -> Result<Arc<dyn AdaptorHandle>>;

    async fn fetch_storage_ssh_adaptor(
        &self,
        gateway_id: &str,
        storage_resource_id: &str,
        credential_token: &str,
        user_id: &str,
        login_user_name: &str,
    ) -> Result<Arc<dyn AdaptorHandle>>;
}
