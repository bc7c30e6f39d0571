//! Resource catalogs and credential-preference records.
//!
//! Two concerns live here: the compute/storage catalogs the credential
//! engine probes to classify a resource id, and the three-scope
//! preference chain (user, group, gateway) the resolution cascade walks.

pub mod catalog;
pub mod error;
pub mod memory;
pub mod profiles;
pub mod sqlite;
pub mod store;

pub use catalog::{ComputeResourceDescription, ResourceCatalog, StorageResourceDescription};
pub use error::{ResourcesError, Result};
pub use memory::MemoryResourceStore;
pub use profiles::{
    GatewayResourceProfile, GatewayStoragePreference, GroupComputeResourcePreference,
    GroupResourceProfile, UserComputeResourcePreference, UserResourceProfile,
    UserStoragePreference,
};
pub use sqlite::SqliteResourceStore;
pub use store::ProfileStore;
