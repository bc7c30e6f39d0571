//! Sharing registry for the gateway middleware.
//!
//! The registry is the permission-grant store: domains (tenants), entity
//! types, permission types, users, groups, one entity record per
//! shareable object, and the grants recording who holds which permission
//! on what. The access-control and credential-resolution engines consume
//! it through the [`SharingRegistry`] trait; a SQLite implementation and
//! an in-memory twin are bundled.

pub mod error;
pub mod ids;
pub mod memory;
pub mod registry;
pub mod sqlite;
pub mod types;

pub use error::{Result, SharingError};
pub use ids::{EntityTypeId, PermissionId, PrincipalId};
pub use memory::MemorySharingRegistry;
pub use registry::SharingRegistry;
pub use sqlite::SqliteSharingRegistry;
pub use types::{
    Domain, Entity, EntitySearchField, EntityType, PermissionType, RegistryUser, SearchCondition,
    SearchCriteria, UserGroup,
};
