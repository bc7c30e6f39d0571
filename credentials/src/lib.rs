//! Credential resolution for compute and storage access.
//!
//! Determines which SSH login identity and which stored credential token
//! to use when a principal accesses a resource, falling back through
//! user-level, group-level and gateway-level preference records, then
//! hands the result to an external adaptor factory for the actual
//! connection. See [`resolver`] for the precedence rules.

pub mod adaptor;
pub mod error;
pub mod resolver;

pub use adaptor::{
    AdaptorFactory, AdaptorHandle, DirectoryEntry, StorageDirectoryInfo, StorageVolumeInfo,
};
pub use error::{ResolutionError, Result};
pub use resolver::{CredentialResolver, LoginProvenance, StorageInfoContext};
