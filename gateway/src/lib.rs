//! Gateway middleware facade.
//!
//! Ties the sharing registry, access-control engine, credential resolver
//! and primary stores together into the service surface an RPC layer
//! would expose: project and experiment CRUD with sharing-side entity
//! management and compensating rollback, credential token registration,
//! gateway bootstrap, sharing passthroughs and storage-info access.

pub mod compensation;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod service;
pub mod sqlite;
pub mod store;

pub use compensation::create_with_compensation;
pub use error::{ErrorKind, Result, ServiceError};
pub use events::{EventPublisher, GatewayEvent, LoggingEventPublisher, PublishError};
pub use models::{CredentialTokenRecord, Experiment, Project};
pub use service::GatewayService;
pub use sqlite::SqlitePrimaryStore;
pub use store::{
    CredentialTokenStore, ExperimentStore, MemoryCredentialTokenStore, MemoryExperimentStore,
    MemoryProjectStore, ProjectStore, StoreError, StoreResult,
};
