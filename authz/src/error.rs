use thiserror::Error;

/// Errors produced by the access-control engine.
#[derive(Error, Debug)]
pub enum AuthzError {
    #[error("Registry error: {0}")]
    Registry(#[from] sharing::SharingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Authorization denied: {0}")]
    Denied(String),

    /// A permission value outside the handled set reached a sharing
    /// workflow. This is a defect in the calling code, not bad input.
    #[error("Unsupported permission type: {0}")]
    UnsupportedPermission(String),

    /// An attempt to revoke an admin-group grant that must never be
    /// removed. Raised before any revoke call is issued.
    #[error("Protected grant: {0}")]
    ProtectedGrant(String),

    #[error("Unrecognized entity type: {0}")]
    UnknownResourceType(String),
}

pub type Result<T> = std::result::Result<T, AuthzError>;
