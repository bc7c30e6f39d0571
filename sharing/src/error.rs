use thiserror::Error;

/// Errors produced by sharing registry implementations.
#[derive(Error, Debug)]
pub enum SharingError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Domain not found: {0}")]
    DomainNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SharingError>;
