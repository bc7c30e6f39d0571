use thiserror::Error;

/// Errors produced by credential resolution.
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// No preference level yielded a login username. Caller-correctable:
    /// a preference record needs to be configured.
    #[error("No login username found for {0}")]
    NoLoginUserName(String),

    /// Every token fallback in the provenance-selected chain was absent.
    #[error("No credential store token found for {0}")]
    TokenUnresolvable(String),

    /// The resource id names neither a compute nor a storage resource.
    #[error("Resource '{0}' not found as either compute resource or storage resource")]
    UnknownResource(String),

    #[error("Profile store error: {0}")]
    Store(#[from] resources::ResourcesError),

    #[error("Authorization error: {0}")]
    Authz(#[from] authz::AuthzError),

    #[error("Adaptor error: {0}")]
    Adaptor(String),
}

pub type Result<T> = std::result::Result<T, ResolutionError>;
