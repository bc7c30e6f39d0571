//! The closed error taxonomy of the service facade.
//!
//! Leaf crates keep their own error types; conversions into
//! [`ServiceError`] classify them into the six kinds callers dispatch
//! on. Unexpected downstream failures are logged with context before
//! being wrapped as [`ServiceError::System`].

use thiserror::Error;
use tracing::error;

/// Service error kinds, for callers that dispatch on category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AuthorizationDenied,
    InvalidRequest,
    AuthenticationFailure,
    SystemError,
    UnsupportedOperation,
}

/// Errors surfaced by the gateway service facade.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A referenced project, experiment or resource is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An explicit permission check failed before the operation ran.
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// A caller-correctable precondition violation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The credential token fallback chain was exhausted.
    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    /// A permission value outside the handled set reached a workflow; a
    /// defect in the calling code rather than bad user input.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Unexpected downstream failure, logged before wrapping.
    #[error("System error: {message}")]
    System {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServiceError {
    /// Wrap an unexpected downstream failure, logging it with context.
    pub fn system(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let message = message.into();
        error!("{}: {}", message, source);
        Self::System {
            message,
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AuthorizationDenied(_) => ErrorKind::AuthorizationDenied,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::AuthenticationFailure(_) => ErrorKind::AuthenticationFailure,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::System { .. } => ErrorKind::SystemError,
        }
    }
}

impl From<sharing::SharingError> for ServiceError {
    fn from(err: sharing::SharingError) -> Self {
        use sharing::SharingError;
        match err {
            SharingError::EntityNotFound(id) => Self::NotFound(format!("entity {}", id)),
            SharingError::DomainNotFound(id) => Self::NotFound(format!("domain {}", id)),
            SharingError::GroupNotFound(id) => Self::NotFound(format!("group {}", id)),
            SharingError::DuplicateEntry(id) => {
                Self::InvalidRequest(format!("duplicate entry {}", id))
            }
            SharingError::InvalidId(message) => Self::InvalidRequest(message),
            err => Self::system("Sharing registry failure", err),
        }
    }
}

impl From<authz::AuthzError> for ServiceError {
    fn from(err: authz::AuthzError) -> Self {
        use authz::AuthzError;
        match err {
            AuthzError::Denied(message) => Self::AuthorizationDenied(message),
            AuthzError::ProtectedGrant(message) => Self::InvalidRequest(message),
            AuthzError::UnsupportedPermission(name) => Self::UnsupportedOperation(name),
            AuthzError::Registry(inner) => inner.into(),
            err => Self::system("Authorization engine failure", err),
        }
    }
}

impl From<credentials::ResolutionError> for ServiceError {
    fn from(err: credentials::ResolutionError) -> Self {
        use credentials::ResolutionError;
        match err {
            ResolutionError::NoLoginUserName(message) => {
                Self::InvalidRequest(format!("No login username found for {}", message))
            }
            ResolutionError::TokenUnresolvable(message) => {
                Self::AuthenticationFailure(format!("No credential store token found for {}", message))
            }
            ResolutionError::UnknownResource(id) => Self::InvalidRequest(format!(
                "Resource '{}' not found as either compute resource or storage resource",
                id
            )),
            ResolutionError::Authz(inner) => inner.into(),
            err => Self::system("Credential resolution failure", err),
        }
    }
}

impl From<resources::ResourcesError> for ServiceError {
    fn from(err: resources::ResourcesError) -> Self {
        use resources::ResourcesError;
        match err {
            ResourcesError::NotFound(id) => Self::NotFound(id),
            err => Self::system("Resource store failure", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(ServiceError::NotFound("x".into()), ErrorKind::NotFound)]
    #[case::denied(ServiceError::AuthorizationDenied("x".into()), ErrorKind::AuthorizationDenied)]
    #[case::invalid(ServiceError::InvalidRequest("x".into()), ErrorKind::InvalidRequest)]
    #[case::auth(ServiceError::AuthenticationFailure("x".into()), ErrorKind::AuthenticationFailure)]
    #[case::unsupported(ServiceError::UnsupportedOperation("x".into()), ErrorKind::UnsupportedOperation)]
    fn test_error_kinds(#[case] err: ServiceError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn test_sharing_error_classification() {
        let err: ServiceError = sharing::SharingError::EntityNotFound("e1".into()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err: ServiceError = sharing::SharingError::Unavailable("down".into()).into();
        assert_eq!(err.kind(), ErrorKind::SystemError);
    }

    #[test]
    fn test_resolution_error_classification() {
        let err: ServiceError =
            credentials::ResolutionError::NoLoginUserName("compute resource c".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err: ServiceError =
            credentials::ResolutionError::TokenUnresolvable("gateway gw1".into()).into();
        assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
    }

    #[test]
    fn test_authz_error_classification() {
        let err: ServiceError = authz::AuthzError::Denied("no".into()).into();
        assert_eq!(err.kind(), ErrorKind::AuthorizationDenied);

        let err: ServiceError = authz::AuthzError::ProtectedGrant("admins".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);

        let err: ServiceError = authz::AuthzError::UnsupportedPermission("OWNER".into()).into();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }
}
