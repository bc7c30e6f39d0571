//! Structured identifiers used throughout the sharing registry.
//!
//! The registry historically rendered composite keys as plain strings
//! (`user@domain`, `domain:PERMISSION`). These value types keep the parts
//! separate so equality is structural, while `Display`/`parse` keep the
//! rendered forms stable for storage and interop.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SharingError};

/// Composite identity of a user within a domain.
///
/// Rendered as `user@domain`. User ids may themselves contain `@`
/// (email-style usernames), so parsing splits on the *last* `@`; raw ids
/// containing the separator are a pre-existing ambiguity of the rendered
/// form and are not escaped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PrincipalId {
    /// The user identifier within the domain.
    pub user_id: String,
    /// The domain (gateway/tenant) the user belongs to.
    pub domain_id: String,
}

impl PrincipalId {
    pub fn new(user_id: impl Into<String>, domain_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            domain_id: domain_id.into(),
        }
    }

    /// Parse a `user@domain` rendering, splitting on the last `@`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.rsplit_once('@') {
            Some((user, domain)) if !user.is_empty() && !domain.is_empty() => {
                Ok(Self::new(user, domain))
            }
            _ => Err(SharingError::InvalidId(format!(
                "expected user@domain, got '{}'",
                raw
            ))),
        }
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.domain_id)
    }
}

/// Composite identifier of a permission type within a domain.
///
/// Rendered as `domain:NAME`. Parsing splits on the first `:`; domain ids
/// containing the separator are not escaped (same caveat as
/// [`PrincipalId`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionId {
    /// The domain the permission type belongs to.
    pub domain_id: String,
    /// The permission name, e.g. `READ` or `MANAGE_SHARING`.
    pub name: String,
}

impl PermissionId {
    pub fn new(domain_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            name: name.into(),
        }
    }

    /// Parse a `domain:NAME` rendering, splitting on the first `:`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once(':') {
            Some((domain, name)) if !domain.is_empty() && !name.is_empty() => {
                Ok(Self::new(domain, name))
            }
            _ => Err(SharingError::InvalidId(format!(
                "expected domain:NAME, got '{}'",
                raw
            ))),
        }
    }
}

impl fmt::Display for PermissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain_id, self.name)
    }
}

/// Composite identifier of an entity type within a domain.
///
/// Rendered as `domain:NAME`, like [`PermissionId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityTypeId {
    /// The domain the entity type belongs to.
    pub domain_id: String,
    /// The entity type name, e.g. `PROJECT` or `EXPERIMENT`.
    pub name: String,
}

impl EntityTypeId {
    pub fn new(domain_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            name: name.into(),
        }
    }

    /// Parse a `domain:NAME` rendering, splitting on the first `:`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once(':') {
            Some((domain, name)) if !domain.is_empty() && !name.is_empty() => {
                Ok(Self::new(domain, name))
            }
            _ => Err(SharingError::InvalidId(format!(
                "expected domain:NAME, got '{}'",
                raw
            ))),
        }
    }
}

impl fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain_id, self.name)
    }
}
