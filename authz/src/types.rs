//! Core types for registry-grant based authorization.

use serde::{Deserialize, Serialize};
use sharing::{EntityTypeId, PermissionId, PermissionType};

/// The permission values the access engine interprets.
///
/// The registry's permission-type set is open; these are the four the
/// sharing workflows understand. OWNER implies every other permission
/// (the owner override), and only entity creation can confer it — the
/// share workflows reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourcePermission {
    Read,
    Write,
    Owner,
    ManageSharing,
}

impl ResourcePermission {
    /// The registry-facing name, e.g. `MANAGE_SHARING`.
    pub fn as_name(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Owner => "OWNER",
            Self::ManageSharing => "MANAGE_SHARING",
        }
    }

    /// The permission-type id for this permission in the given domain.
    pub fn permission_id(&self, domain_id: &str) -> PermissionId {
        PermissionId::new(domain_id, self.as_name())
    }

    /// A registry record for provisioning this permission type.
    pub fn permission_type(&self, domain_id: &str) -> PermissionType {
        PermissionType {
            permission_type_id: self.permission_id(domain_id),
            domain_id: domain_id.to_string(),
            name: self.as_name().to_string(),
            description: Some(format!("{} permission type", self.as_name())),
        }
    }
}

/// The kinds of shareable resources the middleware manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Project,
    Experiment,
    ApplicationDeployment,
    GroupResourceProfile,
    CredentialToken,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        Self::Project,
        Self::Experiment,
        Self::ApplicationDeployment,
        Self::GroupResourceProfile,
        Self::CredentialToken,
    ];

    /// The registry-facing name, e.g. `GROUP_RESOURCE_PROFILE`.
    pub fn as_name(&self) -> &'static str {
        match self {
            Self::Project => "PROJECT",
            Self::Experiment => "EXPERIMENT",
            Self::ApplicationDeployment => "APPLICATION_DEPLOYMENT",
            Self::GroupResourceProfile => "GROUP_RESOURCE_PROFILE",
            Self::CredentialToken => "CREDENTIAL_TOKEN",
        }
    }

    /// The entity-type id for this resource kind in the given domain.
    pub fn entity_type_id(&self, domain_id: &str) -> EntityTypeId {
        EntityTypeId::new(domain_id, self.as_name())
    }

    /// Reverse lookup from an entity-type id. `None` for unrecognized
    /// type names.
    pub fn from_entity_type_id(entity_type_id: &EntityTypeId) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_name() == entity_type_id.name)
    }

    /// Whether admin-group grants on this resource kind are protected
    /// from revocation.
    pub fn admin_restricted(&self) -> bool {
        matches!(
            self,
            Self::Experiment | Self::ApplicationDeployment | Self::GroupResourceProfile
        )
    }
}

/// The fixed admin groups of a gateway, lazily created on first access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayGroups {
    pub gateway_id: String,
    pub admins_group_id: String,
    pub read_only_admins_group_id: String,
}
