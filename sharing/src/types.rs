//! Record types stored by the sharing registry.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityTypeId, PermissionId, PrincipalId};

/// A tenant boundary. Every entity, permission type and grant is scoped
/// to exactly one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub domain_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Domain {
    pub fn new(domain_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            domain_id: domain_id.into(),
            name: name.into(),
            description: None,
        }
    }
}

/// A kind of shareable object within a domain (PROJECT, EXPERIMENT, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub entity_type_id: EntityTypeId,
    pub domain_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A grantable permission within a domain (READ, WRITE, OWNER, ...).
///
/// The set is open: domains may define permission types beyond the four
/// the access engine interprets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionType {
    pub permission_type_id: PermissionId,
    pub domain_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One record per shareable object. Created alongside the business
/// resource it mirrors and deleted with it; only name and description
/// are ever updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub entity_id: String,
    pub domain_id: String,
    pub entity_type_id: EntityTypeId,
    pub owner_id: PrincipalId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A user known to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryUser {
    pub user_id: PrincipalId,
    pub domain_id: String,
    pub user_name: String,
}

/// A named group of users within a domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserGroup {
    pub group_id: String,
    pub domain_id: String,
    pub name: String,
    pub owner_id: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Search field selector for [`SearchCriteria`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitySearchField {
    EntityTypeId,
    Name,
}

/// Match condition for [`SearchCriteria`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchCondition {
    Equal,
    Like,
}

/// One filter clause for entity searches. Multiple criteria are ANDed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub field: EntitySearchField,
    pub condition: SearchCondition,
    pub value: String,
}

impl SearchCriteria {
    pub fn entity_type(entity_type_id: &EntityTypeId) -> Self {
        Self {
            field: EntitySearchField::EntityTypeId,
            condition: SearchCondition::Equal,
            value: entity_type_id.to_string(),
        }
    }

    pub fn name_like(pattern: impl Into<String>) -> Self {
        Self {
            field: EntitySearchField::Name,
            condition: SearchCondition::Like,
            value: pattern.into(),
        }
    }
}
