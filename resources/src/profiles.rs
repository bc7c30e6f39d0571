//! Preference-chain records for credential resolution.
//!
//! Three scopes, most specific first: per-user preferences, group
//! resource profiles (a bundle of compute preferences shared by a user
//! group), and gateway-level defaults. A record's `login_user_name` and
//! credential token are both optional; blank strings are treated as
//! absent by the resolution cascade.

use serde::{Deserialize, Serialize};

/// Gateway-wide credential defaults for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResourceProfile {
    pub user_id: String,
    pub gateway_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_store_token: Option<String>,
}

/// Per-user preference for one compute resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserComputeResourcePreference {
    pub user_id: String,
    pub gateway_id: String,
    pub compute_resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_specific_credential_store_token: Option<String>,
}

/// Per-user preference for one storage resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStoragePreference {
    pub user_id: String,
    pub gateway_id: String,
    pub storage_resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_specific_credential_store_token: Option<String>,
}

/// A named bundle of compute preferences shared by a group of users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResourceProfile {
    pub group_resource_profile_id: String,
    pub gateway_id: String,
    pub group_resource_profile_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_credential_store_token: Option<String>,
    #[serde(default)]
    pub compute_preferences: Vec<GroupComputeResourcePreference>,
}

/// One compute-resource preference within a [`GroupResourceProfile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupComputeResourcePreference {
    pub group_resource_profile_id: String,
    pub compute_resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_specific_credential_store_token: Option<String>,
}

/// Gateway-wide credential defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResourceProfile {
    pub gateway_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_store_token: Option<String>,
}

/// Gateway-level preference for one storage resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayStoragePreference {
    pub gateway_id: String,
    pub storage_resource_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_user_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_specific_credential_store_token: Option<String>,
}
