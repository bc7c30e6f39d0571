//! Business records of the primary store.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A project grouping experiments within a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub gateway_id: String,
    pub owner: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creation_time: NaiveDateTime,
}

/// An experiment run by a user within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub gateway_id: String,
    pub project_id: String,
    pub user_name: String,
    pub experiment_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creation_time: NaiveDateTime,
}

/// A registered credential token record. The secret material itself
/// lives in an external credential store; this is the shareable handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialTokenRecord {
    pub token_id: String,
    pub gateway_id: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creation_time: NaiveDateTime,
}
