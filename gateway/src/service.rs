//! The service facade: CRUD-with-sharing workflows over the primary
//! store, the sharing registry, the access engine and the credential
//! resolver.
//!
//! Creation operations follow one shape: create the business record,
//! create the matching sharing entity (plus admin auto-sharing for
//! privileged kinds), and compensate by deleting the business record if
//! the sharing side fails. Permission checks always run before the
//! mutation or disclosure they guard.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use ulid::Ulid;

use authz::{AccessEngine, ResourcePermission, ResourceType};
use credentials::{CredentialResolver, StorageDirectoryInfo, StorageVolumeInfo};
use resources::{GroupResourceProfile, ProfileStore};
use sharing::{Domain, Entity, EntityType, PrincipalId, SearchCriteria, SharingError, SharingRegistry};

use crate::compensation::create_with_compensation;
use crate::error::{Result, ServiceError};
use crate::events::{EventPublisher, GatewayEvent};
use crate::models::{CredentialTokenRecord, Experiment, Project};
use crate::store::{CredentialTokenStore, ExperimentStore, ProjectStore};

/// The gateway middleware facade.
pub struct GatewayService {
    registry: Arc<dyn SharingRegistry>,
    access: Arc<AccessEngine>,
    resolver: Arc<CredentialResolver>,
    projects: Arc<dyn ProjectStore>,
    experiments: Arc<dyn ExperimentStore>,
    tokens: Arc<dyn CredentialTokenStore>,
    profiles: Arc<dyn ProfileStore>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl GatewayService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<dyn SharingRegistry>,
        access: Arc<AccessEngine>,
        resolver: Arc<CredentialResolver>,
        projects: Arc<dyn ProjectStore>,
        experiments: Arc<dyn ExperimentStore>,
        tokens: Arc<dyn CredentialTokenStore>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            registry,
            access,
            resolver,
            projects,
            experiments,
            tokens,
            profiles,
            publisher: None,
        }
    }

    /// Attach an event publisher. Without one, events are simply not
    /// emitted.
    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn access(&self) -> &Arc<AccessEngine> {
        &self.access
    }

    pub fn resolver(&self) -> &Arc<CredentialResolver> {
        &self.resolver
    }

    /// Provision the sharing-side records for a gateway: the domain, one
    /// entity type per resource kind and the four interpreted permission
    /// types. Safe to call repeatedly.
    pub async fn bootstrap_gateway(&self, domain: Domain) -> Result<()> {
        let domain_id = domain.domain_id.clone();
        if !self.registry.is_domain_exists(&domain_id).await? {
            match self.registry.create_domain(domain).await {
                Ok(_) | Err(SharingError::DuplicateEntry(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for resource_type in ResourceType::ALL {
            let entity_type_id = resource_type.entity_type_id(&domain_id);
            if self.registry.is_entity_type_exists(&entity_type_id).await? {
                continue;
            }
            let entity_type = EntityType {
                entity_type_id,
                domain_id: domain_id.clone(),
                name: resource_type.as_name().to_string(),
                description: Some(format!("{} entity type", resource_type.as_name())),
            };
            match self.registry.create_entity_type(entity_type).await {
                Ok(_) | Err(SharingError::DuplicateEntry(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for permission in [
            ResourcePermission::Read,
            ResourcePermission::Write,
            ResourcePermission::Owner,
            ResourcePermission::ManageSharing,
        ] {
            if self
                .registry
                .is_permission_type_exists(&permission.permission_id(&domain_id))
                .await?
            {
                continue;
            }
            match self
                .registry
                .create_permission_type(permission.permission_type(&domain_id))
                .await
            {
                Ok(_) | Err(SharingError::DuplicateEntry(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("Bootstrapped sharing domain for gateway {}", domain_id);
        Ok(())
    }

    /// Create a project and its sharing entity, rolling the project back
    /// if the entity cannot be created.
    pub async fn create_project(&self, principal: &PrincipalId, project: Project) -> Result<String> {
        if project.gateway_id != principal.domain_id {
            return Err(ServiceError::InvalidRequest(
                "Project gateway does not match the caller's gateway".to_string(),
            ));
        }

        let gateway_id = project.gateway_id.clone();
        let entity = Entity {
            entity_id: project.project_id.clone(),
            domain_id: gateway_id.clone(),
            entity_type_id: ResourceType::Project.entity_type_id(&gateway_id),
            owner_id: PrincipalId::new(&project.owner, &gateway_id),
            name: project.name.clone(),
            description: project.description.clone(),
            created_at: project.creation_time,
        };

        let create_store = self.projects.clone();
        let rollback_store = self.projects.clone();
        let registry = self.registry.clone();
        let record = project;

        let project_id = create_with_compensation(
            move || async move {
                create_store
                    .create_project(record)
                    .await
                    .map_err(ServiceError::from)
            },
            move |project_id: String| async move {
                match registry.create_entity(entity).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        error!("Rolling back project creation Proj ID : {}", project_id);
                        Err(ServiceError::from(e))
                    }
                }
            },
            move |project_id: String| async move {
                rollback_store
                    .delete_project(&project_id)
                    .await
                    .map(|_| ())
                    .map_err(ServiceError::from)
            },
        )
        .await?;

        debug!(
            "Created project with project Id : {} for gateway Id : {}",
            project_id, gateway_id
        );
        self.notify(GatewayEvent::ProjectCreated {
            gateway_id,
            project_id: project_id.clone(),
        })
        .await;
        Ok(project_id)
    }

    /// Fetch a project the principal owns or holds READ on.
    pub async fn get_project(&self, principal: &PrincipalId, project_id: &str) -> Result<Project> {
        let project = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {}", project_id)))?;
        self.require_record_access(
            principal,
            &project.owner,
            &project.gateway_id,
            project_id,
            ResourcePermission::Read,
        )
        .await?;
        Ok(project)
    }

    /// Update a project's name and description. Owner and gateway are
    /// immutable.
    pub async fn update_project(
        &self,
        principal: &PrincipalId,
        project_id: &str,
        updated: Project,
    ) -> Result<()> {
        let existing = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {}", project_id)))?;
        self.require_record_access(
            principal,
            &existing.owner,
            &existing.gateway_id,
            project_id,
            ResourcePermission::Write,
        )
        .await?;

        if updated.owner != existing.owner {
            return Err(ServiceError::InvalidRequest(
                "Owner of a project cannot be changed".to_string(),
            ));
        }
        if updated.gateway_id != existing.gateway_id {
            return Err(ServiceError::InvalidRequest(
                "Gateway ID of a project cannot be changed".to_string(),
            ));
        }

        let mut record = updated;
        record.project_id = existing.project_id;
        record.creation_time = existing.creation_time;
        self.projects.update_project(record).await?;
        debug!("Updated project with project Id : {}", project_id);
        Ok(())
    }

    /// Delete a project and its sharing entity. Entity cleanup is
    /// best-effort once the record is gone.
    pub async fn delete_project(&self, principal: &PrincipalId, project_id: &str) -> Result<bool> {
        let existing = self
            .projects
            .get_project(project_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("project {}", project_id)))?;
        self.require_record_access(
            principal,
            &existing.owner,
            &existing.gateway_id,
            project_id,
            ResourcePermission::Write,
        )
        .await?;

        let removed = self.projects.delete_project(project_id).await?;
        if let Err(e) = self.registry.delete_entity(&existing.gateway_id, project_id).await {
            warn!("Failed to delete sharing entity for project {}: {}", project_id, e);
        }
        debug!("Deleted project with project Id : {}", project_id);
        self.notify(GatewayEvent::ProjectDeleted {
            gateway_id: existing.gateway_id,
            project_id: project_id.to_string(),
        })
        .await;
        Ok(removed)
    }

    /// Projects the principal can see, in registry order.
    pub async fn list_user_projects(
        &self,
        principal: &PrincipalId,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Project>> {
        let filters = [SearchCriteria::entity_type(
            &ResourceType::Project.entity_type_id(&principal.domain_id),
        )];
        let entities = self
            .registry
            .search_entities(&principal.domain_id, principal, &filters, offset, limit)
            .await?;
        let ids: Vec<String> = entities.into_iter().map(|e| e.entity_id).collect();
        Ok(self.projects.get_projects(&ids).await?)
    }

    /// Create an experiment, its sharing entity, and the standing admin
    /// group grants; the experiment record is rolled back if the sharing
    /// side fails.
    pub async fn create_experiment(
        &self,
        principal: &PrincipalId,
        experiment: Experiment,
    ) -> Result<String> {
        if experiment.gateway_id != principal.domain_id {
            return Err(ServiceError::InvalidRequest(
                "Experiment gateway does not match the caller's gateway".to_string(),
            ));
        }

        let gateway_id = experiment.gateway_id.clone();
        let entity = Entity {
            entity_id: experiment.experiment_id.clone(),
            domain_id: gateway_id.clone(),
            entity_type_id: ResourceType::Experiment.entity_type_id(&gateway_id),
            owner_id: PrincipalId::new(&experiment.user_name, &gateway_id),
            name: experiment.experiment_name.clone(),
            description: experiment.description.clone(),
            created_at: experiment.creation_time,
        };

        let create_store = self.experiments.clone();
        let rollback_store = self.experiments.clone();
        let registry = self.registry.clone();
        let access = self.access.clone();
        let record = experiment;

        let experiment_id = create_with_compensation(
            move || async move {
                create_store
                    .create_experiment(record)
                    .await
                    .map_err(ServiceError::from)
            },
            move |experiment_id: String| async move {
                let result: Result<()> = async {
                    registry.create_entity(entity.clone()).await?;
                    access.share_entity_with_admin_gateway_groups(&entity).await?;
                    Ok(())
                }
                .await;
                if result.is_err() {
                    error!("Rolling back experiment creation Exp ID : {}", experiment_id);
                }
                result
            },
            move |experiment_id: String| async move {
                if let Err(e) = rollback_store.delete_experiment(&experiment_id).await {
                    error!("Error deleting experiment during rollback: {}", e);
                }
                Ok(())
            },
        )
        .await?;

        debug!("Created experiment with experiment id : {}", experiment_id);
        self.notify(GatewayEvent::ExperimentCreated {
            gateway_id,
            experiment_id: experiment_id.clone(),
        })
        .await;
        Ok(experiment_id)
    }

    /// Fetch an experiment the principal created or holds READ on.
    pub async fn get_experiment(
        &self,
        principal: &PrincipalId,
        experiment_id: &str,
    ) -> Result<Experiment> {
        let experiment = self
            .experiments
            .get_experiment(experiment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("experiment {}", experiment_id)))?;
        self.require_record_access(
            principal,
            &experiment.user_name,
            &experiment.gateway_id,
            experiment_id,
            ResourcePermission::Read,
        )
        .await?;
        Ok(experiment)
    }

    /// Clone an experiment the principal can read into a new experiment
    /// owned by the principal, with the full creation-with-sharing tail.
    pub async fn clone_experiment(
        &self,
        principal: &PrincipalId,
        existing_experiment_id: &str,
        new_experiment_name: &str,
        project_id: Option<&str>,
    ) -> Result<String> {
        let existing = self
            .experiments
            .get_experiment(existing_experiment_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("experiment {}", existing_experiment_id))
            })?;
        self.require_record_access(
            principal,
            &existing.user_name,
            &existing.gateway_id,
            existing_experiment_id,
            ResourcePermission::Read,
        )
        .await?;

        let cloned = Experiment {
            experiment_id: Ulid::new().to_string(),
            gateway_id: existing.gateway_id.clone(),
            project_id: project_id
                .map(str::to_string)
                .unwrap_or_else(|| existing.project_id.clone()),
            user_name: principal.user_id.clone(),
            experiment_name: new_experiment_name.to_string(),
            description: existing.description.clone(),
            creation_time: Utc::now().naive_utc(),
        };
        debug!("Cloned experiment with experiment id : {}", existing_experiment_id);
        self.create_experiment(principal, cloned).await
    }

    /// Delete an experiment and its sharing entity.
    pub async fn delete_experiment(
        &self,
        principal: &PrincipalId,
        experiment_id: &str,
    ) -> Result<bool> {
        let existing = self
            .experiments
            .get_experiment(experiment_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("experiment {}", experiment_id)))?;
        self.require_record_access(
            principal,
            &existing.user_name,
            &existing.gateway_id,
            experiment_id,
            ResourcePermission::Write,
        )
        .await?;

        let removed = self.experiments.delete_experiment(experiment_id).await?;
        if let Err(e) = self
            .registry
            .delete_entity(&existing.gateway_id, experiment_id)
            .await
        {
            warn!(
                "Failed to delete sharing entity for experiment {}: {}",
                experiment_id, e
            );
        }
        self.notify(GatewayEvent::ExperimentDeleted {
            gateway_id: existing.gateway_id,
            experiment_id: experiment_id.to_string(),
        })
        .await;
        Ok(removed)
    }

    /// Register a credential token record and its sharing entity, rolling
    /// the record back if the entity cannot be created.
    pub async fn register_credential_token(
        &self,
        principal: &PrincipalId,
        description: Option<String>,
    ) -> Result<String> {
        let token_id = Ulid::new().to_string();
        let creation_time = Utc::now().naive_utc();
        let record = CredentialTokenRecord {
            token_id: token_id.clone(),
            gateway_id: principal.domain_id.clone(),
            owner: principal.user_id.clone(),
            description: description.clone(),
            creation_time,
        };
        let entity = Entity {
            entity_id: token_id.clone(),
            domain_id: principal.domain_id.clone(),
            entity_type_id: ResourceType::CredentialToken.entity_type_id(&principal.domain_id),
            owner_id: principal.clone(),
            name: token_id.clone(),
            description,
            created_at: creation_time,
        };

        let create_store = self.tokens.clone();
        let rollback_store = self.tokens.clone();
        let registry = self.registry.clone();
        let owner = principal.user_id.clone();

        let token_id = create_with_compensation(
            move || async move {
                create_store
                    .create_token(record)
                    .await
                    .map_err(ServiceError::from)
            },
            move |token_id: String| async move {
                match registry.create_entity(entity).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        error!(
                            "Rolling back credential token creation for user {} token {}",
                            owner, token_id
                        );
                        Err(ServiceError::from(e))
                    }
                }
            },
            move |token_id: String| async move {
                rollback_store
                    .delete_token(&token_id)
                    .await
                    .map(|_| ())
                    .map_err(ServiceError::from)
            },
        )
        .await?;

        debug!(
            "Registered credential token {} for gateway {}",
            token_id, principal.domain_id
        );
        self.notify(GatewayEvent::CredentialRegistered {
            gateway_id: principal.domain_id.clone(),
            token_id: token_id.clone(),
        })
        .await;
        Ok(token_id)
    }

    /// Create a group resource profile, its sharing entity and the admin
    /// group grants, rolling the profile back if the sharing side fails.
    pub async fn create_group_resource_profile(
        &self,
        principal: &PrincipalId,
        mut profile: GroupResourceProfile,
    ) -> Result<String> {
        if profile.gateway_id != principal.domain_id {
            return Err(ServiceError::InvalidRequest(
                "Group resource profile gateway does not match the caller's gateway".to_string(),
            ));
        }
        if profile.group_resource_profile_name.trim().is_empty() {
            return Err(ServiceError::InvalidRequest(
                "Group resource profile name cannot be empty".to_string(),
            ));
        }
        if profile.group_resource_profile_id.trim().is_empty() {
            profile.group_resource_profile_id = Ulid::new().to_string();
        }

        let profile_id = profile.group_resource_profile_id.clone();
        let entity = Entity {
            entity_id: profile_id.clone(),
            domain_id: profile.gateway_id.clone(),
            entity_type_id: ResourceType::GroupResourceProfile.entity_type_id(&profile.gateway_id),
            owner_id: principal.clone(),
            name: profile.group_resource_profile_name.clone(),
            description: None,
            created_at: Utc::now().naive_utc(),
        };

        let create_store = self.profiles.clone();
        let rollback_store = self.profiles.clone();
        let registry = self.registry.clone();
        let access = self.access.clone();

        let profile_id = create_with_compensation(
            move || async move {
                create_store
                    .put_group_resource_profile(profile)
                    .await
                    .map_err(ServiceError::from)?;
                Ok(profile_id)
            },
            move |profile_id: String| async move {
                let result: Result<()> = async {
                    registry.create_entity(entity.clone()).await?;
                    access.share_entity_with_admin_gateway_groups(&entity).await?;
                    Ok(())
                }
                .await;
                if result.is_err() {
                    error!(
                        "Rolling back group resource profile creation Group Resource Profile ID : {}",
                        profile_id
                    );
                }
                result
            },
            move |profile_id: String| async move {
                if let Err(e) = rollback_store.delete_group_resource_profile(&profile_id).await {
                    error!("Failed to rollback group resource profile deletion: {}", e);
                }
                Ok(())
            },
        )
        .await?;

        debug!("Created group resource profile {}", profile_id);
        Ok(profile_id)
    }

    /// Whether the principal holds the permission on the resource.
    pub async fn user_has_access(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        permission: ResourcePermission,
    ) -> Result<bool> {
        Ok(self.access.user_has_access(principal, resource_id, permission).await?)
    }

    pub async fn share_resource_with_users(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        user_permissions: &[(PrincipalId, ResourcePermission)],
    ) -> Result<bool> {
        self.access
            .share_resource_with_users(principal, resource_id, user_permissions)
            .await?;
        Ok(true)
    }

    pub async fn share_resource_with_groups(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        group_permissions: &[(String, ResourcePermission)],
    ) -> Result<bool> {
        self.access
            .share_resource_with_groups(principal, resource_id, group_permissions)
            .await?;
        Ok(true)
    }

    pub async fn revoke_sharing_from_users(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        user_permissions: &[(PrincipalId, ResourcePermission)],
    ) -> Result<bool> {
        self.access
            .revoke_sharing_from_users(principal, resource_id, user_permissions)
            .await?;
        Ok(true)
    }

    pub async fn revoke_sharing_from_groups(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        group_permissions: &[(String, ResourcePermission)],
    ) -> Result<bool> {
        self.access
            .revoke_sharing_from_groups(principal, resource_id, group_permissions)
            .await?;
        Ok(true)
    }

    pub async fn accessible_users(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        permission: ResourcePermission,
        directly_shared_only: bool,
    ) -> Result<Vec<PrincipalId>> {
        Ok(self
            .access
            .accessible_users(principal, resource_id, permission, directly_shared_only)
            .await?)
    }

    pub async fn accessible_groups(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        permission: ResourcePermission,
        directly_shared_only: bool,
    ) -> Result<Vec<String>> {
        Ok(self
            .access
            .accessible_groups(principal, resource_id, permission, directly_shared_only)
            .await?)
    }

    /// Volume info for a path on a compute or storage resource, after
    /// credential resolution.
    pub async fn get_resource_storage_info(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        location: &str,
    ) -> Result<StorageVolumeInfo> {
        Ok(self
            .resolver
            .get_resource_storage_info(principal, resource_id, location)
            .await?)
    }

    /// Directory listing for a path on a compute or storage resource,
    /// after credential resolution.
    pub async fn get_storage_directory_info(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        location: &str,
    ) -> Result<StorageDirectoryInfo> {
        Ok(self
            .resolver
            .get_storage_directory_info(principal, resource_id, location)
            .await?)
    }

    /// Owner fast-path, then the registry-backed permission check.
    async fn require_record_access(
        &self,
        principal: &PrincipalId,
        record_owner: &str,
        record_gateway: &str,
        entity_id: &str,
        permission: ResourcePermission,
    ) -> Result<()> {
        if principal.user_id == record_owner && principal.domain_id == record_gateway {
            return Ok(());
        }
        if self.access.user_has_access(principal, entity_id, permission).await? {
            return Ok(());
        }
        Err(ServiceError::AuthorizationDenied(
            "User does not have permission to access this resource".to_string(),
        ))
    }

    async fn notify(&self, event: GatewayEvent) {
        if let Some(publisher) = &self.publisher {
            if let Err(e) = publisher.publish(&event).await {
                warn!("Failed to publish gateway event: {}", e);
            }
        }
    }
}
