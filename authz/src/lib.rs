//! Registry-grant based authorization for the gateway middleware.
//!
//! This crate provides the access-control resolution engine sitting on
//! top of the sharing registry. It answers "does this principal hold this
//! permission on this entity" and runs the sharing workflows that mutate
//! grants (share, revoke, admin auto-sharing).
//!
//! # Resolution order
//!
//! 1. **Owner override** — an OWNER grant satisfies every permission
//!    check, including permissions never explicitly granted.
//! 2. **Requested permission** — direct user grant or a grant to any
//!    group the principal belongs to.
//!
//! Boolean checks are fail-closed: if the registry cannot be reached,
//! [`AccessEngine::has_access`] logs a warning and returns `false`.
//! Inability to verify access is never treated as access granted.

pub mod error;
pub mod groups;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};
use ulid::Ulid;

use sharing::{Entity, PrincipalId, SearchCriteria, SharingError, SharingRegistry, UserGroup};

pub use error::{AuthzError, Result};
pub use groups::{GatewayGroupsStore, MemoryGatewayGroupsStore, SqliteGatewayGroupsStore};
pub use types::{GatewayGroups, ResourcePermission, ResourceType};

/// The access-control resolution engine.
pub struct AccessEngine {
    registry: Arc<dyn SharingRegistry>,
    groups_store: Arc<dyn GatewayGroupsStore>,
}

impl AccessEngine {
    pub fn new(registry: Arc<dyn SharingRegistry>, groups_store: Arc<dyn GatewayGroupsStore>) -> Self {
        Self {
            registry,
            groups_store,
        }
    }

    pub fn registry(&self) -> &Arc<dyn SharingRegistry> {
        &self.registry
    }

    /// Whether the principal holds the permission on the entity, with the
    /// owner override applied. Registry errors propagate; use
    /// [`has_access`](Self::has_access) where an outage must read as
    /// denial instead.
    pub async fn user_has_access(
        &self,
        principal: &PrincipalId,
        entity_id: &str,
        permission: ResourcePermission,
    ) -> Result<bool> {
        let domain_id = principal.domain_id.clone();
        let has_owner = self
            .registry
            .user_has_access(
                &domain_id,
                principal,
                entity_id,
                &ResourcePermission::Owner.permission_id(&domain_id),
            )
            .await?;
        if permission == ResourcePermission::Owner {
            return Ok(has_owner);
        }
        if has_owner {
            return Ok(true);
        }
        let has_permission = self
            .registry
            .user_has_access(
                &domain_id,
                principal,
                entity_id,
                &permission.permission_id(&domain_id),
            )
            .await?;
        Ok(has_permission)
    }

    /// Fail-closed boolean check: a registry failure logs a warning and
    /// denies rather than propagating.
    pub async fn has_access(
        &self,
        principal: &PrincipalId,
        entity_id: &str,
        permission: ResourcePermission,
    ) -> bool {
        match self.user_has_access(principal, entity_id, permission).await {
            Ok(allowed) => allowed,
            Err(e) => {
                warn!(
                    "Access check failed for {} on entity {}: {}; denying",
                    principal, entity_id, e
                );
                false
            }
        }
    }

    /// Share a resource with users. The caller must hold OWNER or
    /// MANAGE_SHARING; granting MANAGE_SHARING additionally requires
    /// OWNER. Grants cascade.
    pub async fn share_resource_with_users(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        user_permissions: &[(PrincipalId, ResourcePermission)],
    ) -> Result<()> {
        self.require_sharing_rights(principal, resource_id).await?;
        let domain_id = &principal.domain_id;
        for (user, permission) in user_permissions {
            match permission {
                ResourcePermission::Write | ResourcePermission::Read => {
                    self.registry
                        .share_entity_with_users(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(user),
                            &permission.permission_id(domain_id),
                            true,
                        )
                        .await?;
                }
                ResourcePermission::ManageSharing => {
                    self.require_owner_for_manage_sharing(principal, resource_id)
                        .await?;
                    self.ensure_manage_sharing_permission_type(domain_id).await?;
                    self.registry
                        .share_entity_with_users(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(user),
                            &permission.permission_id(domain_id),
                            true,
                        )
                        .await?;
                }
                ResourcePermission::Owner => {
                    error!("Invalid permission for sharing: {}", permission.as_name());
                    return Err(AuthzError::UnsupportedPermission(
                        permission.as_name().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Share a resource with groups. Same preconditions as
    /// [`share_resource_with_users`](Self::share_resource_with_users).
    pub async fn share_resource_with_groups(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        group_permissions: &[(String, ResourcePermission)],
    ) -> Result<()> {
        self.require_sharing_rights(principal, resource_id).await?;
        let domain_id = &principal.domain_id;
        for (group_id, permission) in group_permissions {
            match permission {
                ResourcePermission::Write | ResourcePermission::Read => {
                    self.registry
                        .share_entity_with_groups(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(group_id),
                            &permission.permission_id(domain_id),
                            true,
                        )
                        .await?;
                }
                ResourcePermission::ManageSharing => {
                    self.require_owner_for_manage_sharing(principal, resource_id)
                        .await?;
                    self.ensure_manage_sharing_permission_type(domain_id).await?;
                    self.registry
                        .share_entity_with_groups(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(group_id),
                            &permission.permission_id(domain_id),
                            true,
                        )
                        .await?;
                }
                ResourcePermission::Owner => {
                    error!("Invalid permission for sharing: {}", permission.as_name());
                    return Err(AuthzError::UnsupportedPermission(
                        permission.as_name().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Revoke user grants on a resource. Same preconditions as the share
    /// workflow.
    pub async fn revoke_sharing_from_users(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        user_permissions: &[(PrincipalId, ResourcePermission)],
    ) -> Result<()> {
        self.require_sharing_rights(principal, resource_id).await?;
        let domain_id = &principal.domain_id;
        for (user, permission) in user_permissions {
            match permission {
                ResourcePermission::Write | ResourcePermission::Read => {
                    self.registry
                        .revoke_entity_sharing_from_users(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(user),
                            &permission.permission_id(domain_id),
                        )
                        .await?;
                }
                ResourcePermission::ManageSharing => {
                    self.require_owner_for_manage_sharing(principal, resource_id)
                        .await?;
                    self.ensure_manage_sharing_permission_type(domain_id).await?;
                    self.registry
                        .revoke_entity_sharing_from_users(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(user),
                            &permission.permission_id(domain_id),
                        )
                        .await?;
                }
                ResourcePermission::Owner => {
                    error!("Invalid permission for revocation: {}", permission.as_name());
                    return Err(AuthzError::UnsupportedPermission(
                        permission.as_name().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Revoke group grants on a resource.
    ///
    /// For experiments, application deployments and group resource
    /// profiles, the gateway admin groups' standing grants are protected:
    /// the whole request is validated before any revoke call is issued,
    /// and a protected pair fails it with [`AuthzError::ProtectedGrant`].
    pub async fn revoke_sharing_from_groups(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        group_permissions: &[(String, ResourcePermission)],
    ) -> Result<()> {
        self.require_sharing_rights(principal, resource_id).await?;
        let domain_id = &principal.domain_id;

        let resource_type = self.resource_type(domain_id, resource_id).await?;
        if resource_type.admin_restricted() {
            let gateway_groups = self.gateway_groups(domain_id).await?;
            for (group_id, permission) in group_permissions {
                if *group_id == gateway_groups.admins_group_id
                    && matches!(
                        permission,
                        ResourcePermission::Write
                            | ResourcePermission::Read
                            | ResourcePermission::ManageSharing
                    )
                {
                    return Err(AuthzError::ProtectedGrant(format!(
                        "Not allowed to remove Admins group's {} access",
                        permission.as_name()
                    )));
                }
                if *group_id == gateway_groups.read_only_admins_group_id
                    && *permission == ResourcePermission::Read
                {
                    return Err(AuthzError::ProtectedGrant(
                        "Not allowed to remove Read Only Admins group's READ access".to_string(),
                    ));
                }
            }
        }

        for (group_id, permission) in group_permissions {
            match permission {
                ResourcePermission::Write | ResourcePermission::Read => {
                    self.registry
                        .revoke_entity_sharing_from_groups(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(group_id),
                            &permission.permission_id(domain_id),
                        )
                        .await?;
                }
                ResourcePermission::ManageSharing => {
                    self.require_owner_for_manage_sharing(principal, resource_id)
                        .await?;
                    self.ensure_manage_sharing_permission_type(domain_id).await?;
                    self.registry
                        .revoke_entity_sharing_from_groups(
                            domain_id,
                            resource_id,
                            std::slice::from_ref(group_id),
                            &permission.permission_id(domain_id),
                        )
                        .await?;
                }
                ResourcePermission::Owner => {
                    error!("Invalid permission for revocation: {}", permission.as_name());
                    return Err(AuthzError::UnsupportedPermission(
                        permission.as_name().to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Users holding the permission on the resource. WRITE, READ and
    /// MANAGE_SHARING union the OWNER holders in; OWNER queries only the
    /// OWNER grant.
    pub async fn accessible_users(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        permission: ResourcePermission,
        directly_shared_only: bool,
    ) -> Result<Vec<PrincipalId>> {
        let domain_id = &principal.domain_id;
        let mut queried = vec![permission];
        if permission != ResourcePermission::Owner {
            queried.push(ResourcePermission::Owner);
        }

        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for query_permission in queried {
            let permission_id = query_permission.permission_id(domain_id);
            let found = if directly_shared_only {
                self.registry
                    .get_list_of_directly_shared_users(domain_id, resource_id, &permission_id)
                    .await?
            } else {
                self.registry
                    .get_list_of_shared_users(domain_id, resource_id, &permission_id)
                    .await?
            };
            for user in found {
                if seen.insert(user.user_id.to_string()) {
                    users.push(user.user_id);
                }
            }
        }
        Ok(users)
    }

    /// Groups holding the permission on the resource, with the same
    /// OWNER-union rule as [`accessible_users`](Self::accessible_users).
    pub async fn accessible_groups(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        permission: ResourcePermission,
        directly_shared_only: bool,
    ) -> Result<Vec<String>> {
        let domain_id = &principal.domain_id;
        let mut queried = vec![permission];
        if permission != ResourcePermission::Owner {
            queried.push(ResourcePermission::Owner);
        }

        let mut seen = HashSet::new();
        let mut groups = Vec::new();
        for query_permission in queried {
            let permission_id = query_permission.permission_id(domain_id);
            let found = if directly_shared_only {
                self.registry
                    .get_list_of_directly_shared_groups(domain_id, resource_id, &permission_id)
                    .await?
            } else {
                self.registry
                    .get_list_of_shared_groups(domain_id, resource_id, &permission_id)
                    .await?
            };
            for group in found {
                if seen.insert(group.group_id.clone()) {
                    groups.push(group.group_id);
                }
            }
        }
        Ok(groups)
    }

    /// Entity ids of the given resource kind that the principal can see,
    /// in the order the registry returns them.
    pub async fn accessible_entity_ids(
        &self,
        principal: &PrincipalId,
        resource_type: ResourceType,
    ) -> Result<Vec<String>> {
        let domain_id = &principal.domain_id;
        let filters = [SearchCriteria::entity_type(
            &resource_type.entity_type_id(domain_id),
        )];
        let entities = self
            .registry
            .search_entities(domain_id, principal, &filters, 0, -1)
            .await?;
        Ok(entities.into_iter().map(|e| e.entity_id).collect())
    }

    /// Create the MANAGE_SHARING permission type for the domain if it
    /// does not exist yet. Gateways created before the permission was
    /// introduced may be missing it.
    pub async fn ensure_manage_sharing_permission_type(&self, domain_id: &str) -> Result<()> {
        let permission = ResourcePermission::ManageSharing;
        if self
            .registry
            .is_permission_type_exists(&permission.permission_id(domain_id))
            .await?
        {
            return Ok(());
        }
        match self
            .registry
            .create_permission_type(permission.permission_type(domain_id))
            .await
        {
            Ok(_) => {
                info!("Created MANAGE_SHARING permission type for domain {}", domain_id);
                Ok(())
            }
            // A concurrent caller beat us to it.
            Err(SharingError::DuplicateEntry(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Grant the gateway admin groups their standing access to a newly
    /// created entity: Admins get MANAGE_SHARING and WRITE, Admins and
    /// Read-Only-Admins both get READ. All grants cascade.
    pub async fn share_entity_with_admin_gateway_groups(&self, entity: &Entity) -> Result<()> {
        let domain_id = &entity.domain_id;
        let gateway_groups = self.gateway_groups(domain_id).await?;
        self.ensure_manage_sharing_permission_type(domain_id).await?;

        self.registry
            .share_entity_with_groups(
                domain_id,
                &entity.entity_id,
                std::slice::from_ref(&gateway_groups.admins_group_id),
                &ResourcePermission::ManageSharing.permission_id(domain_id),
                true,
            )
            .await?;
        self.registry
            .share_entity_with_groups(
                domain_id,
                &entity.entity_id,
                std::slice::from_ref(&gateway_groups.admins_group_id),
                &ResourcePermission::Write.permission_id(domain_id),
                true,
            )
            .await?;
        self.registry
            .share_entity_with_groups(
                domain_id,
                &entity.entity_id,
                &[
                    gateway_groups.admins_group_id.clone(),
                    gateway_groups.read_only_admins_group_id.clone(),
                ],
                &ResourcePermission::Read.permission_id(domain_id),
                true,
            )
            .await?;
        Ok(())
    }

    /// The gateway's admin groups, created lazily on first access.
    pub async fn gateway_groups(&self, gateway_id: &str) -> Result<GatewayGroups> {
        if let Some(groups) = self.groups_store.get(gateway_id).await? {
            return Ok(groups);
        }
        self.initialize_gateway_groups(gateway_id).await
    }

    /// The resource kind of an entity, from its entity-type id.
    pub async fn resource_type(&self, domain_id: &str, entity_id: &str) -> Result<ResourceType> {
        let entity = self.registry.get_entity(domain_id, entity_id).await?;
        ResourceType::from_entity_type_id(&entity.entity_type_id)
            .ok_or_else(|| AuthzError::UnknownResourceType(entity.entity_type_id.to_string()))
    }

    async fn require_sharing_rights(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
    ) -> Result<()> {
        if self
            .user_has_access(principal, resource_id, ResourcePermission::Owner)
            .await?
            || self
                .user_has_access(principal, resource_id, ResourcePermission::ManageSharing)
                .await?
        {
            return Ok(());
        }
        Err(AuthzError::Denied(
            "User is not allowed to change sharing because the user is either not the resource \
             owner or does not have access to share the resource"
                .to_string(),
        ))
    }

    async fn require_owner_for_manage_sharing(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
    ) -> Result<()> {
        if self
            .user_has_access(principal, resource_id, ResourcePermission::Owner)
            .await?
        {
            return Ok(());
        }
        Err(AuthzError::Denied(
            "User is not allowed to change MANAGE_SHARING because the user is not the resource \
             owner"
                .to_string(),
        ))
    }

    async fn initialize_gateway_groups(&self, gateway_id: &str) -> Result<GatewayGroups> {
        info!("Initializing admin groups for gateway {}", gateway_id);
        let owner = PrincipalId::new("admin", gateway_id);

        let admins_group_id = Ulid::new().to_string();
        self.registry
            .create_group(UserGroup {
                group_id: admins_group_id.clone(),
                domain_id: gateway_id.to_string(),
                name: "Admins".to_string(),
                owner_id: owner.clone(),
                description: Some("Gateway administrators".to_string()),
            })
            .await?;

        let read_only_admins_group_id = Ulid::new().to_string();
        self.registry
            .create_group(UserGroup {
                group_id: read_only_admins_group_id.clone(),
                domain_id: gateway_id.to_string(),
                name: "Read Only Admins".to_string(),
                owner_id: owner,
                description: Some("Gateway administrators with read-only access".to_string()),
            })
            .await?;

        let groups = GatewayGroups {
            gateway_id: gateway_id.to_string(),
            admins_group_id,
            read_only_admins_group_id,
        };
        self.groups_store.put(groups.clone()).await?;
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use sharing::{
        Domain, EntityType, EntityTypeId, MemorySharingRegistry, PermissionId, PermissionType,
        RegistryUser, SearchCriteria, UserGroup,
    };

    fn engine() -> AccessEngine {
        AccessEngine::new(
            Arc::new(MemorySharingRegistry::new()),
            Arc::new(MemoryGatewayGroupsStore::new()),
        )
    }

    fn entity(domain: &str, id: &str, entity_type: &str, owner: &str) -> Entity {
        Entity {
            entity_id: id.to_string(),
            domain_id: domain.to_string(),
            entity_type_id: EntityTypeId::new(domain, entity_type),
            owner_id: PrincipalId::new(owner, domain),
            name: id.to_string(),
            description: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    /// Registry double whose every call fails, for the fail-closed check.
    struct FailingRegistry;

    fn offline<T>() -> sharing::Result<T> {
        Err(SharingError::Unavailable("registry offline".to_string()))
    }

    #[async_trait]
    impl SharingRegistry for FailingRegistry {
        async fn create_domain(&self, _domain: Domain) -> sharing::Result<String> {
            offline()
        }
        async fn is_domain_exists(&self, _domain_id: &str) -> sharing::Result<bool> {
            offline()
        }
        async fn create_entity_type(&self, _entity_type: EntityType) -> sharing::Result<String> {
            offline()
        }
        async fn is_entity_type_exists(
            &self,
            _entity_type_id: &EntityTypeId,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn create_permission_type(
            &self,
            _permission_type: PermissionType,
        ) -> sharing::Result<String> {
            offline()
        }
        async fn is_permission_type_exists(
            &self,
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn create_user(&self, _user: RegistryUser) -> sharing::Result<String> {
            offline()
        }
        async fn create_group(&self, _group: UserGroup) -> sharing::Result<String> {
            offline()
        }
        async fn add_users_to_group(
            &self,
            _domain_id: &str,
            _user_ids: &[PrincipalId],
            _group_id: &str,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn remove_users_from_group(
            &self,
            _domain_id: &str,
            _user_ids: &[PrincipalId],
            _group_id: &str,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn create_entity(&self, _entity: Entity) -> sharing::Result<String> {
            offline()
        }
        async fn get_entity(&self, _domain_id: &str, _entity_id: &str) -> sharing::Result<Entity> {
            offline()
        }
        async fn update_entity(&self, _entity: Entity) -> sharing::Result<bool> {
            offline()
        }
        async fn delete_entity(&self, _domain_id: &str, _entity_id: &str) -> sharing::Result<bool> {
            offline()
        }
        async fn is_entity_exists(
            &self,
            _domain_id: &str,
            _entity_id: &str,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn share_entity_with_users(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _user_ids: &[PrincipalId],
            _permission_type_id: &PermissionId,
            _cascade: bool,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn share_entity_with_groups(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _group_ids: &[String],
            _permission_type_id: &PermissionId,
            _cascade: bool,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn revoke_entity_sharing_from_users(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _user_ids: &[PrincipalId],
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn revoke_entity_sharing_from_groups(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _group_ids: &[String],
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn user_has_access(
            &self,
            _domain_id: &str,
            _user_id: &PrincipalId,
            _entity_id: &str,
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<bool> {
            offline()
        }
        async fn search_entities(
            &self,
            _domain_id: &str,
            _user_id: &PrincipalId,
            _filters: &[SearchCriteria],
            _offset: i64,
            _limit: i64,
        ) -> sharing::Result<Vec<Entity>> {
            offline()
        }
        async fn get_list_of_shared_users(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<Vec<RegistryUser>> {
            offline()
        }
        async fn get_list_of_directly_shared_users(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<Vec<RegistryUser>> {
            offline()
        }
        async fn get_list_of_shared_groups(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<Vec<UserGroup>> {
            offline()
        }
        async fn get_list_of_directly_shared_groups(
            &self,
            _domain_id: &str,
            _entity_id: &str,
            _permission_type_id: &PermissionId,
        ) -> sharing::Result<Vec<UserGroup>> {
            offline()
        }
    }

    #[tokio::test]
    async fn test_owner_override_satisfies_every_permission() {
        let engine = engine();
        engine
            .registry()
            .create_entity(entity("gw1", "proj-42", "PROJECT", "alice"))
            .await
            .unwrap();

        let alice = PrincipalId::new("alice", "gw1");
        // No explicit WRITE/READ/MANAGE_SHARING grants exist, only the
        // implicit OWNER grant.
        for permission in [
            ResourcePermission::Read,
            ResourcePermission::Write,
            ResourcePermission::ManageSharing,
            ResourcePermission::Owner,
        ] {
            assert!(
                engine.has_access(&alice, "proj-42", permission).await,
                "owner should hold {}",
                permission.as_name()
            );
        }

        let bob = PrincipalId::new("bob", "gw1");
        assert!(!engine.has_access(&bob, "proj-42", ResourcePermission::Read).await);
    }

    #[tokio::test]
    async fn test_has_access_fails_closed_on_registry_error() {
        let engine = AccessEngine::new(
            Arc::new(FailingRegistry),
            Arc::new(MemoryGatewayGroupsStore::new()),
        );
        let alice = PrincipalId::new("alice", "gw1");

        // Boolean check denies instead of erroring.
        assert!(!engine.has_access(&alice, "proj-42", ResourcePermission::Read).await);

        // The propagating form surfaces the outage.
        let err = engine
            .user_has_access(&alice, "proj-42", ResourcePermission::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Registry(_)));
    }

    #[tokio::test]
    async fn test_share_requires_owner_or_manage_sharing() {
        let engine = engine();
        engine
            .registry()
            .create_entity(entity("gw1", "proj-1", "PROJECT", "alice"))
            .await
            .unwrap();

        let bob = PrincipalId::new("bob", "gw1");
        let carol = PrincipalId::new("carol", "gw1");
        let err = engine
            .share_resource_with_users(&bob, "proj-1", &[(carol, ResourcePermission::Read)])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Denied(_)));
    }

    #[tokio::test]
    async fn test_manage_sharing_holder_cannot_grant_manage_sharing() {
        let engine = engine();
        engine
            .registry()
            .create_entity(entity("gw1", "proj-1", "PROJECT", "alice"))
            .await
            .unwrap();

        let alice = PrincipalId::new("alice", "gw1");
        let bob = PrincipalId::new("bob", "gw1");
        let carol = PrincipalId::new("carol", "gw1");

        engine
            .share_resource_with_users(
                &alice,
                "proj-1",
                &[(bob.clone(), ResourcePermission::ManageSharing)],
            )
            .await
            .unwrap();

        // Bob may now share READ/WRITE...
        engine
            .share_resource_with_users(&bob, "proj-1", &[(carol.clone(), ResourcePermission::Read)])
            .await
            .unwrap();
        assert!(engine.has_access(&carol, "proj-1", ResourcePermission::Read).await);

        // ...but cannot grant MANAGE_SHARING onwards.
        let err = engine
            .share_resource_with_users(&bob, "proj-1", &[(carol, ResourcePermission::ManageSharing)])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::Denied(_)));
    }

    #[tokio::test]
    async fn test_sharing_owner_permission_is_unsupported() {
        let engine = engine();
        engine
            .registry()
            .create_entity(entity("gw1", "proj-1", "PROJECT", "alice"))
            .await
            .unwrap();

        let alice = PrincipalId::new("alice", "gw1");
        let bob = PrincipalId::new("bob", "gw1");
        let err = engine
            .share_resource_with_users(&alice, "proj-1", &[(bob, ResourcePermission::Owner)])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthzError::UnsupportedPermission(_)));
    }

    #[tokio::test]
    async fn test_admin_auto_share_grants() {
        let engine = engine();
        let experiment = entity("gw1", "exp-1", "EXPERIMENT", "alice");
        engine.registry().create_entity(experiment.clone()).await.unwrap();
        engine
            .share_entity_with_admin_gateway_groups(&experiment)
            .await
            .unwrap();

        let groups = engine.gateway_groups("gw1").await.unwrap();
        let admin = PrincipalId::new("root", "gw1");
        let auditor = PrincipalId::new("aud", "gw1");
        engine
            .registry()
            .add_users_to_group("gw1", &[admin.clone()], &groups.admins_group_id)
            .await
            .unwrap();
        engine
            .registry()
            .add_users_to_group("gw1", &[auditor.clone()], &groups.read_only_admins_group_id)
            .await
            .unwrap();

        assert!(engine.has_access(&admin, "exp-1", ResourcePermission::Write).await);
        assert!(engine.has_access(&admin, "exp-1", ResourcePermission::Read).await);
        assert!(engine.has_access(&admin, "exp-1", ResourcePermission::ManageSharing).await);

        assert!(engine.has_access(&auditor, "exp-1", ResourcePermission::Read).await);
        assert!(!engine.has_access(&auditor, "exp-1", ResourcePermission::Write).await);
    }

    #[tokio::test]
    async fn test_revoke_protection_validates_before_mutating() {
        let engine = engine();
        let experiment = entity("gw1", "exp-1", "EXPERIMENT", "alice");
        engine.registry().create_entity(experiment.clone()).await.unwrap();
        engine
            .share_entity_with_admin_gateway_groups(&experiment)
            .await
            .unwrap();

        let alice = PrincipalId::new("alice", "gw1");
        let groups = engine.gateway_groups("gw1").await.unwrap();

        // Also share READ with an unprotected group; it precedes the
        // protected pair in the request and must survive the failure.
        engine
            .registry()
            .create_group(UserGroup {
                group_id: "lab".to_string(),
                domain_id: "gw1".to_string(),
                name: "Lab".to_string(),
                owner_id: alice.clone(),
                description: None,
            })
            .await
            .unwrap();
        let member = PrincipalId::new("mallory", "gw1");
        engine
            .registry()
            .add_users_to_group("gw1", &[member.clone()], "lab")
            .await
            .unwrap();
        engine
            .share_resource_with_groups(&alice, "exp-1", &[("lab".to_string(), ResourcePermission::Read)])
            .await
            .unwrap();

        for protected in [
            (groups.admins_group_id.clone(), ResourcePermission::Write),
            (groups.admins_group_id.clone(), ResourcePermission::Read),
            (groups.admins_group_id.clone(), ResourcePermission::ManageSharing),
            (groups.read_only_admins_group_id.clone(), ResourcePermission::Read),
        ] {
            let request = vec![("lab".to_string(), ResourcePermission::Read), protected];
            let err = engine
                .revoke_sharing_from_groups(&alice, "exp-1", &request)
                .await
                .unwrap_err();
            assert!(matches!(err, AuthzError::ProtectedGrant(_)));
            // Validate-before-mutate: the legal pair was not revoked
            // either.
            assert!(engine.has_access(&member, "exp-1", ResourcePermission::Read).await);
        }

        // Revoking the unprotected grant alone goes through.
        engine
            .revoke_sharing_from_groups(
                &alice,
                "exp-1",
                &[("lab".to_string(), ResourcePermission::Read)],
            )
            .await
            .unwrap();
        assert!(!engine.has_access(&member, "exp-1", ResourcePermission::Read).await);
    }

    #[tokio::test]
    async fn test_revoke_protection_not_applied_to_projects() {
        let engine = engine();
        let project = entity("gw1", "proj-1", "PROJECT", "alice");
        engine.registry().create_entity(project.clone()).await.unwrap();
        engine
            .share_entity_with_admin_gateway_groups(&project)
            .await
            .unwrap();

        let alice = PrincipalId::new("alice", "gw1");
        let groups = engine.gateway_groups("gw1").await.unwrap();

        // Projects are not in the admin-restricted set.
        engine
            .revoke_sharing_from_groups(
                &alice,
                "proj-1",
                &[(groups.admins_group_id.clone(), ResourcePermission::Write)],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_manage_sharing_provisioning_is_idempotent() {
        let engine = engine();
        engine
            .ensure_manage_sharing_permission_type("gw1")
            .await
            .unwrap();
        assert!(engine
            .registry()
            .is_permission_type_exists(&ResourcePermission::ManageSharing.permission_id("gw1"))
            .await
            .unwrap());

        // Second call is a no-op after the existence check.
        engine
            .ensure_manage_sharing_permission_type("gw1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_accessible_users_unions_owner_for_write() {
        let engine = engine();
        engine
            .registry()
            .create_entity(entity("gw1", "proj-1", "PROJECT", "alice"))
            .await
            .unwrap();

        let alice = PrincipalId::new("alice", "gw1");
        let bob = PrincipalId::new("bob", "gw1");
        engine
            .share_resource_with_users(&alice, "proj-1", &[(bob.clone(), ResourcePermission::Write)])
            .await
            .unwrap();

        let mut writers = engine
            .accessible_users(&alice, "proj-1", ResourcePermission::Write, false)
            .await
            .unwrap();
        writers.sort_by_key(|u| u.to_string());
        assert_eq!(writers, vec![alice.clone(), bob.clone()]);

        // OWNER queries only the direct OWNER grant.
        let owners = engine
            .accessible_users(&alice, "proj-1", ResourcePermission::Owner, false)
            .await
            .unwrap();
        assert_eq!(owners, vec![alice.clone()]);
    }

    #[tokio::test]
    async fn test_gateway_groups_created_once() {
        let engine = engine();
        let first = engine.gateway_groups("gw1").await.unwrap();
        let second = engine.gateway_groups("gw1").await.unwrap();
        assert_eq!(first, second);
        assert_ne!(first.admins_group_id, first.read_only_admins_group_id);
    }

    #[tokio::test]
    async fn test_resource_type_lookup() {
        let engine = engine();
        engine
            .registry()
            .create_entity(entity("gw1", "exp-1", "EXPERIMENT", "alice"))
            .await
            .unwrap();
        assert_eq!(
            engine.resource_type("gw1", "exp-1").await.unwrap(),
            ResourceType::Experiment
        );

        engine
            .registry()
            .create_entity(entity("gw1", "widget-1", "WIDGET", "alice"))
            .await
            .unwrap();
        let err = engine.resource_type("gw1", "widget-1").await.unwrap_err();
        assert!(matches!(err, AuthzError::UnknownResourceType(_)));
    }
}
