//! The narrow client interface the access-control and credential engines
//! consume. Implementations are expected to provide their own concurrency
//! control; callers perform no application-level locking.

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{EntityTypeId, PermissionId, PrincipalId};
use crate::types::{Domain, Entity, EntityType, PermissionType, RegistryUser, SearchCriteria, UserGroup};

/// The permission-grant store.
///
/// Creating an entity records an implicit OWNER grant for its owner; the
/// access engine's owner override rests on that invariant.
/// `create_domain`, `create_entity_type` and `create_permission_type`
/// signal [`SharingError::DuplicateEntry`](crate::SharingError::DuplicateEntry)
/// when the id already exists; callers that need idempotency precheck
/// with the matching `is_*_exists` probe.
#[async_trait]
pub trait SharingRegistry: Send + Sync {
    async fn create_domain(&self, domain: Domain) -> Result<String>;

    async fn is_domain_exists(&self, domain_id: &str) -> Result<bool>;

    async fn create_entity_type(&self, entity_type: EntityType) -> Result<String>;

    async fn is_entity_type_exists(&self, entity_type_id: &EntityTypeId) -> Result<bool>;

    async fn create_permission_type(&self, permission_type: PermissionType) -> Result<String>;

    async fn is_permission_type_exists(&self, permission_type_id: &PermissionId) -> Result<bool>;

    async fn create_user(&self, user: RegistryUser) -> Result<String>;

    async fn create_group(&self, group: UserGroup) -> Result<String>;

    async fn add_users_to_group(
        &self,
        domain_id: &str,
        user_ids: &[PrincipalId],
        group_id: &str,
    ) -> Result<bool>;

    async fn remove_users_from_group(
        &self,
        domain_id: &str,
        user_ids: &[PrincipalId],
        group_id: &str,
    ) -> Result<bool>;

    /// Create an entity record and grant OWNER to its owner.
    async fn create_entity(&self, entity: Entity) -> Result<String>;

    async fn get_entity(&self, domain_id: &str, entity_id: &str) -> Result<Entity>;

    /// Update an entity's name and description. Other fields are immutable.
    async fn update_entity(&self, entity: Entity) -> Result<bool>;

    /// Delete an entity and every grant recorded against it.
    async fn delete_entity(&self, domain_id: &str, entity_id: &str) -> Result<bool>;

    async fn is_entity_exists(&self, domain_id: &str, entity_id: &str) -> Result<bool>;

    async fn share_entity_with_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        user_ids: &[PrincipalId],
        permission_type_id: &PermissionId,
        cascade: bool,
    ) -> Result<bool>;

    async fn share_entity_with_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        group_ids: &[String],
        permission_type_id: &PermissionId,
        cascade: bool,
    ) -> Result<bool>;

    async fn revoke_entity_sharing_from_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        user_ids: &[PrincipalId],
        permission_type_id: &PermissionId,
    ) -> Result<bool>;

    async fn revoke_entity_sharing_from_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        group_ids: &[String],
        permission_type_id: &PermissionId,
    ) -> Result<bool>;

    /// Whether the user holds the permission on the entity, directly or
    /// through any group the user belongs to.
    async fn user_has_access(
        &self,
        domain_id: &str,
        user_id: &PrincipalId,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<bool>;

    /// Entities in the domain matching all filters that the principal can
    /// see (owner, or holder of a READ or OWNER grant, directly or via a
    /// group), in stable creation order. A negative `limit` means
    /// unbounded.
    async fn search_entities(
        &self,
        domain_id: &str,
        user_id: &PrincipalId,
        filters: &[SearchCriteria],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Entity>>;

    /// Users holding the permission on the entity, including users that
    /// hold it through group membership.
    async fn get_list_of_shared_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<RegistryUser>>;

    /// Users holding the permission through a direct user grant only.
    async fn get_list_of_directly_shared_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<RegistryUser>>;

    async fn get_list_of_shared_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<UserGroup>>;

    async fn get_list_of_directly_shared_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<UserGroup>>;
}
