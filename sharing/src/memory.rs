//! In-memory sharing registry.
//!
//! Behaviorally equivalent to the SQLite-backed registry and used as the
//! engine test double and for embedders that do not want a database.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{Result, SharingError};
use crate::ids::{EntityTypeId, PermissionId, PrincipalId};
use crate::registry::SharingRegistry;
use crate::types::{
    Domain, Entity, EntitySearchField, EntityType, PermissionType, RegistryUser, SearchCondition,
    SearchCriteria, UserGroup,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GranteeKind {
    User,
    Group,
}

#[derive(Debug, Clone)]
struct Grant {
    domain_id: String,
    entity_id: String,
    grantee_id: String,
    grantee_kind: GranteeKind,
    permission_type_id: String,
    #[allow(dead_code)]
    cascade: bool,
}

#[derive(Default)]
struct State {
    domains: HashMap<String, Domain>,
    entity_types: HashMap<String, EntityType>,
    permission_types: HashMap<String, PermissionType>,
    users: HashMap<String, RegistryUser>,
    groups: HashMap<String, UserGroup>,
    group_members: HashMap<String, HashSet<String>>,
    // Creation order is preserved so searches stay deterministic.
    entities: Vec<Entity>,
    grants: Vec<Grant>,
}

impl State {
    fn member_group_ids(&self, principal: &str) -> HashSet<&str> {
        self.group_members
            .iter()
            .filter(|(_, members)| members.contains(principal))
            .map(|(group_id, _)| group_id.as_str())
            .collect()
    }

    fn has_grant(&self, domain_id: &str, principal: &str, entity_id: &str, permission: &str) -> bool {
        let groups = self.member_group_ids(principal);
        self.grants.iter().any(|g| {
            g.domain_id == domain_id
                && g.entity_id == entity_id
                && g.permission_type_id == permission
                && match g.grantee_kind {
                    GranteeKind::User => g.grantee_id == principal,
                    GranteeKind::Group => groups.contains(g.grantee_id.as_str()),
                }
        })
    }

    fn user_record(&self, domain_id: &str, principal: &PrincipalId) -> RegistryUser {
        self.users
            .get(&principal.to_string())
            .cloned()
            .unwrap_or_else(|| RegistryUser {
                user_id: principal.clone(),
                domain_id: domain_id.to_string(),
                user_name: principal.user_id.clone(),
            })
    }
}

/// A [`SharingRegistry`] backed by process memory.
#[derive(Default)]
pub struct MemorySharingRegistry {
    state: RwLock<State>,
}

impl MemorySharingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn matches_filters(entity: &Entity, filters: &[SearchCriteria]) -> bool {
    filters.iter().all(|criteria| {
        let field_value = match criteria.field {
            EntitySearchField::EntityTypeId => entity.entity_type_id.to_string(),
            EntitySearchField::Name => entity.name.clone(),
        };
        match criteria.condition {
            SearchCondition::Equal => field_value == criteria.value,
            // LIKE patterns arrive with surrounding wildcards; match the
            // SQLite default of ASCII case-insensitivity.
            SearchCondition::Like => field_value
                .to_lowercase()
                .contains(&criteria.value.trim_matches('%').to_lowercase()),
        }
    })
}

fn apply_window<T>(items: Vec<T>, offset: i64, limit: i64) -> Vec<T> {
    let offset = offset.max(0) as usize;
    let iter = items.into_iter().skip(offset);
    if limit < 0 {
        iter.collect()
    } else {
        iter.take(limit as usize).collect()
    }
}

#[async_trait]
impl SharingRegistry for MemorySharingRegistry {
    async fn create_domain(&self, domain: Domain) -> Result<String> {
        let mut state = self.write();
        if state.domains.contains_key(&domain.domain_id) {
            return Err(SharingError::DuplicateEntry(domain.domain_id));
        }
        let domain_id = domain.domain_id.clone();
        state.domains.insert(domain_id.clone(), domain);
        Ok(domain_id)
    }

    async fn is_domain_exists(&self, domain_id: &str) -> Result<bool> {
        Ok(self.read().domains.contains_key(domain_id))
    }

    async fn create_entity_type(&self, entity_type: EntityType) -> Result<String> {
        let mut state = self.write();
        let key = entity_type.entity_type_id.to_string();
        if state.entity_types.contains_key(&key) {
            return Err(SharingError::DuplicateEntry(key));
        }
        state.entity_types.insert(key.clone(), entity_type);
        Ok(key)
    }

    async fn is_entity_type_exists(&self, entity_type_id: &EntityTypeId) -> Result<bool> {
        Ok(self
            .read()
            .entity_types
            .contains_key(&entity_type_id.to_string()))
    }

    async fn create_permission_type(&self, permission_type: PermissionType) -> Result<String> {
        let mut state = self.write();
        let key = permission_type.permission_type_id.to_string();
        if state.permission_types.contains_key(&key) {
            return Err(SharingError::DuplicateEntry(key));
        }
        state.permission_types.insert(key.clone(), permission_type);
        Ok(key)
    }

    async fn is_permission_type_exists(&self, permission_type_id: &PermissionId) -> Result<bool> {
        Ok(self
            .read()
            .permission_types
            .contains_key(&permission_type_id.to_string()))
    }

    async fn create_user(&self, user: RegistryUser) -> Result<String> {
        let mut state = self.write();
        let key = user.user_id.to_string();
        if state.users.contains_key(&key) {
            return Err(SharingError::DuplicateEntry(key));
        }
        state.users.insert(key.clone(), user);
        Ok(key)
    }

    async fn create_group(&self, group: UserGroup) -> Result<String> {
        let mut state = self.write();
        if state.groups.contains_key(&group.group_id) {
            return Err(SharingError::DuplicateEntry(group.group_id));
        }
        let group_id = group.group_id.clone();
        state.groups.insert(group_id.clone(), group);
        state.group_members.entry(group_id.clone()).or_default();
        Ok(group_id)
    }

    async fn add_users_to_group(
        &self,
        _domain_id: &str,
        user_ids: &[PrincipalId],
        group_id: &str,
    ) -> Result<bool> {
        let mut state = self.write();
        if !state.groups.contains_key(group_id) {
            return Err(SharingError::GroupNotFound(group_id.to_string()));
        }
        let members = state.group_members.entry(group_id.to_string()).or_default();
        for user in user_ids {
            members.insert(user.to_string());
        }
        Ok(true)
    }

    async fn remove_users_from_group(
        &self,
        _domain_id: &str,
        user_ids: &[PrincipalId],
        group_id: &str,
    ) -> Result<bool> {
        let mut state = self.write();
        if !state.groups.contains_key(group_id) {
            return Err(SharingError::GroupNotFound(group_id.to_string()));
        }
        if let Some(members) = state.group_members.get_mut(group_id) {
            for user in user_ids {
                members.remove(&user.to_string());
            }
        }
        Ok(true)
    }

    async fn create_entity(&self, entity: Entity) -> Result<String> {
        let mut state = self.write();
        if state.entities.iter().any(|e| e.entity_id == entity.entity_id) {
            return Err(SharingError::DuplicateEntry(entity.entity_id));
        }
        let entity_id = entity.entity_id.clone();
        // The owner override rests on this implicit grant.
        state.grants.push(Grant {
            domain_id: entity.domain_id.clone(),
            entity_id: entity_id.clone(),
            grantee_id: entity.owner_id.to_string(),
            grantee_kind: GranteeKind::User,
            permission_type_id: PermissionId::new(&entity.domain_id, "OWNER").to_string(),
            cascade: true,
        });
        state.entities.push(entity);
        Ok(entity_id)
    }

    async fn get_entity(&self, domain_id: &str, entity_id: &str) -> Result<Entity> {
        self.read()
            .entities
            .iter()
            .find(|e| e.domain_id == domain_id && e.entity_id == entity_id)
            .cloned()
            .ok_or_else(|| SharingError::EntityNotFound(entity_id.to_string()))
    }

    async fn update_entity(&self, entity: Entity) -> Result<bool> {
        let mut state = self.write();
        let existing = state
            .entities
            .iter_mut()
            .find(|e| e.domain_id == entity.domain_id && e.entity_id == entity.entity_id)
            .ok_or_else(|| SharingError::EntityNotFound(entity.entity_id.clone()))?;
        existing.name = entity.name;
        existing.description = entity.description;
        Ok(true)
    }

    async fn delete_entity(&self, domain_id: &str, entity_id: &str) -> Result<bool> {
        let mut state = self.write();
        let before = state.entities.len();
        state
            .entities
            .retain(|e| !(e.domain_id == domain_id && e.entity_id == entity_id));
        state
            .grants
            .retain(|g| !(g.domain_id == domain_id && g.entity_id == entity_id));
        Ok(state.entities.len() < before)
    }

    async fn is_entity_exists(&self, domain_id: &str, entity_id: &str) -> Result<bool> {
        Ok(self
            .read()
            .entities
            .iter()
            .any(|e| e.domain_id == domain_id && e.entity_id == entity_id))
    }

    async fn share_entity_with_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        user_ids: &[PrincipalId],
        permission_type_id: &PermissionId,
        cascade: bool,
    ) -> Result<bool> {
        let mut state = self.write();
        let permission = permission_type_id.to_string();
        for user in user_ids {
            let grantee = user.to_string();
            state.grants.retain(|g| {
                !(g.entity_id == entity_id
                    && g.grantee_kind == GranteeKind::User
                    && g.grantee_id == grantee
                    && g.permission_type_id == permission)
            });
            state.grants.push(Grant {
                domain_id: domain_id.to_string(),
                entity_id: entity_id.to_string(),
                grantee_id: grantee,
                grantee_kind: GranteeKind::User,
                permission_type_id: permission.clone(),
                cascade,
            });
        }
        Ok(true)
    }

    async fn share_entity_with_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        group_ids: &[String],
        permission_type_id: &PermissionId,
        cascade: bool,
    ) -> Result<bool> {
        let mut state = self.write();
        let permission = permission_type_id.to_string();
        for group_id in group_ids {
            state.grants.retain(|g| {
                !(g.entity_id == entity_id
                    && g.grantee_kind == GranteeKind::Group
                    && &g.grantee_id == group_id
                    && g.permission_type_id == permission)
            });
            state.grants.push(Grant {
                domain_id: domain_id.to_string(),
                entity_id: entity_id.to_string(),
                grantee_id: group_id.clone(),
                grantee_kind: GranteeKind::Group,
                permission_type_id: permission.clone(),
                cascade,
            });
        }
        Ok(true)
    }

    async fn revoke_entity_sharing_from_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        user_ids: &[PrincipalId],
        permission_type_id: &PermissionId,
    ) -> Result<bool> {
        let mut state = self.write();
        let permission = permission_type_id.to_string();
        let grantees: HashSet<String> = user_ids.iter().map(|u| u.to_string()).collect();
        state.grants.retain(|g| {
            !(g.domain_id == domain_id
                && g.entity_id == entity_id
                && g.grantee_kind == GranteeKind::User
                && grantees.contains(&g.grantee_id)
                && g.permission_type_id == permission)
        });
        Ok(true)
    }

    async fn revoke_entity_sharing_from_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        group_ids: &[String],
        permission_type_id: &PermissionId,
    ) -> Result<bool> {
        let mut state = self.write();
        let permission = permission_type_id.to_string();
        let grantees: HashSet<&str> = group_ids.iter().map(|g| g.as_str()).collect();
        state.grants.retain(|g| {
            !(g.domain_id == domain_id
                && g.entity_id == entity_id
                && g.grantee_kind == GranteeKind::Group
                && grantees.contains(g.grantee_id.as_str())
                && g.permission_type_id == permission)
        });
        Ok(true)
    }

    async fn user_has_access(
        &self,
        domain_id: &str,
        user_id: &PrincipalId,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<bool> {
        let state = self.read();
        Ok(state.has_grant(
            domain_id,
            &user_id.to_string(),
            entity_id,
            &permission_type_id.to_string(),
        ))
    }

    async fn search_entities(
        &self,
        domain_id: &str,
        user_id: &PrincipalId,
        filters: &[SearchCriteria],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Entity>> {
        let state = self.read();
        let principal = user_id.to_string();
        let read_permission = PermissionId::new(domain_id, "READ").to_string();
        let owner_permission = PermissionId::new(domain_id, "OWNER").to_string();
        let matches: Vec<Entity> = state
            .entities
            .iter()
            .filter(|e| e.domain_id == domain_id && matches_filters(e, filters))
            .filter(|e| {
                e.owner_id.to_string() == principal
                    || state.has_grant(domain_id, &principal, &e.entity_id, &read_permission)
                    || state.has_grant(domain_id, &principal, &e.entity_id, &owner_permission)
            })
            .cloned()
            .collect();
        Ok(apply_window(matches, offset, limit))
    }

    async fn get_list_of_shared_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<RegistryUser>> {
        let state = self.read();
        let permission = permission_type_id.to_string();
        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for grant in state
            .grants
            .iter()
            .filter(|g| {
                g.domain_id == domain_id
                    && g.entity_id == entity_id
                    && g.permission_type_id == permission
            })
        {
            match grant.grantee_kind {
                GranteeKind::User => {
                    if seen.insert(grant.grantee_id.clone()) {
                        let principal = PrincipalId::parse(&grant.grantee_id)?;
                        users.push(state.user_record(domain_id, &principal));
                    }
                }
                GranteeKind::Group => {
                    if let Some(members) = state.group_members.get(&grant.grantee_id) {
                        for member in members {
                            if seen.insert(member.clone()) {
                                let principal = PrincipalId::parse(member)?;
                                users.push(state.user_record(domain_id, &principal));
                            }
                        }
                    }
                }
            }
        }
        Ok(users)
    }

    async fn get_list_of_directly_shared_users(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<RegistryUser>> {
        let state = self.read();
        let permission = permission_type_id.to_string();
        let mut seen = HashSet::new();
        let mut users = Vec::new();
        for grant in state.grants.iter().filter(|g| {
            g.domain_id == domain_id
                && g.entity_id == entity_id
                && g.permission_type_id == permission
                && g.grantee_kind == GranteeKind::User
        }) {
            if seen.insert(grant.grantee_id.clone()) {
                let principal = PrincipalId::parse(&grant.grantee_id)?;
                users.push(state.user_record(domain_id, &principal));
            }
        }
        Ok(users)
    }

    async fn get_list_of_shared_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<UserGroup>> {
        // Without an entity hierarchy there is no inherited group sharing,
        // so this matches the directly-shared list.
        self.get_list_of_directly_shared_groups(domain_id, entity_id, permission_type_id)
            .await
    }

    async fn get_list_of_directly_shared_groups(
        &self,
        domain_id: &str,
        entity_id: &str,
        permission_type_id: &PermissionId,
    ) -> Result<Vec<UserGroup>> {
        let state = self.read();
        let permission = permission_type_id.to_string();
        let mut seen = HashSet::new();
        let mut groups = Vec::new();
        for grant in state.grants.iter().filter(|g| {
            g.domain_id == domain_id
                && g.entity_id == entity_id
                && g.permission_type_id == permission
                && g.grantee_kind == GranteeKind::Group
        }) {
            if seen.insert(grant.grantee_id.clone()) {
                let group = state.groups.get(&grant.grantee_id).cloned().unwrap_or_else(|| {
                    UserGroup {
                        group_id: grant.grantee_id.clone(),
                        domain_id: domain_id.to_string(),
                        name: grant.grantee_id.clone(),
                        owner_id: PrincipalId::new("unknown", domain_id),
                        description: None,
                    }
                });
                groups.push(group);
            }
        }
        Ok(groups)
    }
}
