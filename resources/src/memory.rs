//! In-memory catalog and profile store, used as the engine test double.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::catalog::{ComputeResourceDescription, ResourceCatalog, StorageResourceDescription};
use crate::error::Result;
use crate::profiles::{
    GatewayResourceProfile, GatewayStoragePreference, GroupResourceProfile,
    UserComputeResourcePreference, UserResourceProfile, UserStoragePreference,
};
use crate::store::ProfileStore;

#[derive(Default)]
struct State {
    compute_resources: HashMap<String, ComputeResourceDescription>,
    storage_resources: HashMap<String, StorageResourceDescription>,
    user_profiles: HashMap<(String, String), UserResourceProfile>,
    user_compute_preferences: HashMap<(String, String, String), UserComputeResourcePreference>,
    user_storage_preferences: HashMap<(String, String, String), UserStoragePreference>,
    group_profiles: HashMap<String, GroupResourceProfile>,
    gateway_profiles: HashMap<String, GatewayResourceProfile>,
    gateway_storage_preferences: HashMap<(String, String), GatewayStoragePreference>,
}

/// A [`ResourceCatalog`] + [`ProfileStore`] backed by process memory.
#[derive(Default)]
pub struct MemoryResourceStore {
    state: RwLock<State>,
}

impl MemoryResourceStore {
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

#[async_trait]
impl ResourceCatalog for MemoryResourceStore {
    async fn register_compute_resource(
        &self,
        resource: ComputeResourceDescription,
    ) -> Result<String> {
        let id = resource.compute_resource_id.clone();
        self.write().compute_resources.insert(id.clone(), resource);
        Ok(id)
    }

    async fn get_compute_resource(
        &self,
        compute_resource_id: &str,
    ) -> Result<Option<ComputeResourceDescription>> {
        Ok(self.read().compute_resources.get(compute_resource_id).cloned())
    }

    async fn list_compute_resources(&self) -> Result<Vec<ComputeResourceDescription>> {
        let mut resources: Vec<_> = self.read().compute_resources.values().cloned().collect();
        resources.sort_by(|a, b| a.compute_resource_id.cmp(&b.compute_resource_id));
        Ok(resources)
    }

    async fn register_storage_resource(
        &self,
        resource: StorageResourceDescription,
    ) -> Result<String> {
        let id = resource.storage_resource_id.clone();
        self.write().storage_resources.insert(id.clone(), resource);
        Ok(id)
    }

    async fn get_storage_resource(
        &self,
        storage_resource_id: &str,
    ) -> Result<Option<StorageResourceDescription>> {
        Ok(self.read().storage_resources.get(storage_resource_id).cloned())
    }

    async fn list_storage_resources(&self) -> Result<Vec<StorageResourceDescription>> {
        let mut resources: Vec<_> = self.read().storage_resources.values().cloned().collect();
        resources.sort_by(|a, b| a.storage_resource_id.cmp(&b.storage_resource_id));
        Ok(resources)
    }
}

#[async_trait]
impl ProfileStore for MemoryResourceStore {
    async fn put_user_resource_profile(&self, profile: UserResourceProfile) -> Result<()> {
        let key = (profile.user_id.clone(), profile.gateway_id.clone());
        self.write().user_profiles.insert(key, profile);
        Ok(())
    }

    async fn get_user_resource_profile(
        &self,
        user_id: &str,
        gateway_id: &str,
    ) -> Result<Option<UserResourceProfile>> {
        let key = (user_id.to_string(), gateway_id.to_string());
        Ok(self.read().user_profiles.get(&key).cloned())
    }

    async fn is_user_resource_profile_exists(
        &self,
        user_id: &str,
        gateway_id: &str,
    ) -> Result<bool> {
        let key = (user_id.to_string(), gateway_id.to_string());
        Ok(self.read().user_profiles.contains_key(&key))
    }

    async fn put_user_compute_preference(
        &self,
        preference: UserComputeResourcePreference,
    ) -> Result<()> {
        let key = (
            preference.user_id.clone(),
            preference.gateway_id.clone(),
            preference.compute_resource_id.clone(),
        );
        self.write().user_compute_preferences.insert(key, preference);
        Ok(())
    }

    async fn get_user_compute_preference(
        &self,
        user_id: &str,
        gateway_id: &str,
        compute_resource_id: &str,
    ) -> Result<Option<UserComputeResourcePreference>> {
        let key = (
            user_id.to_string(),
            gateway_id.to_string(),
            compute_resource_id.to_string(),
        );
        Ok(self.read().user_compute_preferences.get(&key).cloned())
    }

    async fn put_user_storage_preference(&self, preference: UserStoragePreference) -> Result<()> {
        let key = (
            preference.user_id.clone(),
            preference.gateway_id.clone(),
            preference.storage_resource_id.clone(),
        );
        self.write().user_storage_preferences.insert(key, preference);
        Ok(())
    }

    async fn get_user_storage_preference(
        &self,
        user_id: &str,
        gateway_id: &str,
        storage_resource_id: &str,
    ) -> Result<Option<UserStoragePreference>> {
        let key = (
            user_id.to_string(),
            gateway_id.to_string(),
            storage_resource_id.to_string(),
        );
        Ok(self.read().user_storage_preferences.get(&key).cloned())
    }

    async fn put_group_resource_profile(&self, profile: GroupResourceProfile) -> Result<()> {
        self.write()
            .group_profiles
            .insert(profile.group_resource_profile_id.clone(), profile);
        Ok(())
    }

    async fn get_group_resource_profile(
        &self,
        group_resource_profile_id: &str,
    ) -> Result<Option<GroupResourceProfile>> {
        Ok(self.read().group_profiles.get(group_resource_profile_id).cloned())
    }

    async fn get_group_resource_profiles(
        &self,
        gateway_id: &str,
        ids: &[String],
    ) -> Result<Vec<GroupResourceProfile>> {
        let state = self.read();
        Ok(ids
            .iter()
            .filter_map(|id| state.group_profiles.get(id))
            .filter(|p| p.gateway_id == gateway_id)
            .cloned()
            .collect())
    }

    async fn delete_group_resource_profile(&self, group_resource_profile_id: &str) -> Result<bool> {
        Ok(self
            .write()
            .group_profiles
            .remove(group_resource_profile_id)
            .is_some())
    }

    async fn put_gateway_resource_profile(&self, profile: GatewayResourceProfile) -> Result<()> {
        self.write()
            .gateway_profiles
            .insert(profile.gateway_id.clone(), profile);
        Ok(())
    }

    async fn get_gateway_resource_profile(
        &self,
        gateway_id: &str,
    ) -> Result<Option<GatewayResourceProfile>> {
        Ok(self.read().gateway_profiles.get(gateway_id).cloned())
    }

    async fn is_gateway_resource_profile_exists(&self, gateway_id: &str) -> Result<bool> {
        Ok(self.read().gateway_profiles.contains_key(gateway_id))
    }

    async fn put_gateway_storage_preference(
        &self,
        preference: GatewayStoragePreference,
    ) -> Result<()> {
        let key = (
            preference.gateway_id.clone(),
            preference.storage_resource_id.clone(),
        );
        self.write().gateway_storage_preferences.insert(key, preference);
        Ok(())
    }

    async fn get_gateway_storage_preference(
        &self,
        gateway_id: &str,
        storage_resource_id: &str,
    ) -> Result<Option<GatewayStoragePreference>> {
        let key = (gateway_id.to_string(), storage_resource_id.to_string());
        Ok(self.read().gateway_storage_preferences.get(&key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_catalog_round_trip() {
        let store = MemoryResourceStore::new();
        store
            .register_compute_resource(ComputeResourceDescription {
                compute_resource_id: "cluster-a".to_string(),
                host_name: "cluster-a.example.edu".to_string(),
                description: None,
                enabled: true,
            })
            .await
            .unwrap();

        assert!(store.get_compute_resource("cluster-a").await.unwrap().is_some());
        assert!(store.get_compute_resource("cluster-b").await.unwrap().is_none());
        assert!(store.get_storage_resource("cluster-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_group_profiles_preserve_id_order() {
        let store = MemoryResourceStore::new();
        for id in ["grp-b", "grp-a", "grp-c"] {
            store
                .put_group_resource_profile(GroupResourceProfile {
                    group_resource_profile_id: id.to_string(),
                    gateway_id: "gw1".to_string(),
                    group_resource_profile_name: id.to_string(),
                    default_credential_store_token: None,
                    compute_preferences: vec![],
                })
                .await
                .unwrap();
        }

        let ids = vec![
            "grp-c".to_string(),
            "grp-missing".to_string(),
            "grp-b".to_string(),
        ];
        let profiles = store.get_group_resource_profiles("gw1", &ids).await.unwrap();
        let fetched: Vec<_> = profiles
            .iter()
            .map(|p| p.group_resource_profile_id.as_str())
            .collect();
        assert_eq!(fetched, vec!["grp-c", "grp-b"]);
    }
}
