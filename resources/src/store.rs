//! Keyed CRUD over preference records. No business logic lives here; the
//! precedence rules belong to the credential engine.

use async_trait::async_trait;

use crate::error::Result;
use crate::profiles::{
    GatewayResourceProfile, GatewayStoragePreference, GroupResourceProfile,
    UserComputeResourcePreference, UserResourceProfile, UserStoragePreference,
};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn put_user_resource_profile(&self, profile: UserResourceProfile) -> Result<()>;

    async fn get_user_resource_profile(
        &self,
        user_id: &str,
        gateway_id: &str,
    ) -> Result<Option<UserResourceProfile>>;

    async fn is_user_resource_profile_exists(
        &self,
        user_id: &str,
        gateway_id: &str,
    ) -> Result<bool>;

    async fn put_user_compute_preference(
        &self,
        preference: UserComputeResourcePreference,
    ) -> Result<()>;

    async fn get_user_compute_preference(
        &self,
        user_id: &str,
        gateway_id: &str,
        compute_resource_id: &str,
    ) -> Result<Option<UserComputeResourcePreference>>;

    async fn put_user_storage_preference(&self, preference: UserStoragePreference) -> Result<()>;

    async fn get_user_storage_preference(
        &self,
        user_id: &str,
        gateway_id: &str,
        storage_resource_id: &str,
    ) -> Result<Option<UserStoragePreference>>;

    /// Store a group resource profile together with its compute
    /// preferences (replacing any previous preference set).
    async fn put_group_resource_profile(&self, profile: GroupResourceProfile) -> Result<()>;

    async fn get_group_resource_profile(
        &self,
        group_resource_profile_id: &str,
    ) -> Result<Option<GroupResourceProfile>>;

    /// Fetch profiles by id, preserving the order of the given id list.
    /// Ids with no stored profile are skipped.
    async fn get_group_resource_profiles(
        &self,
        gateway_id: &str,
        ids: &[String],
    ) -> Result<Vec<GroupResourceProfile>>;

    async fn delete_group_resource_profile(&self, group_resource_profile_id: &str) -> Result<bool>;

    async fn put_gateway_resource_profile(&self, profile: GatewayResourceProfile) -> Result<()>;

    async fn get_gateway_resource_profile(
        &self,
        gateway_id: &str,
    ) -> Result<Option<GatewayResourceProfile>>;

    async fn is_gateway_resource_profile_exists(&self, gateway_id: &str) -> Result<bool>;

    async fn put_gateway_storage_preference(
        &self,
        preference: GatewayStoragePreference,
    ) -> Result<()>;

    async fn get_gateway_storage_preference(
        &self,
        gateway_id: &str,
        storage_resource_id: &str,
    ) -> Result<Option<GatewayStoragePreference>>;
}
