//! The credential resolution cascade.
//!
//! Given a principal and a target resource, resolution picks exactly one
//! login username (first non-blank match in precedence order) and then a
//! credential token. The token chain is keyed off *which level produced
//! the login username* (its provenance), not off which level happens to
//! hold a token:
//!
//! - compute, login from USER preference: preference token → user
//!   resource profile token.
//! - compute, login from GROUP preference: preference token → group
//!   profile default token → user resource profile token.
//! - storage, login from USER preference: preference token → user
//!   resource profile token.
//! - storage, login from GATEWAY preference: preference token → gateway
//!   resource profile token.
//!
//! An exhausted chain is an authentication failure; a missing login
//! username is an invalid request. There are no retries: one failed
//! lookup fails the whole resolution.

use std::sync::Arc;

use tracing::{debug, error, info};

use authz::{AccessEngine, ResourceType};
use resources::{
    GroupComputeResourcePreference, GroupResourceProfile, ProfileStore, ResourceCatalog,
};
use sharing::PrincipalId;

use crate::adaptor::{AdaptorFactory, AdaptorHandle, StorageDirectoryInfo, StorageVolumeInfo};
use crate::error::{ResolutionError, Result};

/// Which preference level supplied the winning login username.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginProvenance {
    User,
    Group,
    Gateway,
}

/// The outcome of a resolution: identity strings plus a live handle.
pub struct StorageInfoContext {
    pub login_user_name: String,
    pub credential_token: String,
    pub provenance: LoginProvenance,
    pub adaptor: Arc<dyn AdaptorHandle>,
}

impl std::fmt::Debug for StorageInfoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageInfoContext")
            .field("login_user_name", &self.login_user_name)
            .field("credential_token", &self.credential_token)
            .field("provenance", &self.provenance)
            .field("adaptor", &"<dyn AdaptorHandle>")
            .finish()
    }
}

/// A stored empty or whitespace-only value counts as absent.
fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// The credential resolution engine.
pub struct CredentialResolver {
    profiles: Arc<dyn ProfileStore>,
    catalog: Arc<dyn ResourceCatalog>,
    access: Arc<AccessEngine>,
    adaptors: Arc<dyn AdaptorFactory>,
}

impl CredentialResolver {
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        catalog: Arc<dyn ResourceCatalog>,
        access: Arc<AccessEngine>,
        adaptors: Arc<dyn AdaptorFactory>,
    ) -> Self {
        Self {
            profiles,
            catalog,
            access,
            adaptors,
        }
    }

    /// Resolve login username, credential token and an adaptor for a
    /// compute resource.
    ///
    /// The group scan walks the principal's accessible group resource
    /// profiles in the order the registry returns them and takes the
    /// first matching preference. When a user can reach several profiles
    /// with conflicting preferences for the same resource, the result
    /// follows that external ordering.
    pub async fn resolve_compute_credentials(
        &self,
        principal: &PrincipalId,
        compute_resource_id: &str,
    ) -> Result<StorageInfoContext> {
        let gateway_id = &principal.domain_id;
        let user_id = &principal.user_id;

        let mut user_pref = None;
        if self.safe_user_profile_exists(user_id, gateway_id).await {
            user_pref = self
                .profiles
                .get_user_compute_preference(user_id, gateway_id, compute_resource_id)
                .await?;
        } else {
            debug!(
                "User resource profile does not exist for user {} in gateway {}, will try group preferences",
                user_id, gateway_id
            );
        }

        let login_user_name: String;
        let mut login_from_user_pref = false;
        let mut matched_group_pref: Option<GroupComputeResourcePreference> = None;
        let mut matched_group_profile: Option<GroupResourceProfile> = None;

        if let Some(login) = user_pref.as_ref().and_then(|p| non_blank(&p.login_user_name)) {
            login_user_name = login.to_string();
            login_from_user_pref = true;
            debug!("Using user preference login username: {}", login_user_name);
        } else {
            // Fall back to the group compute resource preferences.
            let profile_ids = self
                .access
                .accessible_entity_ids(principal, ResourceType::GroupResourceProfile)
                .await?;
            let group_profiles = self
                .profiles
                .get_group_resource_profiles(gateway_id, &profile_ids)
                .await?;

            let mut found = None;
            'profiles: for profile in group_profiles {
                for preference in &profile.compute_preferences {
                    if preference.compute_resource_id == compute_resource_id {
                        if let Some(login) = non_blank(&preference.login_user_name) {
                            found = Some((login.to_string(), preference.clone(), profile.clone()));
                            break 'profiles;
                        }
                    }
                }
            }

            match found {
                Some((login, preference, profile)) => {
                    debug!(
                        "Using login username from group compute resource preference for resource {}",
                        compute_resource_id
                    );
                    login_user_name = login;
                    matched_group_pref = Some(preference);
                    matched_group_profile = Some(profile);
                }
                None => {
                    debug!(
                        "No login username found for compute resource {}",
                        compute_resource_id
                    );
                    return Err(ResolutionError::NoLoginUserName(format!(
                        "compute resource {}",
                        compute_resource_id
                    )));
                }
            }
        }

        // Resolve the credential token based on where the login came from.
        let credential_token = if login_from_user_pref {
            if let Some(token) = user_pref
                .as_ref()
                .and_then(|p| non_blank(&p.resource_specific_credential_store_token))
            {
                token.to_string()
            } else {
                self.user_profile_token(user_id, gateway_id, &format!(
                    "user {} in gateway {}",
                    user_id, gateway_id
                ))
                .await?
            }
        } else if let Some(token) = matched_group_pref
            .as_ref()
            .and_then(|p| non_blank(&p.resource_specific_credential_store_token))
        {
            token.to_string()
        } else if let Some(token) = matched_group_profile
            .as_ref()
            .and_then(|p| non_blank(&p.default_credential_store_token))
        {
            token.to_string()
        } else {
            self.user_profile_token(user_id, gateway_id, &format!(
                "compute resource {}",
                compute_resource_id
            ))
            .await?
        };

        let adaptor = self
            .adaptors
            .fetch_compute_ssh_adaptor(
                gateway_id,
                compute_resource_id,
                &credential_token,
                user_id,
                &login_user_name,
            )
            .await?;
        info!(
            "Resolved resource {} as compute resource to fetch storage details",
            compute_resource_id
        );

        Ok(StorageInfoContext {
            login_user_name,
            credential_token,
            provenance: if login_from_user_pref {
                LoginProvenance::User
            } else {
                LoginProvenance::Group
            },
            adaptor,
        })
    }

    /// Resolve login username, credential token and an adaptor for a
    /// storage resource. Two levels: user storage preference, then the
    /// gateway storage preference.
    pub async fn resolve_storage_credentials(
        &self,
        principal: &PrincipalId,
        storage_resource_id: &str,
    ) -> Result<StorageInfoContext> {
        let gateway_id = &principal.domain_id;
        let user_id = &principal.user_id;

        let mut user_pref = None;
        if self.safe_user_profile_exists(user_id, gateway_id).await {
            user_pref = self
                .profiles
                .get_user_storage_preference(user_id, gateway_id, storage_resource_id)
                .await?;
        } else {
            debug!(
                "User resource profile does not exist for user {} in gateway {}, will try gateway preferences",
                user_id, gateway_id
            );
        }

        let mut gateway_pref = None;
        if self.safe_gateway_profile_exists(gateway_id).await {
            gateway_pref = self
                .profiles
                .get_gateway_storage_preference(gateway_id, storage_resource_id)
                .await?;
        } else {
            debug!(
                "Gateway resource profile does not exist for gateway {}, will check if user preference exists",
                gateway_id
            );
        }

        let login_user_name: String;
        let login_from_user_pref;

        if let Some(login) = user_pref.as_ref().and_then(|p| non_blank(&p.login_user_name)) {
            login_user_name = login.to_string();
            login_from_user_pref = true;
            debug!(
                "Using login username from user storage preference for resource {}",
                storage_resource_id
            );
        } else if let Some(login) = gateway_pref
            .as_ref()
            .and_then(|p| non_blank(&p.login_user_name))
        {
            login_user_name = login.to_string();
            login_from_user_pref = false;
            debug!(
                "Using login username from gateway storage preference for resource {}",
                storage_resource_id
            );
        } else {
            error!("No login username found for storage resource {}", storage_resource_id);
            return Err(ResolutionError::NoLoginUserName(format!(
                "storage resource {}",
                storage_resource_id
            )));
        }

        // Resolve the credential token based on where the login came from.
        let credential_token = if login_from_user_pref {
            if let Some(token) = user_pref
                .as_ref()
                .and_then(|p| non_blank(&p.resource_specific_credential_store_token))
            {
                token.to_string()
            } else {
                self.user_profile_token(user_id, gateway_id, &format!(
                    "user {} in gateway {}",
                    user_id, gateway_id
                ))
                .await?
            }
        } else if let Some(token) = gateway_pref
            .as_ref()
            .and_then(|p| non_blank(&p.resource_specific_credential_store_token))
        {
            token.to_string()
        } else {
            let gateway_profile = self.profiles.get_gateway_resource_profile(gateway_id).await?;
            match gateway_profile.as_ref().and_then(|p| non_blank(&p.credential_store_token)) {
                Some(token) => token.to_string(),
                None => {
                    error!("No credential store token found for gateway {}", gateway_id);
                    return Err(ResolutionError::TokenUnresolvable(format!(
                        "gateway {}",
                        gateway_id
                    )));
                }
            }
        };

        let adaptor = self
            .adaptors
            .fetch_storage_ssh_adaptor(
                gateway_id,
                storage_resource_id,
                &credential_token,
                user_id,
                &login_user_name,
            )
            .await?;
        info!(
            "Resolved resource {} as storage resource to fetch storage details",
            storage_resource_id
        );

        Ok(StorageInfoContext {
            login_user_name,
            credential_token,
            provenance: if login_from_user_pref {
                LoginProvenance::User
            } else {
                LoginProvenance::Gateway
            },
            adaptor,
        })
    }

    /// Classify a bare resource id by probing the compute catalog first
    /// and the storage catalog second, then run the matching resolution
    /// path.
    pub async fn resolve_storage_info_context(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
    ) -> Result<StorageInfoContext> {
        let compute = match self.catalog.get_compute_resource(resource_id).await {
            Ok(resource) => resource,
            Err(e) => {
                debug!("Compute resource {} not found: {}", resource_id, e);
                None
            }
        };

        let storage = if compute.is_none() {
            match self.catalog.get_storage_resource(resource_id).await {
                Ok(resource) => resource,
                Err(e) => {
                    debug!("Storage resource {} not found: {}", resource_id, e);
                    None
                }
            }
        } else {
            None
        };

        if compute.is_none() && storage.is_none() {
            error!(
                "Resource with ID {} not found as either compute resource or storage resource",
                resource_id
            );
            return Err(ResolutionError::UnknownResource(resource_id.to_string()));
        }

        if compute.is_some() {
            debug!(
                "Found compute resource with ID {}. Resolving login username and credentials",
                resource_id
            );
            self.resolve_compute_credentials(principal, resource_id).await
        } else {
            debug!(
                "Found storage resource with ID {}. Resolving login username and credentials",
                resource_id
            );
            self.resolve_storage_credentials(principal, resource_id).await
        }
    }

    /// Volume info for a path on a compute or storage resource.
    pub async fn get_resource_storage_info(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        location: &str,
    ) -> Result<StorageVolumeInfo> {
        let context = self.resolve_storage_info_context(principal, resource_id).await?;
        context.adaptor.storage_volume_info(location).await
    }

    /// Directory listing for a path on a compute or storage resource.
    pub async fn get_storage_directory_info(
        &self,
        principal: &PrincipalId,
        resource_id: &str,
        location: &str,
    ) -> Result<StorageDirectoryInfo> {
        let context = self.resolve_storage_info_context(principal, resource_id).await?;
        context.adaptor.storage_directory_info(location).await
    }

    /// Final token fallback: the user resource profile's gateway-wide
    /// token.
    async fn user_profile_token(
        &self,
        user_id: &str,
        gateway_id: &str,
        failure_context: &str,
    ) -> Result<String> {
        let profile = self
            .profiles
            .get_user_resource_profile(user_id, gateway_id)
            .await?;
        match profile.as_ref().and_then(|p| non_blank(&p.credential_store_token)) {
            Some(token) => Ok(token.to_string()),
            None => {
                error!(
                    "No credential store token found for user {} in gateway {}",
                    user_id, gateway_id
                );
                Err(ResolutionError::TokenUnresolvable(failure_context.to_string()))
            }
        }
    }

    async fn safe_user_profile_exists(&self, user_id: &str, gateway_id: &str) -> bool {
        match self
            .profiles
            .is_user_resource_profile_exists(user_id, gateway_id)
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                error!("Error checking if user resource profile exists: {}", e);
                false
            }
        }
    }

    async fn safe_gateway_profile_exists(&self, gateway_id: &str) -> bool {
        match self
            .profiles
            .is_gateway_resource_profile_exists(gateway_id)
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                error!("Error while checking if gateway resource profile exists: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use authz::MemoryGatewayGroupsStore;
    use chrono::Utc;
    use resources::{
        ComputeResourceDescription, GatewayResourceProfile, GatewayStoragePreference,
        MemoryResourceStore, StorageResourceDescription, UserComputeResourcePreference,
        UserResourceProfile, UserStoragePreference,
    };
    use sharing::{Entity, EntityTypeId, MemorySharingRegistry, SharingRegistry};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct AdaptorRequest {
        kind: &'static str,
        gateway_id: String,
        resource_id: String,
        credential_token: String,
        user_id: String,
        login_user_name: String,
    }

    struct MockAdaptorHandle;

    #[async_trait]
    impl AdaptorHandle for MockAdaptorHandle {
        async fn storage_volume_info(&self, path: &str) -> Result<StorageVolumeInfo> {
            Ok(StorageVolumeInfo {
                mount_point: path.to_string(),
                total_bytes: 1_000_000,
                free_bytes: 400_000,
            })
        }

        async fn storage_directory_info(&self, path: &str) -> Result<StorageDirectoryInfo> {
            Ok(StorageDirectoryInfo {
                path: path.to_string(),
                entries: vec![],
                total_size_bytes: 0,
            })
        }
    }

    #[derive(Default)]
    struct MockAdaptorFactory {
        calls: Mutex<Vec<AdaptorRequest>>,
    }

    impl MockAdaptorFactory {
        fn last_call(&self) -> AdaptorRequest {
            self.calls.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl AdaptorFactory for MockAdaptorFactory {
        async fn fetch_compute_ssh_adaptor(
            &self,
            gateway_id: &str,
            compute_resource_id: &str,
            credential_token: &str,
            user_id: &str,
            login_user_name: &str,
        ) -> Result<Arc<dyn AdaptorHandle>> {
            self.calls.lock().unwrap().push(AdaptorRequest {
                kind: "compute",
                gateway_id: gateway_id.to_string(),
                resource_id: compute_resource_id.to_string(),
                credential_token: credential_token.to_string(),
                user_id: user_id.to_string(),
                login_user_name: login_user_name.to_string(),
            });
            Ok(Arc::new(MockAdaptorHandle))
        }

        async fn fetch_storage_ssh_adaptor(
            &self,
            gateway_id: &str,
            storage_resource_id: &str,
            credential_token: &str,
            user_id: &str,
            login_user_name: &str,
        ) -> Result<Arc<dyn AdaptorHandle>> {
            self.calls.lock().unwrap().push(AdaptorRequest {
                kind: "storage",
                gateway_id: gateway_id.to_string(),
                resource_id: storage_resource_id.to_string(),
                credential_token: credential_token.to_string(),
                user_id: user_id.to_string(),
                login_user_name: login_user_name.to_string(),
            });
            Ok(Arc::new(MockAdaptorHandle))
        }
    }

    struct Fixture {
        resolver: CredentialResolver,
        store: Arc<MemoryResourceStore>,
        registry: Arc<MemorySharingRegistry>,
        factory: Arc<MockAdaptorFactory>,
    }

    async fn fixture() -> Fixture {
        let registry = Arc::new(MemorySharingRegistry::new());
        let store = Arc::new(MemoryResourceStore::new());
        let factory = Arc::new(MockAdaptorFactory::default());
        let access = Arc::new(AccessEngine::new(
            registry.clone(),
            Arc::new(MemoryGatewayGroupsStore::new()),
        ));

        store
            .register_compute_resource(ComputeResourceDescription {
                compute_resource_id: "cluster-a".to_string(),
                host_name: "cluster-a.example.edu".to_string(),
                description: None,
                enabled: true,
            })
            .await
            .unwrap();
        store
            .register_storage_resource(StorageResourceDescription {
                storage_resource_id: "store-a".to_string(),
                host_name: "store-a.example.edu".to_string(),
                description: None,
                enabled: true,
            })
            .await
            .unwrap();

        let resolver = CredentialResolver::new(
            store.clone(),
            store.clone(),
            access,
            factory.clone(),
        );
        Fixture {
            resolver,
            store,
            registry,
            factory,
        }
    }

    fn alice() -> PrincipalId {
        PrincipalId::new("alice", "gw1")
    }

    async fn put_user_profile(fixture: &Fixture, token: Option<&str>) {
        fixture
            .store
            .put_user_resource_profile(UserResourceProfile {
                user_id: "alice".to_string(),
                gateway_id: "gw1".to_string(),
                credential_store_token: token.map(str::to_string),
            })
            .await
            .unwrap();
    }

    async fn put_user_compute_pref(fixture: &Fixture, login: Option<&str>, token: Option<&str>) {
        fixture
            .store
            .put_user_compute_preference(UserComputeResourcePreference {
                user_id: "alice".to_string(),
                gateway_id: "gw1".to_string(),
                compute_resource_id: "cluster-a".to_string(),
                login_user_name: login.map(str::to_string),
                resource_specific_credential_store_token: token.map(str::to_string),
            })
            .await
            .unwrap();
    }

    /// Register a group resource profile accessible to alice (she owns
    /// its registry entity) with one compute preference for cluster-a.
    async fn put_group_profile(
        fixture: &Fixture,
        profile_id: &str,
        login: Option<&str>,
        pref_token: Option<&str>,
        default_token: Option<&str>,
    ) {
        fixture
            .registry
            .create_entity(Entity {
                entity_id: profile_id.to_string(),
                domain_id: "gw1".to_string(),
                entity_type_id: EntityTypeId::new("gw1", "GROUP_RESOURCE_PROFILE"),
                owner_id: alice(),
                name: profile_id.to_string(),
                description: None,
                created_at: Utc::now().naive_utc(),
            })
            .await
            .unwrap();
        fixture
            .store
            .put_group_resource_profile(GroupResourceProfile {
                group_resource_profile_id: profile_id.to_string(),
                gateway_id: "gw1".to_string(),
                group_resource_profile_name: profile_id.to_string(),
                default_credential_store_token: default_token.map(str::to_string),
                compute_preferences: vec![GroupComputeResourcePreference {
                    group_resource_profile_id: profile_id.to_string(),
                    compute_resource_id: "cluster-a".to_string(),
                    login_user_name: login.map(str::to_string),
                    resource_specific_credential_store_token: pref_token.map(str::to_string),
                }],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_preference_wins_and_gates_token_chain() {
        let fixture = fixture().await;
        // User preference has a login but no token; the user profile has
        // one. A group preference for the same resource is fully
        // populated and must be ignored on both axes.
        put_user_profile(&fixture, Some("tok-u")).await;
        put_user_compute_pref(&fixture, Some("asmith"), None).await;
        put_group_profile(&fixture, "grp-1", Some("bob"), Some("tok-g-pref"), Some("tok-g")).await;

        let context = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap();
        assert_eq!(context.login_user_name, "asmith");
        assert_eq!(context.credential_token, "tok-u");
        assert_eq!(context.provenance, LoginProvenance::User);
    }

    #[tokio::test]
    async fn test_user_preference_token_preferred_over_profile_token() {
        let fixture = fixture().await;
        put_user_profile(&fixture, Some("tok-u")).await;
        put_user_compute_pref(&fixture, Some("asmith"), Some("tok-pref")).await;

        let context = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap();
        assert_eq!(context.credential_token, "tok-pref");
    }

    #[tokio::test]
    async fn test_blank_user_login_falls_back_to_group() {
        let fixture = fixture().await;
        // User preference {login: "", token: "tok-u"}, group preference
        // {login: "bob", token: ""} and a populated group default token.
        // Group provenance selects the group chain.
        put_user_profile(&fixture, None).await;
        put_user_compute_pref(&fixture, Some(""), Some("tok-u")).await;
        put_group_profile(&fixture, "grp-1", Some("bob"), Some(""), Some("tok-g")).await;

        let context = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap();
        assert_eq!(context.login_user_name, "bob");
        assert_eq!(context.credential_token, "tok-g");
        assert_eq!(context.provenance, LoginProvenance::Group);
    }

    #[tokio::test]
    async fn test_group_provenance_falls_back_to_user_profile_token() {
        let fixture = fixture().await;
        // Login resolves from GROUP but the group preference and profile
        // carry no token; only the user profile does. The three-level
        // chain must end there.
        put_user_profile(&fixture, Some("tok-u")).await;
        put_group_profile(&fixture, "grp-1", Some("bob"), None, None).await;

        let context = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap();
        assert_eq!(context.login_user_name, "bob");
        assert_eq!(context.credential_token, "tok-u");
        assert_eq!(context.provenance, LoginProvenance::Group);
    }

    #[tokio::test]
    async fn test_group_chain_exhausted_is_authentication_failure() {
        let fixture = fixture().await;
        put_group_profile(&fixture, "grp-1", Some("bob"), None, None).await;

        let err = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::TokenUnresolvable(_)));
    }

    #[tokio::test]
    async fn test_no_login_anywhere_is_invalid_request() {
        let fixture = fixture().await;
        put_user_profile(&fixture, Some("tok-u")).await;

        let err = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::NoLoginUserName(_)));
    }

    #[tokio::test]
    async fn test_group_scan_is_first_match_wins() {
        let fixture = fixture().await;
        put_user_profile(&fixture, Some("tok-u")).await;
        // Two accessible profiles match; registry creation order decides.
        put_group_profile(&fixture, "grp-1", Some("first"), None, None).await;
        put_group_profile(&fixture, "grp-2", Some("second"), None, None).await;

        let context = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap();
        assert_eq!(context.login_user_name, "first");
    }

    #[tokio::test]
    async fn test_group_scan_skips_blank_login_preferences() {
        let fixture = fixture().await;
        put_user_profile(&fixture, Some("tok-u")).await;
        put_group_profile(&fixture, "grp-1", Some("  "), Some("tok-blank"), None).await;
        put_group_profile(&fixture, "grp-2", Some("second"), None, None).await;

        let context = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap();
        assert_eq!(context.login_user_name, "second");
    }

    #[tokio::test]
    async fn test_user_preference_ignored_without_user_profile() {
        let fixture = fixture().await;
        // The preference record exists but the user resource profile does
        // not; the user level is skipped entirely.
        put_user_compute_pref(&fixture, Some("asmith"), Some("tok-pref")).await;
        put_group_profile(&fixture, "grp-1", Some("bob"), Some("tok-g-pref"), None).await;

        let context = fixture
            .resolver
            .resolve_compute_credentials(&alice(), "cluster-a")
            .await
            .unwrap();
        assert_eq!(context.login_user_name, "bob");
        assert_eq!(context.credential_token, "tok-g-pref");
    }

    #[tokio::test]
    async fn test_storage_user_preference_wins() {
        let fixture = fixture().await;
        put_user_profile(&fixture, Some("tok-u")).await;
        fixture
            .store
            .put_user_storage_preference(UserStoragePreference {
                user_id: "alice".to_string(),
                gateway_id: "gw1".to_string(),
                storage_resource_id: "store-a".to_string(),
                login_user_name: Some("asmith".to_string()),
                resource_specific_credential_store_token: None,
            })
            .await
            .unwrap();
        fixture
            .store
            .put_gateway_resource_profile(GatewayResourceProfile {
                gateway_id: "gw1".to_string(),
                credential_store_token: Some("tok-gw".to_string()),
            })
            .await
            .unwrap();
        fixture
            .store
            .put_gateway_storage_preference(GatewayStoragePreference {
                gateway_id: "gw1".to_string(),
                storage_resource_id: "store-a".to_string(),
                login_user_name: Some("gateway-login".to_string()),
                resource_specific_credential_store_token: Some("tok-gw-pref".to_string()),
            })
            .await
            .unwrap();

        let context = fixture
            .resolver
            .resolve_storage_credentials(&alice(), "store-a")
            .await
            .unwrap();
        // User provenance: gateway tokens are never consulted.
        assert_eq!(context.login_user_name, "asmith");
        assert_eq!(context.credential_token, "tok-u");
        assert_eq!(context.provenance, LoginProvenance::User);
    }

    #[tokio::test]
    async fn test_storage_gateway_fallback_chain() {
        let fixture = fixture().await;
        fixture
            .store
            .put_gateway_resource_profile(GatewayResourceProfile {
                gateway_id: "gw1".to_string(),
                credential_store_token: Some("tok-gw".to_string()),
            })
            .await
            .unwrap();
        fixture
            .store
            .put_gateway_storage_preference(GatewayStoragePreference {
                gateway_id: "gw1".to_string(),
                storage_resource_id: "store-a".to_string(),
                login_user_name: Some("gateway-login".to_string()),
                resource_specific_credential_store_token: None,
            })
            .await
            .unwrap();

        let context = fixture
            .resolver
            .resolve_storage_credentials(&alice(), "store-a")
            .await
            .unwrap();
        assert_eq!(context.login_user_name, "gateway-login");
        // Gateway provenance falls back to the gateway profile token, not
        // the user profile.
        assert_eq!(context.credential_token, "tok-gw");
        assert_eq!(context.provenance, LoginProvenance::Gateway);
    }

    #[tokio::test]
    async fn test_storage_gateway_chain_exhausted() {
        let fixture = fixture().await;
        fixture
            .store
            .put_gateway_resource_profile(GatewayResourceProfile {
                gateway_id: "gw1".to_string(),
                credential_store_token: None,
            })
            .await
            .unwrap();
        fixture
            .store
            .put_gateway_storage_preference(GatewayStoragePreference {
                gateway_id: "gw1".to_string(),
                storage_resource_id: "store-a".to_string(),
                login_user_name: Some("gateway-login".to_string()),
                resource_specific_credential_store_token: None,
            })
            .await
            .unwrap();

        let err = fixture
            .resolver
            .resolve_storage_credentials(&alice(), "store-a")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::TokenUnresolvable(_)));
    }

    #[tokio::test]
    async fn test_probe_classifies_compute_before_storage() {
        let fixture = fixture().await;
        put_user_profile(&fixture, Some("tok-u")).await;
        put_user_compute_pref(&fixture, Some("asmith"), None).await;

        let info = fixture
            .resolver
            .get_resource_storage_info(&alice(), "cluster-a", "/scratch")
            .await
            .unwrap();
        assert_eq!(info.mount_point, "/scratch");

        let call = fixture.factory.last_call();
        assert_eq!(call.kind, "compute");
        assert_eq!(call.resource_id, "cluster-a");
        assert_eq!(call.login_user_name, "asmith");
        assert_eq!(call.credential_token, "tok-u");
    }

    #[tokio::test]
    async fn test_probe_falls_through_to_storage() {
        let fixture = fixture().await;
        put_user_profile(&fixture, Some("tok-u")).await;
        fixture
            .store
            .put_user_storage_preference(UserStoragePreference {
                user_id: "alice".to_string(),
                gateway_id: "gw1".to_string(),
                storage_resource_id: "store-a".to_string(),
                login_user_name: Some("asmith".to_string()),
                resource_specific_credential_store_token: None,
            })
            .await
            .unwrap();

        let listing = fixture
            .resolver
            .get_storage_directory_info(&alice(), "store-a", "/data")
            .await
            .unwrap();
        assert_eq!(listing.path, "/data");
        assert_eq!(fixture.factory.last_call().kind, "storage");
    }

    #[tokio::test]
    async fn test_unknown_resource_is_invalid_request() {
        let fixture = fixture().await;
        let err = fixture
            .resolver
            .get_resource_storage_info(&alice(), "nowhere", "/")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::UnknownResource(_)));
    }
}
