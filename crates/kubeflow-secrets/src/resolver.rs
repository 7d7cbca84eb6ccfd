//! Namespace resolution against the Kubeflow Profile registry
//!
//! Each Kubeflow `Profile` is cluster-scoped, is named after the namespace it
//! owns, and records its owner in `spec.owner.name`. Resolution lists every
//! Profile with the gateway's own (non-impersonated) client and keeps the
//! ones whose owner matches the caller under [`IdentityCandidates`].
//!
//! # Dependency Injection
//!
//! - [`OwnershipRegistry`]: the list operation, faked in tests
//! - [`NamespaceResolver`]: the read-then-decide query the request scoper
//!   depends on
//!
//! Results are never cached; every request performs one list.

use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::{Api, Client};
use tracing::{debug, warn};

use crate::audit::sanitize_for_log;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::matcher::IdentityCandidates;

/// API group of the Kubeflow Profile resource
pub const PROFILE_GROUP: &str = "kubeflow.org";
/// API version of the Kubeflow Profile resource
pub const PROFILE_VERSION: &str = "v1";
/// Kind of the Kubeflow Profile resource
pub const PROFILE_KIND: &str = "Profile";
/// Plural resource name of the Kubeflow Profile resource
pub const PROFILE_PLURAL: &str = "profiles";

/// Owner names included in a failed-match log line
const MAX_OWNER_NAMES_IN_LOG: usize = 10;

/// One Profile as seen by the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRecord {
    /// Namespace the profile owns (the profile's own name)
    pub namespace: String,
    /// `spec.owner.name`, if the profile declares one
    pub owner: Option<String>,
}

impl OwnershipRecord {
    /// Convenience constructor for a record with an owner
    pub fn new(namespace: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            owner: Some(owner.into()),
        }
    }
}

/// Source of ownership records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OwnershipRegistry: Send + Sync {
    /// List every ownership record in the cluster, unfiltered
    async fn list_records(&self) -> Result<Vec<OwnershipRecord>>;
}

/// Resolves the namespaces a caller owns
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NamespaceResolver: Send + Sync {
    /// Return the sorted, non-empty list of namespaces owned by `identity`.
    ///
    /// Fails with [`Error::Forbidden`] when the caller owns nothing.
    async fn resolve(&self, identity: &Identity) -> Result<Vec<String>>;
}

/// Registry backed by the cluster's Profile objects
pub struct KubeProfileRegistry {
    api: Api<DynamicObject>,
}

impl KubeProfileRegistry {
    /// Create a registry reading Profiles with the gateway's own client
    pub fn new(client: Client) -> Self {
        let gvk = GroupVersionKind::gvk(PROFILE_GROUP, PROFILE_VERSION, PROFILE_KIND);
        let resource = ApiResource::from_gvk_with_plural(&gvk, PROFILE_PLURAL);
        Self {
            api: Api::all_with(client, &resource),
        }
    }
}

#[async_trait]
impl OwnershipRegistry for KubeProfileRegistry {
    async fn list_records(&self) -> Result<Vec<OwnershipRecord>> {
        let profiles = self
            .api
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::from_kube(e, "failed to resolve user namespace"))?;

        profiles.items.iter().map(record_from_profile).collect()
    }
}

/// Extract an ownership record from a Profile object.
///
/// A non-string owner name is a malformed registry entry and fails the
/// whole resolution rather than being skipped.
fn record_from_profile(profile: &DynamicObject) -> Result<OwnershipRecord> {
    let namespace = profile.metadata.name.clone().unwrap_or_default();
    let owner = match profile.data.pointer("/spec/owner/name") {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(name)) => Some(name.clone()),
        Some(other) => {
            return Err(Error::backend(
                "failed to resolve user namespace",
                format!("profile {namespace} has non-string owner name: {other}"),
            ))
        }
    };
    Ok(OwnershipRecord { namespace, owner })
}

/// Pure ownership decision: which of `records` belong to `username`.
///
/// Records with a blank namespace or no owner are skipped. The result is
/// sorted lexicographically.
pub fn owned_namespaces(records: &[OwnershipRecord], username: &str) -> Vec<String> {
    let caller = IdentityCandidates::new(username);
    let mut owned: Vec<String> = records
        .iter()
        .filter_map(|record| {
            let namespace = record.namespace.trim();
            let owner = record.owner.as_deref()?;
            if namespace.is_empty() {
                return None;
            }
            caller
                .matches(&IdentityCandidates::new(owner))
                .then(|| namespace.to_string())
        })
        .collect();
    owned.sort();
    owned.dedup();
    owned
}

/// [`NamespaceResolver`] that reads an [`OwnershipRegistry`] on every call
pub struct ProfileNamespaceResolver {
    registry: Arc<dyn OwnershipRegistry>,
}

impl ProfileNamespaceResolver {
    /// Create a resolver over the given registry
    pub fn new(registry: Arc<dyn OwnershipRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl NamespaceResolver for ProfileNamespaceResolver {
    async fn resolve(&self, identity: &Identity) -> Result<Vec<String>> {
        let records = self.registry.list_records().await?;
        let owned = owned_namespaces(&records, &identity.username);

        if owned.is_empty() {
            let owners: Vec<String> = records
                .iter()
                .filter_map(|r| r.owner.as_deref())
                .map(sanitize_for_log)
                .collect();
            warn!(
                user = %sanitize_for_log(&identity.username),
                candidates = %IdentityCandidates::new(&identity.username),
                profile_owners = %limit_strings(&owners, MAX_OWNER_NAMES_IN_LOG).join(","),
                "Profile match failed"
            );
            return Err(Error::Forbidden("no kubeflow profile found for user".into()));
        }

        debug!(
            user = %sanitize_for_log(&identity.username),
            namespaces = %owned.join(","),
            "Resolved owned namespaces"
        );
        Ok(owned)
    }
}

/// Keep at most `limit` values, summarizing the rest as `...+N more`
fn limit_strings(values: &[String], limit: usize) -> Vec<String> {
    if values.len() <= limit {
        return values.to_vec();
    }
    let mut out = values[..limit].to_vec();
    out.push(format!("...+{} more", values.len() - limit));
    out
}
