//! Managed-secret ownership gate
//!
//! A secret is either [`Ownership::Managed`] (it carries
//! `managed-by=kubeflow-secrets`) or [`Ownership::Unmanaged`]. Only managed
//! secrets are observable or mutable through the gateway, and an unmanaged
//! secret is reported exactly like an absent one.
//!
//! Every handler that acts on a single fetched secret goes through
//! [`get_managed_secret`]. List requests filter server-side with
//! [`managed_label_selector`].

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use tracing::debug;

use crate::backend::SecretsBackend;
use crate::error::{Error, Result};

/// Label key marking secrets created by this gateway
pub const MANAGED_BY_LABEL_KEY: &str = "managed-by";

/// Label value marking secrets created by this gateway
pub const MANAGED_BY_LABEL_VALUE: &str = "kubeflow-secrets";

/// Ownership classification of a fetched secret
#[derive(Debug)]
pub enum Ownership {
    /// Created and owned by this gateway
    Managed(Secret),
    /// Anything else; never exposed
    Unmanaged,
}

impl Ownership {
    /// Classify a secret by its management label
    pub fn classify(secret: Secret) -> Self {
        if is_managed(&secret) {
            Ownership::Managed(secret)
        } else {
            Ownership::Unmanaged
        }
    }

    /// Turn the classification into a result, hiding unmanaged secrets
    /// behind the same not-found error as a missing one.
    pub fn into_managed(self) -> Result<Secret> {
        match self {
            Ownership::Managed(secret) => Ok(secret),
            Ownership::Unmanaged => Err(Error::not_found()),
        }
    }
}

/// Whether the secret carries the management label with the expected value
pub fn is_managed(secret: &Secret) -> bool {
    secret
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(MANAGED_BY_LABEL_KEY))
        .is_some_and(|v| v == MANAGED_BY_LABEL_VALUE)
}

/// Equality selector matching only managed secrets
pub fn managed_label_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL_KEY, MANAGED_BY_LABEL_VALUE)
}

/// Copy `labels` and force the management label onto the copy.
///
/// Any caller-supplied value for the management key is overwritten.
pub fn ensure_managed_labels(labels: Option<&BTreeMap<String, String>>) -> BTreeMap<String, String> {
    let mut out = labels.cloned().unwrap_or_default();
    out.insert(
        MANAGED_BY_LABEL_KEY.to_string(),
        MANAGED_BY_LABEL_VALUE.to_string(),
    );
    out
}

/// Fetch a secret and admit it only if it is managed.
///
/// This is the single gate for get, update, delete, events and YAML.
pub async fn get_managed_secret(
    backend: &dyn SecretsBackend,
    namespace: &str,
    name: &str,
) -> Result<Secret> {
    let secret = backend.get_secret(namespace, name).await?;
    Ownership::classify(secret).into_managed().inspect_err(|_| {
        debug!(namespace = %namespace, secret = %name, "Rejected unmanaged secret");
    })
}
