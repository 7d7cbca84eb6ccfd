//! Impersonated client construction
//!
//! The gateway holds one privileged connection configuration. Request
//! handlers never see it: they receive a [`SecretsBackend`] whose every call
//! carries `Impersonate-User` / `Impersonate-Group` for the caller.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::backend::{KubeSecretsBackend, SecretsBackend};
use crate::error::{Error, Result};
use crate::identity::Identity;

/// Default connection timeout for backend clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for backend clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a backend bound to one caller identity
///
/// Construction performs no network call.
#[cfg_attr(test, mockall::automock)]
pub trait ImpersonationFactory: Send + Sync {
    /// Create a backend whose calls run as `identity`
    fn impersonate(&self, identity: &Identity) -> Result<Arc<dyn SecretsBackend>>;
}

/// Factory deriving impersonated clients from a base `kube::Config`
pub struct KubeImpersonationFactory {
    base: kube::Config,
}

impl KubeImpersonationFactory {
    /// Create a factory from the gateway's base connection configuration
    pub fn new(base: kube::Config) -> Self {
        Self { base }
    }

    /// Copy the base configuration and bind it to `identity`.
    ///
    /// The base is never mutated; each request works on its own copy.
    pub fn impersonated_config(&self, identity: &Identity) -> kube::Config {
        let mut config = self.base.clone();
        config.auth_info.impersonate = Some(identity.username.clone());
        config.auth_info.impersonate_groups = if identity.groups.is_empty() {
            None
        } else {
            Some(identity.groups.clone())
        };
        config
    }
}

impl ImpersonationFactory for KubeImpersonationFactory {
    fn impersonate(&self, identity: &Identity) -> Result<Arc<dyn SecretsBackend>> {
        let config = self.impersonated_config(identity);
        let client = kube::Client::try_from(config).map_err(|e| {
            Error::backend("failed to create Kubernetes client", e.to_string())
        })?;

        debug!(groups = identity.groups.len(), "Built impersonated client");
        Ok(Arc::new(KubeSecretsBackend::new(client)))
    }
}
