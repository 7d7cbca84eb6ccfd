//! Secrets backend abstraction
//!
//! Defines the [`SecretsBackend`] trait that decouples handlers from the
//! Kubernetes client. The production implementation wraps an impersonated
//! `kube::Client`; tests substitute an in-memory store.
//!
//! Every call is a single remote operation. Nothing is retried here; a
//! transient failure is surfaced to the caller as-is.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Event, Secret};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};

use crate::error::{Error, Result};

/// Remote Secret and Event operations scoped to one caller
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretsBackend: Send + Sync {
    /// List secrets in `namespace` matching an equality label selector
    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>>;

    /// Fetch one secret by name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// Create a secret, returning the stored object
    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret>;

    /// Replace a secret. The object's `resourceVersion` is forwarded so the
    /// API server rejects lost updates.
    async fn replace_secret(&self, namespace: &str, name: &str, secret: &Secret)
        -> Result<Secret>;

    /// Delete a secret by name
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()>;

    /// List events in `namespace` matching a field selector
    async fn list_events(&self, namespace: &str, field_selector: &str) -> Result<Vec<Event>>;
}

/// [`SecretsBackend`] backed by a `kube::Client`
#[derive(Clone)]
pub struct KubeSecretsBackend {
    client: Client,
}

impl KubeSecretsBackend {
    /// Wrap a client. Whatever identity the client presents is the identity
    /// every call runs as.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn secrets(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretsBackend for KubeSecretsBackend {
    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>> {
        let lp = ListParams::default().labels(label_selector);
        self.secrets(namespace)
            .list(&lp)
            .await
            .map(|list| list.items)
            .map_err(|e| Error::from_kube(e, "failed to list secrets"))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.secrets(namespace)
            .get(name)
            .await
            .map_err(|e| Error::from_kube(e, "failed to get secret"))
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        self.secrets(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| Error::from_kube(e, "failed to create secret"))
    }

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret> {
        self.secrets(namespace)
            .replace(name, &PostParams::default(), secret)
            .await
            .map_err(|e| Error::from_kube(e, "failed to update secret"))
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.secrets(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| Error::from_kube(e, "failed to delete secret"))
    }

    async fn list_events(&self, namespace: &str, field_selector: &str) -> Result<Vec<Event>> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let lp = ListParams::default().fields(field_selector);
        api.list(&lp)
            .await
            .map(|list| list.items)
            .map_err(|e| Error::from_kube(e, "failed to list events"))
    }
}
