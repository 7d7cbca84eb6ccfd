//! In-memory collaborators for router tests

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::HeaderName;
use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::ByteString;

use crate::backend::SecretsBackend;
use crate::error::{Error, Result};
use crate::handlers::event_field_selector;
use crate::identity::{Identity, IdentityExtractor};
use crate::impersonation::ImpersonationFactory;
use crate::resolver::{OwnershipRecord, OwnershipRegistry, ProfileNamespaceResolver};
use crate::scope::RequestScoper;
use crate::secret::SecretTypePolicy;
use crate::server::AppState;

/// Mimics the API server: `stringData` is folded into `data`, objects get a
/// `resourceVersion` and `creationTimestamp`, and stale replaces conflict.
#[derive(Default)]
pub struct InMemoryBackend {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    events: Mutex<Vec<Event>>,
    version: AtomicU64,
}

impl InMemoryBackend {
    /// Store an object as-is, bypassing the gateway
    pub fn seed(&self, secret: Secret) {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        let stored = self.stamp(secret);
        self.secrets.lock().unwrap().insert(key, stored);
    }

    /// Add an event
    pub fn seed_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    /// Stored object, if any
    pub fn stored(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Rewrite a stored object as a concurrent writer would, bumping its
    /// `resourceVersion`
    pub fn touch(&self, namespace: &str, name: &str) {
        let key = (namespace.to_string(), name.to_string());
        let mut secrets = self.secrets.lock().unwrap();
        if let Some(current) = secrets.remove(&key) {
            let stamped = self.stamp(current);
            secrets.insert(key, stamped);
        }
    }

    fn stamp(&self, mut secret: Secret) -> Secret {
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        secret.metadata.resource_version = Some(version.to_string());
        if secret.metadata.creation_timestamp.is_none() {
            secret.metadata.creation_timestamp = Some(Time(Utc::now()));
        }
        if let Some(string_data) = secret.string_data.take() {
            let data = secret.data.get_or_insert_with(BTreeMap::new);
            for (key, value) in string_data {
                data.insert(key, ByteString(value.into_bytes()));
            }
        }
        secret
    }
}

fn matches_selector(secret: &Secret, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|term| !term.is_empty())
        .all(|term| {
            let (key, value) = term.split_once('=').unwrap_or((term, ""));
            secret
                .metadata
                .labels
                .as_ref()
                .and_then(|labels| labels.get(key))
                .is_some_and(|v| v == value)
        })
}

#[async_trait]
impl SecretsBackend for InMemoryBackend {
    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), secret)| ns == namespace && matches_selector(secret, label_selector))
            .map(|(_, secret)| secret.clone())
            .collect())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.stored(namespace, name).ok_or_else(Error::not_found)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let key = (namespace.to_string(), name);
        let mut secrets = self.secrets.lock().unwrap();
        if secrets.contains_key(&key) {
            return Err(Error::Conflict("already exists".into()));
        }
        let mut secret = secret.clone();
        secret.metadata.creation_timestamp = None;
        let stored = self.stamp(secret);
        secrets.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret> {
        let key = (namespace.to_string(), name.to_string());
        let mut secrets = self.secrets.lock().unwrap();
        let current = secrets.get(&key).ok_or_else(Error::not_found)?;
        if secret.metadata.resource_version.is_some()
            && secret.metadata.resource_version != current.metadata.resource_version
        {
            return Err(Error::Conflict("conflict".into()));
        }
        let mut secret = secret.clone();
        secret.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
        let stored = self.stamp(secret);
        secrets.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.secrets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(Error::not_found)
    }

    async fn list_events(&self, namespace: &str, field_selector: &str) -> Result<Vec<Event>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| {
                let object = &event.involved_object;
                object.namespace.as_deref() == Some(namespace)
                    && object.kind.as_deref() == Some("Secret")
                    && event_field_selector(
                        namespace,
                        object.name.as_deref().unwrap_or_default(),
                    ) == field_selector
            })
            .cloned()
            .collect())
    }
}

/// Lets another writer update each secret right after it is read, so the
/// caller's next replace carries a stale `resourceVersion`
pub struct RacingBackend(pub Arc<InMemoryBackend>);

#[async_trait]
impl SecretsBackend for RacingBackend {
    async fn list_secrets(&self, namespace: &str, label_selector: &str) -> Result<Vec<Secret>> {
        self.0.list_secrets(namespace, label_selector).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let secret = self.0.get_secret(namespace, name).await?;
        self.0.touch(namespace, name);
        Ok(secret)
    }

    async fn create_secret(&self, namespace: &str, secret: &Secret) -> Result<Secret> {
        self.0.create_secret(namespace, secret).await
    }

    async fn replace_secret(
        &self,
        namespace: &str,
        name: &str,
        secret: &Secret,
    ) -> Result<Secret> {
        self.0.replace_secret(namespace, name, secret).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.0.delete_secret(namespace, name).await
    }

    async fn list_events(&self, namespace: &str, field_selector: &str) -> Result<Vec<Event>> {
        self.0.list_events(namespace, field_selector).await
    }
}

/// Fixed set of ownership records
pub struct StaticRegistry(pub Vec<OwnershipRecord>);

#[async_trait]
impl OwnershipRegistry for StaticRegistry {
    async fn list_records(&self) -> Result<Vec<OwnershipRecord>> {
        Ok(self.0.clone())
    }
}

/// Hands out the shared backend and records who asked
pub struct RecordingFactory {
    backend: Arc<dyn SecretsBackend>,
    /// Identities impersonated so far
    pub seen: Mutex<Vec<Identity>>,
}

impl ImpersonationFactory for RecordingFactory {
    fn impersonate(&self, identity: &Identity) -> Result<Arc<dyn SecretsBackend>> {
        self.seen.lock().unwrap().push(identity.clone());
        Ok(self.backend.clone())
    }
}

/// Everything a router test needs
pub struct Harness {
    /// Router state
    pub state: AppState,
    /// Shared store behind every impersonated backend
    pub backend: Arc<InMemoryBackend>,
    /// Impersonation recorder
    pub factory: Arc<RecordingFactory>,
}

/// Build a harness over the given `(namespace, owner)` profiles
pub fn harness(profiles: &[(&str, &str)]) -> Harness {
    harness_with(profiles, |backend| backend as Arc<dyn SecretsBackend>)
}

/// Like [`harness`], with handlers seeing `wrap(store)` instead of the store
pub fn harness_with(
    profiles: &[(&str, &str)],
    wrap: impl FnOnce(Arc<InMemoryBackend>) -> Arc<dyn SecretsBackend>,
) -> Harness {
    let backend = Arc::new(InMemoryBackend::default());
    let factory = Arc::new(RecordingFactory {
        backend: wrap(backend.clone()),
        seen: Mutex::new(Vec::new()),
    });
    let registry = StaticRegistry(
        profiles
            .iter()
            .map(|(ns, owner)| OwnershipRecord::new(*ns, *owner))
            .collect(),
    );
    let scoper = RequestScoper::new(
        IdentityExtractor::new(
            HeaderName::from_static("kubeflow-userid"),
            HeaderName::from_static("kubeflow-groups"),
        ),
        Arc::new(ProfileNamespaceResolver::new(Arc::new(registry))),
        factory.clone(),
    );

    Harness {
        state: AppState {
            scoper: Arc::new(scoper),
            policy: Arc::new(SecretTypePolicy::default()),
        },
        backend,
        factory,
    }
}
