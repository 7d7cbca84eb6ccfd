//! Per-request scoping
//!
//! Turns request headers into a [`RequestScope`]: who the caller is, which
//! of their namespaces the request targets, and a backend impersonating
//! them. The steps run in a fixed order (identity, resolution, selection,
//! impersonation) and stop at the first failure, so a rejected request
//! never gets a client.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use serde::Deserialize;
use tracing::debug;

use crate::audit::sanitize_for_log;
use crate::backend::SecretsBackend;
use crate::error::{Error, Result};
use crate::identity::{Identity, IdentityExtractor};
use crate::impersonation::ImpersonationFactory;
use crate::resolver::NamespaceResolver;

/// Headers that may carry the requested namespace, in priority order
const NAMESPACE_HEADERS: &[&str] = &["x-kubeflow-namespace", "kubeflow-namespace"];

/// A request bound to one caller and one owned namespace
///
/// Handlers see the namespace and the impersonating backend only.
pub struct RequestScope {
    identity: Identity,
    /// Namespace every operation of this request targets
    pub namespace: String,
    /// Backend impersonating the caller
    pub backend: Arc<dyn SecretsBackend>,
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("identity", &self.identity)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl RequestScope {
    /// Check a payload namespace against the scope.
    ///
    /// Blank means "the scoped namespace"; anything else must match it.
    pub fn ensure_payload_namespace(&self, payload_namespace: &str) -> Result<()> {
        let payload_namespace = payload_namespace.trim();
        if payload_namespace.is_empty() || payload_namespace == self.namespace {
            Ok(())
        } else {
            Err(Error::cross_namespace())
        }
    }
}

/// Composes identity extraction, namespace resolution and impersonation
pub struct RequestScoper {
    extractor: IdentityExtractor,
    resolver: Arc<dyn NamespaceResolver>,
    factory: Arc<dyn ImpersonationFactory>,
}

impl RequestScoper {
    /// Create a scoper from its three collaborators
    pub fn new(
        extractor: IdentityExtractor,
        resolver: Arc<dyn NamespaceResolver>,
        factory: Arc<dyn ImpersonationFactory>,
    ) -> Self {
        Self {
            extractor,
            resolver,
            factory,
        }
    }

    /// Identity extractor in use
    pub fn extractor(&self) -> &IdentityExtractor {
        &self.extractor
    }

    /// Identity and owned namespaces, without building a client
    pub async fn owned_namespaces(&self, headers: &HeaderMap) -> Result<(Identity, Vec<String>)> {
        let identity = self.extractor.extract(headers)?;
        let owned = self.resolver.resolve(&identity).await?;
        Ok((identity, owned))
    }

    /// Build the full scope for a request
    pub async fn scope(&self, headers: &HeaderMap, requested: Option<&str>) -> Result<RequestScope> {
        let (identity, owned) = self.owned_namespaces(headers).await?;
        let namespace = select_namespace(&owned, requested)?;
        let backend = self.factory.impersonate(&identity)?;

        debug!(
            user = %sanitize_for_log(&identity.username),
            namespace = %namespace,
            "Scoped request"
        );
        Ok(RequestScope {
            identity,
            namespace,
            backend,
        })
    }
}

/// Pick the target namespace from the caller's owned set.
///
/// Without a request, the first owned namespace is used. A requested
/// namespace outside the set is a cross-namespace attempt.
pub fn select_namespace(owned: &[String], requested: Option<&str>) -> Result<String> {
    match requested {
        Some(ns) if owned.iter().any(|o| o == ns) => Ok(ns.to_string()),
        Some(ns) => {
            debug!(requested = %sanitize_for_log(ns), "Rejected cross-namespace request");
            Err(Error::cross_namespace())
        }
        None => owned
            .first()
            .cloned()
            .ok_or_else(|| Error::Forbidden("no kubeflow profile found for user".into())),
    }
}

#[derive(Debug, Default, Deserialize)]
struct NamespaceQuery {
    namespace: Option<String>,
    ns: Option<String>,
}

/// Namespace the caller asked for, if any: query `namespace`, query `ns`,
/// then the namespace headers. Blank values are skipped.
pub fn requested_namespace(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    let query = Query::<NamespaceQuery>::try_from_uri(uri)
        .map(|Query(q)| q)
        .unwrap_or_default();

    let from_headers = NAMESPACE_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .map(String::from);

    [query.namespace, query.ns]
        .into_iter()
        .flatten()
        .chain(from_headers)
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl<S> FromRequestParts<S> for RequestScope
where
    Arc<RequestScoper>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let scoper = Arc::<RequestScoper>::from_ref(state);
        let requested = requested_namespace(&parts.uri, &parts.headers);
        scoper.scope(&parts.headers, requested.as_deref()).await
    }
}
