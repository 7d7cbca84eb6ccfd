//! HTTP handlers
//!
//! Every `/api/secrets` handler receives a [`RequestScope`], so by the time
//! it runs the caller is identified, their namespace is chosen and the
//! backend impersonates them. Handlers acting on one named secret pass it
//! through [`get_managed_secret`] before anything else.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::info;

use crate::error::{Error, Result};
use crate::managed::{get_managed_secret, managed_label_selector};
use crate::models::{
    DeleteSecretResponse, NamespacesResponse, SecretDetailResponse, SecretEventItem,
    SecretEventsResponse, SecretListItem, SecretListResponse, SecretUpsertRequest,
    SecretUpsertResponse, SecretYamlResponse,
};
use crate::scope::{RequestScope, RequestScoper};
use crate::secret::{dns1123_subdomain_errors, secret_to_detail, validate_and_build, SecretTypePolicy};

/// Secret name taken from the request path
///
/// Rejects names that are not DNS-1123 subdomains, and paths that do not
/// decode, with `invalid secret name`.
#[derive(Debug)]
pub struct SecretName(pub String);

impl<S> FromRequestParts<S> for SecretName
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Path(name) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| Error::Validation("invalid secret name".into()))?;
        validate_path_name(&name).map(|name| SecretName(name.to_string()))
    }
}

/// `GET /healthz`
pub async fn healthz() -> &'static str {
    "ok"
}

/// Fallback for methods a route does not serve
pub async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

/// Fallback for unknown paths
pub async fn not_found() -> Error {
    Error::not_found()
}

/// `GET /api/namespaces`
pub async fn list_namespaces(
    State(scoper): State<Arc<RequestScoper>>,
    headers: HeaderMap,
) -> Result<Json<NamespacesResponse>> {
    let (_, namespaces) = scoper.owned_namespaces(&headers).await?;
    Ok(Json(NamespacesResponse { namespaces }))
}

/// `GET /api/secrets`
pub async fn list_secrets(scope: RequestScope) -> Result<Json<SecretListResponse>> {
    let secrets = scope
        .backend
        .list_secrets(&scope.namespace, &managed_label_selector())
        .await?;

    let mut items: Vec<SecretListItem> = secrets.iter().map(SecretListItem::from).collect();
    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(SecretListResponse { items }))
}

/// `POST /api/secrets`
pub async fn create_secret(
    State(policy): State<Arc<SecretTypePolicy>>,
    scope: RequestScope,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<SecretUpsertResponse>)> {
    let mut req = decode_upsert(&body?)?;
    scope.ensure_payload_namespace(&req.namespace)?;
    req.namespace = scope.namespace.clone();

    let secret = validate_and_build(&req, &policy)?;
    let created = scope
        .backend
        .create_secret(&scope.namespace, &secret)
        .await?;

    let response = SecretUpsertResponse::from(&created);
    info!(
        namespace = %response.namespace,
        secret = %response.name,
        secret_type = %response.type_,
        "Secret created"
    );
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /api/secrets/{name}`
pub async fn get_secret(
    scope: RequestScope,
    SecretName(name): SecretName,
) -> Result<Json<SecretDetailResponse>> {
    let name = name.as_str();
    let secret = get_managed_secret(scope.backend.as_ref(), &scope.namespace, name).await?;
    Ok(Json(secret_to_detail(&secret)))
}

/// `PUT /api/secrets/{name}`
///
/// Omitted labels and annotations are carried over from the stored object,
/// and the stored `resourceVersion` is sent with the replacement.
pub async fn update_secret(
    State(policy): State<Arc<SecretTypePolicy>>,
    scope: RequestScope,
    SecretName(name): SecretName,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<SecretUpsertResponse>> {
    let name = name.as_str();
    let existing = get_managed_secret(scope.backend.as_ref(), &scope.namespace, name).await?;

    let mut req = decode_upsert(&body?)?;
    scope.ensure_payload_namespace(&req.namespace)?;
    let payload_name = req.name.trim();
    if !payload_name.is_empty() && payload_name != name {
        return Err(Error::Validation(
            "secret name in payload does not match path".into(),
        ));
    }

    req.namespace = scope.namespace.clone();
    req.name = name.to_string();
    if req.labels.is_none() {
        req.labels = existing.metadata.labels.clone();
    }
    if req.annotations.is_none() {
        req.annotations = existing.metadata.annotations.clone();
    }

    let mut secret = validate_and_build(&req, &policy)?;
    secret.metadata.resource_version = existing.metadata.resource_version.clone();

    let updated = scope
        .backend
        .replace_secret(&scope.namespace, name, &secret)
        .await?;

    let response = SecretUpsertResponse::from(&updated);
    info!(
        namespace = %response.namespace,
        secret = %response.name,
        secret_type = %response.type_,
        "Secret updated"
    );
    Ok(Json(response))
}

/// `DELETE /api/secrets/{name}`
pub async fn delete_secret(
    scope: RequestScope,
    SecretName(name): SecretName,
) -> Result<Json<DeleteSecretResponse>> {
    let name = name.as_str();
    get_managed_secret(scope.backend.as_ref(), &scope.namespace, name).await?;
    scope.backend.delete_secret(&scope.namespace, name).await?;

    info!(namespace = %scope.namespace, secret = %name, "Secret deleted");
    Ok(Json(DeleteSecretResponse {
        name: name.to_string(),
        namespace: scope.namespace,
        deleted: true,
    }))
}

/// `GET /api/secrets/{name}/events`
pub async fn secret_events(
    scope: RequestScope,
    SecretName(name): SecretName,
) -> Result<Json<SecretEventsResponse>> {
    let name = name.as_str();
    get_managed_secret(scope.backend.as_ref(), &scope.namespace, name).await?;

    let events = scope
        .backend
        .list_events(&scope.namespace, &event_field_selector(&scope.namespace, name))
        .await?;

    let mut items: Vec<SecretEventItem> = events.iter().map(SecretEventItem::from).collect();
    items.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
    Ok(Json(SecretEventsResponse { items }))
}

/// `GET /api/secrets/{name}/yaml`
pub async fn secret_yaml(
    scope: RequestScope,
    SecretName(name): SecretName,
) -> Result<Json<SecretYamlResponse>> {
    let name = name.as_str();
    let mut secret = get_managed_secret(scope.backend.as_ref(), &scope.namespace, name).await?;
    secret.metadata.managed_fields = None;

    let yaml = serde_yaml::to_string(&secret)
        .map_err(|e| Error::backend("failed to render yaml", e.to_string()))?;
    Ok(Json(SecretYamlResponse { yaml }))
}

/// Field selector for events whose involved object is the named secret
pub fn event_field_selector(namespace: &str, name: &str) -> String {
    format!(
        "involvedObject.kind=Secret,involvedObject.namespace={namespace},involvedObject.name={name}"
    )
}

fn decode_upsert(body: &[u8]) -> Result<SecretUpsertRequest> {
    serde_json::from_slice(body).map_err(|_| Error::Validation("invalid JSON payload".into()))
}

fn validate_path_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() || !dns1123_subdomain_errors(name).is_empty() {
        return Err(Error::Validation("invalid secret name".into()));
    }
    Ok(name)
}
