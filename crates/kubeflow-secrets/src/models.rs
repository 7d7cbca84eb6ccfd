//! JSON request and response bodies of the HTTP API

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event, EventSource, Secret};
use serde::{Deserialize, Serialize};

/// `GET /api/namespaces`
#[derive(Debug, Serialize, Deserialize)]
pub struct NamespacesResponse {
    /// Namespaces owned by the caller, sorted
    pub namespaces: Vec<String>,
}

/// Create/update payload
///
/// Maps that are omitted or `null` deserialize to `None`, which matters on
/// update: absent labels/annotations are carried forward.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretUpsertRequest {
    /// Target namespace; must match the caller's namespace when present
    #[serde(default)]
    pub namespace: String,
    /// Secret name
    #[serde(default)]
    pub name: String,
    /// Secret type; defaults to `Opaque`
    #[serde(default, rename = "type")]
    pub type_: String,
    /// Base64-encoded values
    #[serde(default)]
    pub data: Option<BTreeMap<String, String>>,
    /// Plain string values
    #[serde(default)]
    pub string_data: Option<BTreeMap<String, String>>,
    /// Labels; the management label is always forced on
    #[serde(default)]
    pub labels: Option<BTreeMap<String, String>>,
    /// Annotations
    #[serde(default)]
    pub annotations: Option<BTreeMap<String, String>>,
}

/// Response of create and update
#[derive(Debug, Serialize, Deserialize)]
pub struct SecretUpsertResponse {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Secret type
    #[serde(rename = "type")]
    pub type_: String,
}

impl From<&Secret> for SecretUpsertResponse {
    fn from(secret: &Secret) -> Self {
        Self {
            name: secret.metadata.name.clone().unwrap_or_default(),
            namespace: secret.metadata.namespace.clone().unwrap_or_default(),
            type_: secret.type_.clone().unwrap_or_default(),
        }
    }
}

/// Response of delete
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteSecretResponse {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Always true
    pub deleted: bool,
}

/// One row of `GET /api/secrets`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretListItem {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Secret type
    #[serde(rename = "type")]
    pub type_: String,
    /// Creation time reported by the API server
    pub creation_timestamp: Option<DateTime<Utc>>,
}

impl From<&Secret> for SecretListItem {
    fn from(secret: &Secret) -> Self {
        Self {
            name: secret.metadata.name.clone().unwrap_or_default(),
            namespace: secret.metadata.namespace.clone().unwrap_or_default(),
            type_: secret.type_.clone().unwrap_or_default(),
            creation_timestamp: secret.metadata.creation_timestamp.as_ref().map(|t| t.0),
        }
    }
}

/// `GET /api/secrets`
#[derive(Debug, Serialize, Deserialize)]
pub struct SecretListResponse {
    /// Managed secrets sorted by name
    pub items: Vec<SecretListItem>,
}

/// `GET /api/secrets/{name}`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretDetailResponse {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Secret type
    #[serde(rename = "type")]
    pub type_: String,
    /// Creation time reported by the API server
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Labels
    pub labels: BTreeMap<String, String>,
    /// Annotations
    pub annotations: BTreeMap<String, String>,
    /// Every value, base64-encoded
    pub data: BTreeMap<String, String>,
    /// Values that are valid UTF-8, as text
    pub string_data: BTreeMap<String, String>,
}

/// One row of `GET /api/secrets/{name}/events`
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretEventItem {
    /// `Normal` or `Warning`
    #[serde(rename = "type")]
    pub type_: String,
    /// Machine-readable reason
    pub reason: String,
    /// Human-readable message
    pub message: String,
    /// Occurrence count
    pub count: i32,
    /// First observation
    pub first_seen: Option<DateTime<Utc>>,
    /// Latest observation
    pub last_seen: Option<DateTime<Utc>>,
    /// `component@host` summary of the reporter
    pub source: String,
}

impl From<&Event> for SecretEventItem {
    fn from(event: &Event) -> Self {
        let event_time = event.event_time.as_ref().map(|t| t.0);
        let created = event.metadata.creation_timestamp.as_ref().map(|t| t.0);

        Self {
            type_: event.type_.clone().unwrap_or_default(),
            reason: event.reason.clone().unwrap_or_default(),
            message: event.message.clone().unwrap_or_default(),
            count: event.count.unwrap_or_default(),
            first_seen: event
                .first_timestamp
                .as_ref()
                .map(|t| t.0)
                .or(event_time)
                .or(created),
            last_seen: event
                .last_timestamp
                .as_ref()
                .map(|t| t.0)
                .or(event_time)
                .or(created),
            source: source_summary(event.source.as_ref()),
        }
    }
}

/// `GET /api/secrets/{name}/events`
#[derive(Debug, Serialize, Deserialize)]
pub struct SecretEventsResponse {
    /// Events sorted by `lastSeen`, newest first
    pub items: Vec<SecretEventItem>,
}

/// `GET /api/secrets/{name}/yaml`
#[derive(Debug, Serialize, Deserialize)]
pub struct SecretYamlResponse {
    /// Serialized secret
    pub yaml: String,
}

/// Summarize an event source as `component@host`, dropping blank parts
pub fn source_summary(source: Option<&EventSource>) -> String {
    let component = source
        .and_then(|s| s.component.as_deref())
        .map(str::trim)
        .unwrap_or_default();
    let host = source
        .and_then(|s| s.host.as_deref())
        .map(str::trim)
        .unwrap_or_default();

    match (component.is_empty(), host.is_empty()) {
        (true, true) => "-".to_string(),
        (true, false) => host.to_string(),
        (false, true) => component.to_string(),
        (false, false) => format!("{component}@{host}"),
    }
}
