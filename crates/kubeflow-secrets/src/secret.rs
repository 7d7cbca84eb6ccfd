//! Secret payload validation and object construction
//!
//! [`validate_and_build`] checks an upsert payload in a fixed order, failing
//! on the first problem, and builds the `Secret` to send to the API server.
//! The management label is always stamped onto the result.

use std::collections::{BTreeMap, BTreeSet};

use base64::{engine::general_purpose::STANDARD, Engine};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;

use crate::error::{Error, Result};
use crate::managed::ensure_managed_labels;
use crate::models::{SecretDetailResponse, SecretUpsertRequest};

/// `Opaque` secret type, the default
pub const SECRET_TYPE_OPAQUE: &str = "Opaque";
/// Docker registry credentials secret type
pub const SECRET_TYPE_DOCKER_CONFIG_JSON: &str = "kubernetes.io/dockerconfigjson";
/// ServiceAccount token secret type
pub const SECRET_TYPE_SERVICE_ACCOUNT_TOKEN: &str = "kubernetes.io/service-account-token";
/// Bootstrap token secret type
pub const SECRET_TYPE_BOOTSTRAP_TOKEN: &str = "bootstrap.kubernetes.io/token";
/// Key required in a dockerconfigjson secret
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Maximum length of a DNS-1123 subdomain
const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;

/// Which secret types callers may create
///
/// The blocked set is checked first, and a type in neither set is denied.
#[derive(Debug, Clone)]
pub struct SecretTypePolicy {
    allowed: BTreeSet<String>,
    blocked: BTreeSet<String>,
}

impl Default for SecretTypePolicy {
    fn default() -> Self {
        Self::new(
            [SECRET_TYPE_OPAQUE, SECRET_TYPE_DOCKER_CONFIG_JSON],
            [SECRET_TYPE_SERVICE_ACCOUNT_TOKEN, SECRET_TYPE_BOOTSTRAP_TOKEN],
        )
    }
}

impl SecretTypePolicy {
    /// Create a policy from explicit allow and deny lists
    pub fn new<'a>(
        allowed: impl IntoIterator<Item = &'a str>,
        blocked: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        Self {
            allowed: allowed.into_iter().map(String::from).collect(),
            blocked: blocked.into_iter().map(String::from).collect(),
        }
    }

    /// Check a resolved secret type against the policy
    pub fn check(&self, secret_type: &str) -> Result<()> {
        if self.blocked.contains(secret_type) {
            return Err(Error::Validation(format!(
                "secret type {secret_type:?} is not allowed"
            )));
        }
        if !self.allowed.contains(secret_type) {
            return Err(Error::Validation(format!(
                "secret type {secret_type:?} is not in allowed list"
            )));
        }
        Ok(())
    }
}

/// Validate a DNS-1123 subdomain, returning every violated rule.
///
/// An empty result means the name is valid.
pub fn dns1123_subdomain_errors(name: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if name.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errors.push(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LENGTH} characters"
        ));
    }

    if !name.split('.').all(is_dns1123_label) {
        errors.push(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric \
             characters, '-' or '.', and must start and end with an alphanumeric character"
                .to_string(),
        );
    }

    errors
}

fn is_dns1123_label(label: &str) -> bool {
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            alnum(first) && alnum(last) && bytes.iter().all(|b| alnum(b) || *b == b'-')
        }
        _ => false,
    }
}

/// Validate an upsert payload and build the Secret to store.
///
/// Checks, in order: namespace and name present, name syntax, type policy,
/// some data present, `data` keys and base64 values, and the
/// dockerconfigjson key requirement. The returned object owns fresh copies
/// of every map in `req`.
pub fn validate_and_build(req: &SecretUpsertRequest, policy: &SecretTypePolicy) -> Result<Secret> {
    let namespace = req.namespace.trim();
    let name = req.name.trim();

    if namespace.is_empty() {
        return Err(Error::Validation("namespace is required".into()));
    }
    if name.is_empty() {
        return Err(Error::Validation("name is required".into()));
    }
    let name_errors = dns1123_subdomain_errors(name);
    if !name_errors.is_empty() {
        return Err(Error::Validation(format!(
            "invalid secret name: {}",
            name_errors.join(", ")
        )));
    }

    let secret_type = match req.type_.trim() {
        "" => SECRET_TYPE_OPAQUE,
        t => t,
    };
    policy.check(secret_type)?;

    let data = req.data.as_ref().filter(|d| !d.is_empty());
    let string_data = req.string_data.as_ref().filter(|d| !d.is_empty());
    if data.is_none() && string_data.is_none() {
        return Err(Error::Validation(
            "either data or stringData must be provided".into(),
        ));
    }

    let mut decoded = BTreeMap::new();
    for (key, value) in data.into_iter().flatten() {
        if key.trim().is_empty() {
            return Err(Error::Validation("data contains an empty key".into()));
        }
        let bytes = STANDARD
            .decode(value)
            .map_err(|_| Error::Validation(format!("data[{key:?}] is not valid base64")))?;
        decoded.insert(key.clone(), ByteString(bytes));
    }

    if secret_type == SECRET_TYPE_DOCKER_CONFIG_JSON
        && !decoded.contains_key(DOCKER_CONFIG_JSON_KEY)
        && !string_data.is_some_and(|d| d.contains_key(DOCKER_CONFIG_JSON_KEY))
    {
        return Err(Error::Validation(format!(
            "dockerconfigjson secret requires {DOCKER_CONFIG_JSON_KEY:?} key"
        )));
    }

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(ensure_managed_labels(req.labels.as_ref())),
            annotations: req.annotations.clone(),
            ..Default::default()
        },
        type_: Some(secret_type.to_string()),
        data: Some(decoded),
        string_data: string_data.cloned(),
        ..Default::default()
    })
}

/// Render a stored secret for the detail endpoint.
///
/// All values are returned base64-encoded in `data`; the ones that are
/// valid UTF-8 are repeated as text in `stringData`.
pub fn secret_to_detail(secret: &Secret) -> SecretDetailResponse {
    let mut data = BTreeMap::new();
    let mut string_data = BTreeMap::new();

    for (key, value) in secret.data.iter().flatten() {
        data.insert(key.clone(), STANDARD.encode(&value.0));
        if let Ok(text) = std::str::from_utf8(&value.0) {
            string_data.insert(key.clone(), text.to_string());
        }
    }

    SecretDetailResponse {
        name: secret.metadata.name.clone().unwrap_or_default(),
        namespace: secret.metadata.namespace.clone().unwrap_or_default(),
        type_: secret.type_.clone().unwrap_or_default(),
        creation_timestamp: secret.metadata.creation_timestamp.as_ref().map(|t| t.0),
        labels: secret.metadata.labels.clone().unwrap_or_default(),
        annotations: secret.metadata.annotations.clone().unwrap_or_default(),
        data,
        string_data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn request() -> SecretUpsertRequest {
        SecretUpsertRequest {
            namespace: "team-a".into(),
            name: "db-credentials".into(),
            string_data: map(&[("password", "hunter2")]),
            ..Default::default()
        }
    }

    fn validation_message(req: &SecretUpsertRequest) -> String {
        match validate_and_build(req, &SecretTypePolicy::default()) {
            Err(Error::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_builds_opaque_by_default() {
        let secret = validate_and_build(&request(), &SecretTypePolicy::default()).unwrap();
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(secret.metadata.name.as_deref(), Some("db-credentials"));
        assert_eq!(secret.metadata.namespace.as_deref(), Some("team-a"));
        assert_eq!(secret.string_data.unwrap()["password"], "hunter2");
        assert_eq!(
            secret.metadata.labels.unwrap()["managed-by"],
            "kubeflow-secrets"
        );
    }

    #[test]
    fn test_requires_namespace_then_name() {
        let mut req = request();
        req.namespace = "  ".into();
        req.name = String::new();
        assert_eq!(validation_message(&req), "namespace is required");

        let mut req = request();
        req.name = " ".into();
        assert_eq!(validation_message(&req), "name is required");
    }

    #[test]
    fn test_rejects_invalid_names() {
        for bad in ["Upper", "-lead", "trail-", "a..b", "under_score", ".dot"] {
            let mut req = request();
            req.name = bad.into();
            assert!(
                validation_message(&req).starts_with("invalid secret name: "),
                "{bad}"
            );
        }

        let mut req = request();
        req.name = "a".repeat(254);
        assert!(validation_message(&req).contains("no more than 253"));
    }

    #[test]
    fn test_accepts_valid_names() {
        for good in ["a", "db-1", "registry.example.com", "0abc"] {
            assert!(dns1123_subdomain_errors(good).is_empty(), "{good}");
        }
    }

    #[test]
    fn test_blocked_type_checked_before_allowed() {
        let policy = SecretTypePolicy::new(
            [SECRET_TYPE_OPAQUE, SECRET_TYPE_SERVICE_ACCOUNT_TOKEN],
            [SECRET_TYPE_SERVICE_ACCOUNT_TOKEN],
        );
        let mut req = request();
        req.type_ = SECRET_TYPE_SERVICE_ACCOUNT_TOKEN.into();

        let err = validate_and_build(&req, &policy).unwrap_err();
        assert_eq!(
            err.to_string(),
            "secret type \"kubernetes.io/service-account-token\" is not allowed"
        );
    }

    #[test]
    fn test_blocked_types_rejected() {
        for blocked in [SECRET_TYPE_SERVICE_ACCOUNT_TOKEN, SECRET_TYPE_BOOTSTRAP_TOKEN] {
            let mut req = request();
            req.type_ = blocked.into();
            assert!(validation_message(&req).ends_with("is not allowed"));
        }
    }

    #[test]
    fn test_unknown_type_default_denied() {
        let mut req = request();
        req.type_ = "kubernetes.io/tls".into();
        assert_eq!(
            validation_message(&req),
            "secret type \"kubernetes.io/tls\" is not in allowed list"
        );
    }

    #[test]
    fn test_requires_some_data() {
        let mut req = request();
        req.string_data = None;
        assert_eq!(
            validation_message(&req),
            "either data or stringData must be provided"
        );

        req.data = map(&[]);
        req.string_data = map(&[]);
        assert_eq!(
            validation_message(&req),
            "either data or stringData must be provided"
        );
    }

    #[test]
    fn test_rejects_blank_data_key() {
        let mut req = request();
        req.data = map(&[(" ", "YQ==")]);
        assert_eq!(validation_message(&req), "data contains an empty key");
    }

    #[test]
    fn test_rejects_invalid_base64_naming_key() {
        let mut req = request();
        req.data = map(&[("key", "not-base64!")]);
        assert_eq!(validation_message(&req), "data[\"key\"] is not valid base64");
    }

    #[test]
    fn test_decodes_data() {
        let mut req = request();
        req.string_data = None;
        req.data = map(&[("token", "c2VjcmV0")]);

        let secret = validate_and_build(&req, &SecretTypePolicy::default()).unwrap();
        assert_eq!(secret.data.unwrap()["token"].0, b"secret".to_vec());
        assert!(secret.string_data.is_none());
    }

    #[test]
    fn test_dockerconfigjson_requires_key() {
        let mut req = request();
        req.type_ = SECRET_TYPE_DOCKER_CONFIG_JSON.into();
        assert_eq!(
            validation_message(&req),
            "dockerconfigjson secret requires \".dockerconfigjson\" key"
        );
    }

    #[test]
    fn test_dockerconfigjson_key_in_either_map() {
        let policy = SecretTypePolicy::default();

        let mut req = request();
        req.type_ = SECRET_TYPE_DOCKER_CONFIG_JSON.into();
        req.string_data = map(&[(".dockerconfigjson", "{\"auths\":{}}")]);
        assert!(validate_and_build(&req, &policy).is_ok());

        let mut req = request();
        req.type_ = SECRET_TYPE_DOCKER_CONFIG_JSON.into();
        req.string_data = None;
        req.data = map(&[(".dockerconfigjson", "eyJhdXRocyI6e319")]);
        assert!(validate_and_build(&req, &policy).is_ok());
    }

    #[test]
    fn test_caller_cannot_override_management_label() {
        let mut req = request();
        req.labels = map(&[("managed-by", "me"), ("app", "db")]);

        let secret = validate_and_build(&req, &SecretTypePolicy::default()).unwrap();
        let labels = secret.metadata.labels.unwrap();
        assert_eq!(labels["managed-by"], "kubeflow-secrets");
        assert_eq!(labels["app"], "db");
        assert_eq!(req.labels.unwrap()["managed-by"], "me");
    }

    #[test]
    fn test_secret_to_detail_encodes_and_filters_utf8() {
        let mut data = BTreeMap::new();
        data.insert("text".to_string(), ByteString(b"b".to_vec()));
        data.insert("binary".to_string(), ByteString(vec![0xff, 0xfe]));
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("db".into()),
                namespace: Some("team-a".into()),
                ..Default::default()
            },
            type_: Some("Opaque".into()),
            data: Some(data),
            ..Default::default()
        };

        let detail = secret_to_detail(&secret);
        assert_eq!(detail.data["text"], "Yg==");
        assert_eq!(detail.data["binary"], "//4=");
        assert_eq!(detail.string_data["text"], "b");
        assert!(!detail.string_data.contains_key("binary"));
        assert!(detail.labels.is_empty());
    }
}
