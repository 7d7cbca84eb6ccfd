//! Trusted identity extraction
//!
//! The gateway sits behind an authenticating proxy that injects the caller's
//! identity into request headers. This module turns those headers into a
//! [`Identity`]; it never calls out anywhere.

use std::collections::BTreeSet;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Caller identity derived from trusted headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Primary user name, non-empty after trimming
    pub username: String,
    /// Sorted, de-duplicated group names
    pub groups: Vec<String>,
}

/// Reads identity from the configured user and groups headers
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    user_header: HeaderName,
    groups_header: HeaderName,
}

impl IdentityExtractor {
    /// Create an extractor for the given header names.
    ///
    /// Header lookups are case-insensitive because `HeaderName` is always
    /// stored lower-cased.
    pub fn new(user_header: HeaderName, groups_header: HeaderName) -> Self {
        Self {
            user_header,
            groups_header,
        }
    }

    /// Name of the trusted user header
    pub fn user_header(&self) -> &HeaderName {
        &self.user_header
    }

    /// Extract the caller identity.
    ///
    /// Fails with [`Error::Unauthorized`] naming the header when the user
    /// header is absent or blank, or when either header is not UTF-8.
    pub fn extract(&self, headers: &HeaderMap) -> Result<Identity> {
        let username = match headers.get(&self.user_header) {
            Some(value) => header_text(&self.user_header, value)?.trim(),
            None => "",
        };
        if username.is_empty() {
            return Err(Error::Unauthorized(format!(
                "missing {} header",
                self.user_header
            )));
        }

        let groups = headers
            .get_all(&self.groups_header)
            .iter()
            .map(|value| header_text(&self.groups_header, value))
            .collect::<Result<Vec<_>>>()?;

        Ok(Identity {
            username: username.to_string(),
            groups: normalize_groups(groups),
        })
    }
}

/// Header value as UTF-8 text; `HeaderValue::to_str` would reject non-ASCII
fn header_text<'a>(name: &HeaderName, value: &'a HeaderValue) -> Result<&'a str> {
    std::str::from_utf8(value.as_bytes())
        .map_err(|_| Error::Unauthorized(format!("invalid {name} header")))
}

/// Split comma-separated group values from every header occurrence, then
/// trim, de-duplicate and sort them.
///
/// Sorting keeps impersonation requests and log lines reproducible.
pub fn normalize_groups<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    values
        .into_iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
