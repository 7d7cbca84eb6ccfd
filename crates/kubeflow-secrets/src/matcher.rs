//! Identity matching across identity-provider formats
//!
//! Upstream identity providers do not agree on how a user is spelled.
//! One may send `alice@example.com`, another `ldap:alice@example.com` or
//! `oidc|alice@example.com`, while the Profile owner field holds whichever
//! form the profile controller was given.
//!
//! Matching is a bounded relaxation, not cryptographic identity: two values
//! match when their [`IdentityCandidates`] intersect. The accepted separators
//! live in [`IDENTITY_SEPARATORS`]. Changing that list widens or narrows who
//! can act on a namespace and needs a security review.

use std::collections::BTreeSet;
use std::fmt;

/// Separators after which the trailing segment is also a candidate.
///
/// Only the segment after the *last* occurrence of each separator is taken.
pub const IDENTITY_SEPARATORS: [char; 3] = [':', '|', '#'];

/// Canonical form of an identity string: trimmed, unquoted, lower-cased.
pub fn normalize_identity(raw: &str) -> String {
    raw.trim().trim_matches('"').trim().to_lowercase()
}

/// The set of normalized strings an identity may be matched under
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCandidates(BTreeSet<String>);

impl IdentityCandidates {
    /// Build the candidate set for a raw identity string.
    ///
    /// An identity that normalizes to the empty string has no candidates
    /// and therefore never matches anything.
    pub fn new(raw: &str) -> Self {
        let normalized = normalize_identity(raw);
        let mut set = BTreeSet::new();
        if normalized.is_empty() {
            return Self(set);
        }

        for sep in IDENTITY_SEPARATORS {
            if let Some(idx) = normalized.rfind(sep) {
                let suffix = normalized[idx + sep.len_utf8()..].trim();
                if !suffix.is_empty() {
                    set.insert(suffix.to_string());
                }
            }
        }
        set.insert(normalized);

        Self(set)
    }

    /// True when the two sets share at least one candidate
    pub fn matches(&self, other: &IdentityCandidates) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    /// True when there is nothing to match on
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the candidates in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl fmt::Display for IdentityCandidates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        write!(f, "{}", joined.join(","))
    }
}

/// Whether two raw identity strings denote the same principal
pub fn identities_equal(a: &str, b: &str) -> bool {
    IdentityCandidates::new(a).matches(&IdentityCandidates::new(b))
}
