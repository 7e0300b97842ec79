//! Container-tag parsing.
//!
//! A container tag is `{prefix}_{scope}_{hash}`. The engine treats it as
//! opaque apart from this split rule. Malformed tags fall back to
//! `scope=user, hash=whole-string` for backwards compatibility; the admin
//! API rejects them on write instead.

use serde::{Deserialize, Serialize};

use crate::memory::Scope;

/// A container tag split into its routing components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerTag {
    pub scope: Scope,
    pub hash: String,
}

impl ContainerTag {
    /// Split a raw tag into `(scope, hash)`.
    ///
    /// The prefix segment is not validated against config here; the split
    /// only requires three `_`-separated parts with a recognized scope in
    /// the middle. Everything after the scope segment is the hash, so
    /// hashes may themselves contain underscores.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, '_');
        let prefix = parts.next().unwrap_or_default();
        let scope = parts.next().and_then(Scope::parse);
        let hash = parts.next();

        match (scope, hash) {
            (Some(scope), Some(hash)) if !prefix.is_empty() && !hash.is_empty() => Self {
                scope,
                hash: hash.to_string(),
            },
            _ => Self {
                scope: Scope::User,
                hash: raw.to_string(),
            },
        }
    }

    /// Whether a raw tag is well-formed under the given prefix.
    pub fn is_well_formed(raw: &str, prefix: &str) -> bool {
        let rest = match raw.strip_prefix(prefix) {
            Some(rest) => rest,
            None => return false,
        };
        let mut parts = rest.strip_prefix('_').unwrap_or("").splitn(2, '_');
        let scope_ok = parts.next().and_then(Scope::parse).is_some();
        let hash_ok = parts.next().is_some_and(|h| !h.is_empty());
        scope_ok && hash_ok
    }

    /// Assemble a tag from its components.
    pub fn format(prefix: &str, scope: Scope, hash: &str) -> String {
        format!("{prefix}_{scope}_{hash}")
    }
}
