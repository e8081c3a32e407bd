//! Permission claims and the permission gate

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::claims::VerifiedClaims;

/// A set of opaque permission strings granted by the identity provider
///
/// Permission strings are capability identifiers such as `get:items`; their
/// presence in a verified token's permission claim authorizes the matching
/// operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    /// Produces an empty permission set
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Adds a permission to the set
    pub fn insert(&mut self, permission: impl Into<String>) {
        self.0.insert(permission.into());
    }

    /// Whether the set contains exactly the given permission string
    #[must_use]
    pub fn contains(&self, permission: &str) -> bool {
        self.0.contains(permission)
    }

    /// Iterates the permissions in this set
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The number of permissions in the set
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set holds no permissions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>> Extend<S> for PermissionSet {
    fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
        self.0.extend(iter.into_iter().map(Into::into));
    }
}

/// Denial by the permission gate
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PermissionError {
    /// The verified claims carry no permissions claim at all
    ///
    /// Distinct from a denial: it usually means the provider was never
    /// configured to attach fine-grained permissions, which is a deployment
    /// mismatch rather than a legitimate access decision.
    #[error("token carries no permissions claim")]
    MissingPermissionsClaim,
    /// The claim is present but does not grant the required permission
    #[error("required permission '{required}' not granted")]
    Denied {
        /// The permission string the operation required
        required: String,
    },
}

/// Confirms the verified claims grant the required permission
///
/// Matching is exact; there is no prefix or wildcard expansion.
pub fn require_permission(
    claims: &VerifiedClaims,
    permission: &str,
) -> Result<(), PermissionError> {
    let granted = claims
        .permissions
        .as_ref()
        .ok_or(PermissionError::MissingPermissionsClaim)?;

    if granted.contains(permission) {
        Ok(())
    } else {
        tracing::debug!(
            jwt.sub = %claims.sub,
            permission,
            "permission not present in token claims"
        );
        Err(PermissionError::Denied {
            required: permission.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::claims::Audiences;

    use super::*;

    fn claims_with(permissions: Option<PermissionSet>) -> VerifiedClaims {
        VerifiedClaims {
            sub: "auth0|alice".to_owned(),
            iss: "https://issuer.example.com/".to_owned(),
            aud: Audiences::single("https://api.example.com"),
            exp: 4102444800,
            iat: None,
            permissions,
        }
    }

    #[test]
    fn grants_exact_permission() {
        let claims = claims_with(Some(["get:items", "post:items"].into_iter().collect()));
        assert!(require_permission(&claims, "get:items").is_ok());
    }

    #[test]
    fn denies_absent_permission() {
        let claims = claims_with(Some(["get:items"].into_iter().collect()));
        assert_eq!(
            require_permission(&claims, "post:items"),
            Err(PermissionError::Denied {
                required: "post:items".to_owned()
            })
        );
    }

    #[test]
    fn missing_claim_is_distinct_from_denial() {
        let claims = claims_with(None);
        assert_eq!(
            require_permission(&claims, "get:items"),
            Err(PermissionError::MissingPermissionsClaim)
        );
    }

    #[test]
    fn empty_claim_denies_rather_than_erroring() {
        let claims = claims_with(Some(PermissionSet::new()));
        assert!(matches!(
            require_permission(&claims, "get:items"),
            Err(PermissionError::Denied { .. })
        ));
    }

    #[test]
    fn no_prefix_or_wildcard_matching() {
        let claims = claims_with(Some(["get:items:all"].into_iter().collect()));
        assert!(matches!(
            require_permission(&claims, "get:items"),
            Err(PermissionError::Denied { .. })
        ));
    }
}
