//! The provider's published signing keys
//!
//! Only RSA signing keys are representable; entries in the published set
//! that lack the required members (encryption keys, elliptic-curve keys,
//! malformed entries) are skipped during deserialization rather than
//! failing the whole set.

use serde::{Deserialize, Serialize};

/// A single RSA public signing key published by the identity provider
///
/// Immutable once fetched; keys are replaced wholesale when the containing
/// [`Jwks`] is refreshed, never mutated in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key identifier, unique within the published set
    pub kid: String,
    /// Key type (`RSA` for every key this crate can use)
    pub kty: String,
    /// Algorithm the provider intends the key for, if declared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Key use designation (`sig` for signing keys)
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    /// RSA public modulus, base64url-encoded
    pub n: String,
    /// RSA public exponent, base64url-encoded
    pub e: String,
}

/// A JSON Web Key Set (JWKS)
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    #[serde(deserialize_with = "deserialize_keys")]
    keys: Vec<Jwk>,
}

impl Jwks {
    /// Adds a key to the set
    pub fn add_key(&mut self, key: Jwk) {
        self.keys.push(key);
    }

    /// A view of the keys in this set
    #[must_use]
    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    /// Finds the signing key with the given key identifier
    ///
    /// Keys designated for a use other than signing are never returned,
    /// even on a key id match.
    #[must_use]
    pub fn get_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys
            .iter()
            .find(|k| k.kid == kid && k.usage.as_deref().map_or(true, |u| u == "sig"))
    }
}

fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<Jwk>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MaybeJwk {
        Jwk(Jwk),
        Unusable(UnusableKey),
    }

    #[derive(Deserialize)]
    struct UnusableKey {
        #[serde(default)]
        kid: Option<String>,
        #[serde(rename = "use", default)]
        usage: Option<String>,
        #[serde(default)]
        alg: Option<String>,
    }

    let keys = Vec::<MaybeJwk>::deserialize(deserializer)?;

    Ok(keys
        .into_iter()
        .filter_map(|key| match key {
            MaybeJwk::Jwk(jwk) => Some(jwk),
            MaybeJwk::Unusable(key) => {
                tracing::warn!(
                    jwk.kid = ?key.kid,
                    "jwk.use" = ?key.usage,
                    jwk.alg = ?key.alg,
                    "ignoring unusable JWK"
                );
                None
            }
        })
        .collect())
}
