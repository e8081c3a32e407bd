//! Token verification against the provider's signing keys

use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

use crate::claims::{Audiences, VerifiedClaims};
use crate::directory::{DirectoryError, KeyDirectory};
use crate::permission::PermissionSet;
use crate::token::RawToken;

/// How the expected audience is matched against the token's audience claim
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AudiencePolicy {
    /// The token's audience list must contain the expected value
    ///
    /// This is the default and matches the common provider convention of
    /// issuing tokens with additional audiences alongside the API's own.
    #[default]
    AnyOf,
    /// The token's audience claim must be exactly the expected value and
    /// nothing else
    Exact,
}

/// Failure to verify a token
#[derive(Debug, Error)]
pub enum VerifyError {
    /// The token declares an algorithm outside the allow-list
    ///
    /// Symmetric algorithms are always rejected here; accepting them would
    /// let a client forge tokens using the public key material as an HMAC
    /// secret.
    #[error("token declares disallowed signing algorithm {0:?}")]
    DisallowedAlgorithm(Algorithm),
    /// The token's header segment could not be decoded
    ///
    /// Tokens declaring the unsigned `none` algorithm land here as well,
    /// since the allow-list only ever names real signature algorithms.
    #[error("token header could not be decoded")]
    MalformedHeader(#[source] jsonwebtoken::errors::Error),
    /// The token's header names no key identifier
    #[error("token header carries no key id")]
    MissingKeyId,
    /// No signing key matched the token's key id, even after a forced
    /// key-set refresh
    #[error("no signing key matches key id '{0}' after refresh")]
    UnknownKeyId(String),
    /// The resolved key's material could not be used for verification
    #[error("signing key '{kid}' has unusable key material")]
    UnusableKey {
        /// Identifier of the defective key
        kid: String,
        /// Underlying decoding failure
        #[source]
        source: jsonwebtoken::errors::Error,
    },
    /// The signature does not verify against the resolved key
    #[error("token signature verification failed")]
    InvalidSignature,
    /// The expiration claim is absent or not strictly in the future
    ///
    /// A token whose expiration equals the current second is already
    /// rejected.
    #[error("token is expired")]
    Expired,
    /// The issuer claim does not match the trusted issuer
    #[error("token issuer is not the trusted issuer")]
    InvalidIssuer,
    /// The audience claim does not satisfy the expected audience
    #[error("token audience does not satisfy the expected audience")]
    InvalidAudience,
    /// The payload could not be decoded after the signature verified
    #[error("token payload rejected")]
    MalformedClaims(#[source] jsonwebtoken::errors::Error),
    /// The provider's key set could not be fetched
    #[error("failed to fetch the provider key set")]
    ProviderUnavailable(#[source] reqwest::Error),
}

impl From<DirectoryError> for VerifyError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::KeyNotFound(kid) => Self::UnknownKeyId(kid),
            DirectoryError::ProviderUnavailable(source) => Self::ProviderUnavailable(source),
        }
    }
}

/// Verifies raw bearer tokens into [`VerifiedClaims`]
///
/// Signature verification always precedes claim validation: no claim value
/// is examined until the token is proven to have been signed by a key the
/// provider published. The decoded header is used solely to select the
/// verification key.
#[derive(Clone, Debug)]
pub struct TokenVerifier {
    directory: KeyDirectory,
    algorithm: Algorithm,
    issuer: String,
    audience: String,
    audience_policy: AudiencePolicy,
}

impl TokenVerifier {
    /// Constructs a verifier trusting tokens signed via the given key
    /// directory for the given issuer and audience
    ///
    /// The allowed algorithm defaults to RS256 and the audience policy to
    /// [`AudiencePolicy::AnyOf`].
    pub fn new(
        directory: KeyDirectory,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            algorithm: Algorithm::RS256,
            issuer: issuer.into(),
            audience: audience.into(),
            audience_policy: AudiencePolicy::default(),
        }
    }

    /// Replaces the single allowed signing algorithm
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Replaces the audience matching policy
    #[must_use]
    pub fn with_audience_policy(mut self, policy: AudiencePolicy) -> Self {
        self.audience_policy = policy;
        self
    }

    /// The key directory this verifier resolves signing keys through
    pub fn key_directory(&self) -> &KeyDirectory {
        &self.directory
    }

    /// Verifies the token's signature and validates its claims
    ///
    /// An unknown key id triggers exactly one forced key-set refresh before
    /// failing, which covers legitimate provider-side key rotation. Any
    /// single failing step aborts the whole call; no partially verified
    /// claims are ever returned.
    pub async fn verify(&self, token: &RawToken<'_>) -> Result<VerifiedClaims, VerifyError> {
        let header =
            jsonwebtoken::decode_header(token.as_str()).map_err(VerifyError::MalformedHeader)?;

        if header.alg != self.algorithm {
            return Err(VerifyError::DisallowedAlgorithm(header.alg));
        }
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;

        let key = match self.directory.resolve(&kid).await {
            Ok(key) => key,
            Err(DirectoryError::KeyNotFound(_)) => {
                tracing::debug!(jwt.kid = %kid, "key id unknown; forcing key set refresh");
                self.directory.refresh().await?;
                self.directory.resolve(&kid).await?
            }
            Err(err) => return Err(err.into()),
        };

        let decoding_key =
            DecodingKey::from_rsa_components(&key.n, &key.e).map_err(|source| {
                VerifyError::UnusableKey {
                    kid: kid.clone(),
                    source,
                }
            })?;

        let mut validation = Validation::new(self.algorithm);
        // The expiration and audience checks are finished below over the
        // decoded claims: jsonwebtoken's exp boundary is one second looser
        // than this gate's, and the audience policy is configurable.
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.set_issuer(&[&self.issuer]);

        let data = jsonwebtoken::decode::<ClaimsDto>(token.as_str(), &decoding_key, &validation)
            .map_err(classify_decode_error)?;
        let dto = data.claims;

        // A token that never carries the claim cannot satisfy the check the
        // claim exists for. jsonwebtoken still accepts an expiration equal
        // to the current second; the instant must be strictly in the future.
        let exp = dto.exp.ok_or(VerifyError::Expired)?;
        if exp <= unix_now() {
            return Err(VerifyError::Expired);
        }
        let iss = dto.iss.ok_or(VerifyError::InvalidIssuer)?;

        let audience_ok = match self.audience_policy {
            AudiencePolicy::AnyOf => dto.aud.contains(&self.audience),
            AudiencePolicy::Exact => dto.aud.len() == 1 && dto.aud.contains(&self.audience),
        };
        if !audience_ok {
            return Err(VerifyError::InvalidAudience);
        }

        let claims = VerifiedClaims {
            sub: dto.sub,
            iss,
            aud: dto.aud,
            exp,
            iat: dto.iat,
            permissions: dto.permissions,
        };

        tracing::trace!(jwt.sub = %claims.sub, jwt.kid = %kid, "token verified");
        Ok(claims)
    }
}

/// Wire form of the payload, decoded only after the signature verified
///
/// The registered claim fields are optional here so that their absence
/// classifies as the failure of the check they exist for rather than as a
/// decoding failure.
#[derive(Debug, Deserialize)]
struct ClaimsDto {
    sub: String,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Audiences,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    permissions: Option<PermissionSet>,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

fn classify_decode_error(err: jsonwebtoken::errors::Error) -> VerifyError {
    match err.kind() {
        ErrorKind::InvalidSignature => return VerifyError::InvalidSignature,
        ErrorKind::ExpiredSignature => return VerifyError::Expired,
        ErrorKind::InvalidIssuer => return VerifyError::InvalidIssuer,
        ErrorKind::InvalidAudience => return VerifyError::InvalidAudience,
        // jsonwebtoken reports these itself when its own validator notices
        // the absence first; the classification matches the explicit checks
        // in `verify`.
        ErrorKind::MissingRequiredClaim(claim) if claim.as_str() == "exp" => {
            return VerifyError::Expired
        }
        ErrorKind::MissingRequiredClaim(claim) if claim.as_str() == "iss" => {
            return VerifyError::InvalidIssuer
        }
        _ => {}
    }

    VerifyError::MalformedClaims(err)
}
