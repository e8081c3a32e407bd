//! The composed authorization gate

use std::time::Duration;

use http::HeaderMap;
use jsonwebtoken::Algorithm;
use thiserror::Error;

use crate::claims::VerifiedClaims;
use crate::directory::KeyDirectory;
use crate::error::AuthError;
use crate::jwks::Jwks;
use crate::permission;
use crate::token;
use crate::verify::{AudiencePolicy, TokenVerifier};

/// The composed entry point protected operations call before executing
/// their own logic
///
/// `Authority` orchestrates extraction, verification, and the permission
/// check in a fixed order, short-circuiting on the first failure. Handlers
/// never invoke the lower components directly, so the verification order
/// and fail-fast behavior hold uniformly across every protected operation.
///
/// Cloning is cheap; clones share the underlying key directory cache.
#[derive(Clone, Debug)]
#[must_use]
pub struct Authority {
    verifier: TokenVerifier,
}

impl Authority {
    /// Starts building an authority
    pub fn builder() -> AuthorityBuilder {
        AuthorityBuilder::new()
    }

    /// Constructs an authority directly over a configured verifier
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }

    /// The key directory backing this authority
    pub fn key_directory(&self) -> &KeyDirectory {
        self.verifier.key_directory()
    }

    /// Authorizes one request: extraction, verification, permission check
    ///
    /// Yields the verified claim set on success. Every failure is raised as
    /// a single classified [`AuthError`]; no failure is fatal beyond the
    /// one request being authorized.
    #[tracing::instrument(skip(self, headers))]
    pub async fn authorize(
        &self,
        headers: &HeaderMap,
        required_permission: &str,
    ) -> Result<VerifiedClaims, AuthError> {
        let raw = token::extract(headers)?;
        let claims = self.verifier.verify(&raw).await?;
        permission::require_permission(&claims, required_permission)?;

        tracing::debug!(jwt.sub = %claims.sub, "request authorized");
        Ok(claims)
    }
}

/// Invalid gate configuration
#[derive(Debug, Error)]
pub enum BuildError {
    /// No trusted issuer was configured
    #[error("no trusted issuer configured")]
    MissingIssuer,
    /// No expected audience was configured
    #[error("no expected audience configured")]
    MissingAudience,
    /// Neither a JWKS URL nor a local key set was configured
    #[error("no JWKS URL or local key set configured")]
    MissingKeySource,
    /// Both a JWKS URL and a local key set were configured
    #[error("both a JWKS URL and a local key set configured")]
    ConflictingKeySources,
    /// A symmetric algorithm was configured
    #[error("symmetric signing algorithms are not allowed")]
    SymmetricAlgorithm,
    /// The HTTP client for the remote key directory failed to build
    #[error("failed to construct the HTTP client")]
    HttpClient(#[source] reqwest::Error),
}

/// Configuration surface for an [`Authority`]
///
/// The surrounding process supplies these values at startup: the provider's
/// key-set location, the trusted issuer, the expected audience, and the
/// single allowed asymmetric algorithm.
#[derive(Debug)]
#[must_use]
pub struct AuthorityBuilder {
    jwks_url: Option<String>,
    local_keys: Option<Jwks>,
    issuer: Option<String>,
    audience: Option<String>,
    audience_policy: AudiencePolicy,
    algorithm: Algorithm,
    refresh_ttl: Duration,
    http_timeout: Duration,
}

impl Default for AuthorityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorityBuilder {
    /// Constructs a builder with RS256, a 10-minute key refresh TTL, and a
    /// 10-second fetch timeout
    pub fn new() -> Self {
        Self {
            jwks_url: None,
            local_keys: None,
            issuer: None,
            audience: None,
            audience_policy: AudiencePolicy::default(),
            algorithm: Algorithm::RS256,
            refresh_ttl: Duration::from_secs(600),
            http_timeout: Duration::from_secs(10),
        }
    }

    /// Points the authority at a provider domain
    ///
    /// Derives the key-set URL `https://{domain}/.well-known/jwks.json` and,
    /// unless one was already set, the issuer `https://{domain}/`.
    pub fn provider_domain(mut self, domain: &str) -> Self {
        self.jwks_url = Some(format!("https://{domain}/.well-known/jwks.json"));
        if self.issuer.is_none() {
            self.issuer = Some(format!("https://{domain}/"));
        }
        self
    }

    /// Sets the provider's key-set endpoint explicitly
    pub fn jwks_url(mut self, url: impl Into<String>) -> Self {
        self.jwks_url = Some(url.into());
        self
    }

    /// Supplies a fixed local key set instead of a remote endpoint
    pub fn local_keys(mut self, jwks: Jwks) -> Self {
        self.local_keys = Some(jwks);
        self
    }

    /// Sets the trusted issuer tokens must name exactly
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Sets the audience value tokens must be issued for
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Sets how the expected audience is matched against multi-audience
    /// tokens
    pub fn audience_policy(mut self, policy: AudiencePolicy) -> Self {
        self.audience_policy = policy;
        self
    }

    /// Sets the single allowed asymmetric signing algorithm
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets how long a fetched key set stays fresh
    pub fn refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Sets the timeout applied to each key-set fetch
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Builds the authority
    ///
    /// No network activity occurs here; a remote key directory fetches on
    /// first use.
    pub fn build(self) -> Result<Authority, BuildError> {
        if matches!(
            self.algorithm,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(BuildError::SymmetricAlgorithm);
        }

        let issuer = self.issuer.ok_or(BuildError::MissingIssuer)?;
        let audience = self.audience.ok_or(BuildError::MissingAudience)?;

        let directory = match (self.local_keys, self.jwks_url) {
            (Some(jwks), None) => KeyDirectory::new(jwks),
            (None, Some(url)) => KeyDirectory::remote(url, self.refresh_ttl, self.http_timeout)
                .map_err(BuildError::HttpClient)?,
            (Some(_), Some(_)) => return Err(BuildError::ConflictingKeySources),
            (None, None) => return Err(BuildError::MissingKeySource),
        };

        let verifier = TokenVerifier::new(directory, issuer, audience)
            .with_algorithm(self.algorithm)
            .with_audience_policy(self.audience_policy);

        Ok(Authority::new(verifier))
    }
}
