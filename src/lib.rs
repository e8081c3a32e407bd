//! Bearer-token authorization against a remote identity provider.
//!
//! An [`Authority`] is the single entry point protected operations call
//! before running their own logic. It pulls the bearer token out of the
//! request's `Authorization` header, verifies the token's signature against
//! the provider's published JSON Web Key Set (JWKS), validates the
//! time-based and issuer/audience claims, and confirms the caller holds a
//! required permission. The only trusted output is a [`VerifiedClaims`]
//! value; every failure surfaces as a classified [`AuthError`] with a stable
//! status code.
//!
//! The provider's signing keys are cached per process and replaced
//! wholesale on refresh, so concurrent authorizations never observe a
//! partially updated key set. An unknown key id triggers exactly one forced
//! refresh to tolerate provider-side key rotation.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokengate::Authority;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let authority = Authority::builder()
//!     .provider_domain("tenant.example.auth0.com")
//!     .audience("https://api.example.com")
//!     .refresh_ttl(Duration::from_secs(600))
//!     .build()?;
//!
//! # let headers = http::HeaderMap::new();
//! let claims = authority.authorize(&headers, "get:items").await?;
//! println!("authorized subject {}", claims.sub);
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_must_use
)]

mod authority;
pub mod claims;
pub mod directory;
pub mod error;
pub mod jwks;
pub mod permission;
pub mod token;
pub mod verify;

pub use authority::{Authority, AuthorityBuilder, BuildError};
pub use claims::{Audiences, VerifiedClaims};
pub use directory::KeyDirectory;
pub use error::AuthError;
pub use jwks::{Jwk, Jwks};
pub use permission::PermissionSet;
pub use verify::{AudiencePolicy, TokenVerifier};
