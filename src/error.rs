//! The classified authorization failure surfaced at the gate boundary

use http::StatusCode;
use thiserror::Error;

use crate::permission::PermissionError;
use crate::token::ExtractError;
use crate::verify::VerifyError;

/// A classified authorization failure
///
/// Every failure in the pipeline maps to exactly one variant with a stable
/// status code and a stable machine-readable code; distinct causes are
/// never collapsed. The calling route layer is responsible for rendering a
/// value of this type into a protocol response — this crate never writes to
/// the response itself.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No `Authorization` header was presented
    #[error("authorization header is expected")]
    MissingAuthorizationHeader,
    /// An `Authorization` header was presented but is ill-formed
    #[error("authorization header is malformed")]
    MalformedAuthorizationHeader(#[source] ExtractError),
    /// The token's header declares an unsupported algorithm, cannot be
    /// decoded, or names a key that cannot be resolved
    #[error("token header cannot be used to locate a signing key")]
    InvalidHeader(#[source] VerifyError),
    /// Cryptographic signature verification failed
    #[error("token signature verification failed")]
    InvalidSignature,
    /// The expiration claim is in the past
    #[error("token is expired")]
    Expired,
    /// The issuer claim does not match the trusted issuer
    #[error("token issuer is not trusted")]
    InvalidIssuer,
    /// The audience claim does not satisfy the expected audience
    #[error("token audience does not match the expected audience")]
    InvalidAudience,
    /// The token carries no permissions claim at all
    ///
    /// A provider/configuration mismatch rather than an access decision,
    /// which is why it reports as a server-side failure.
    #[error("token carries no permissions claim; provider permissions are not configured")]
    PermissionsClaimMissing,
    /// The permissions claim is present but the required permission is not
    #[error("permission '{required}' is required")]
    PermissionDenied {
        /// The permission string the operation required
        required: String,
    },
    /// The provider's key set could not be fetched or the fetch timed out
    #[error("identity provider key set is unavailable")]
    ProviderUnavailable(#[source] reqwest::Error),
}

impl AuthError {
    /// The stable status code for this failure
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingAuthorizationHeader
            | Self::MalformedAuthorizationHeader(_)
            | Self::InvalidHeader(_)
            | Self::InvalidSignature
            | Self::Expired
            | Self::InvalidIssuer
            | Self::InvalidAudience => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            Self::PermissionsClaimMissing => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// The stable machine-readable code for this failure
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingAuthorizationHeader => "authorization_header_missing",
            Self::MalformedAuthorizationHeader(_) => "authorization_header_malformed",
            Self::InvalidHeader(_) => "invalid_header",
            Self::InvalidSignature => "invalid_signature",
            Self::Expired => "token_expired",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidAudience => "invalid_audience",
            Self::PermissionsClaimMissing => "permissions_claim_missing",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::ProviderUnavailable(_) => "provider_unavailable",
        }
    }
}

impl From<ExtractError> for AuthError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::MissingHeader => Self::MissingAuthorizationHeader,
            other => Self::MalformedAuthorizationHeader(other),
        }
    }
}

impl From<VerifyError> for AuthError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::InvalidSignature => Self::InvalidSignature,
            VerifyError::Expired => Self::Expired,
            VerifyError::InvalidIssuer => Self::InvalidIssuer,
            VerifyError::InvalidAudience => Self::InvalidAudience,
            VerifyError::ProviderUnavailable(source) => Self::ProviderUnavailable(source),
            other => Self::InvalidHeader(other),
        }
    }
}

impl From<PermissionError> for AuthError {
    fn from(err: PermissionError) -> Self {
        match err {
            PermissionError::MissingPermissionsClaim => Self::PermissionsClaimMissing,
            PermissionError::Denied { required } => Self::PermissionDenied { required },
        }
    }
}
