//! Claim types produced by successful verification

use serde::{Deserialize, Serialize};

use crate::permission::PermissionSet;

/// The audience claim of a token, which may carry one or many values
///
/// Providers serialize a single audience as a bare string and multiple
/// audiences as an array; both forms deserialize into this type.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AudiencesDto", into = "AudiencesDto")]
pub struct Audiences(Vec<String>);

impl Audiences {
    /// An audience claim holding a single value
    pub fn single(audience: impl Into<String>) -> Self {
        Self(vec![audience.into()])
    }

    /// Whether the claim contains the given audience value
    #[must_use]
    pub fn contains(&self, audience: &str) -> bool {
        self.0.iter().any(|a| a == audience)
    }

    /// The number of audience values in the claim
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the claim carries no audience values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates the audience values
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Audiences {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum AudiencesDto {
    One(String),
    Many(Vec<String>),
}

impl From<AudiencesDto> for Audiences {
    fn from(dto: AudiencesDto) -> Self {
        match dto {
            AudiencesDto::One(aud) => Self(vec![aud]),
            AudiencesDto::Many(auds) => Self(auds),
        }
    }
}

impl From<Audiences> for AudiencesDto {
    fn from(aud: Audiences) -> Self {
        let mut values = aud.0;
        if values.len() == 1 {
            Self::One(values.remove(0))
        } else {
            Self::Many(values)
        }
    }
}

/// The decoded payload of a token that passed signature and claim checks
///
/// This is the only trusted output of the authorization pipeline. A value
/// of this type is handed to the caller exclusively after signature
/// verification, the expiration check, the issuer/audience checks, and the
/// permission check have all succeeded; partial success is not
/// representable.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct VerifiedClaims {
    /// Subject identifier of the token's holder
    pub sub: String,
    /// Issuer that signed the token
    pub iss: String,
    /// Audience value(s) the token was issued for
    #[serde(default)]
    pub aud: Audiences,
    /// Expiration instant, in seconds since the Unix epoch
    pub exp: u64,
    /// Issued-at instant, in seconds since the Unix epoch
    #[serde(default)]
    pub iat: Option<u64>,
    /// Permission strings the provider attached to the token, if the
    /// provider is configured to issue them
    #[serde(default)]
    pub permissions: Option<PermissionSet>,
}
