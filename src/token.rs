//! Bearer-token extraction from request headers

use http::header::AUTHORIZATION;
use http::HeaderMap;
use thiserror::Error;

/// The literal bearer token lifted out of an `Authorization` header
///
/// Nothing about the token has been verified; it is an opaque string until
/// [`TokenVerifier::verify`](crate::verify::TokenVerifier::verify) accepts
/// it. Raw tokens are transient and never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawToken<'a>(&'a str);

impl<'a> RawToken<'a> {
    /// The token exactly as presented by the client
    #[must_use]
    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

/// Failure to lift a bearer token out of the request headers
///
/// Each shape defect is distinguishable so the gate can report precise
/// causes. Everything except [`MissingHeader`](Self::MissingHeader)
/// classifies as a malformed header at the gate boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// No `Authorization` header was presented
    #[error("no authorization header present")]
    MissingHeader,
    /// More than one `Authorization` header was presented
    #[error("multiple authorization headers present")]
    MultipleHeaders,
    /// The header value is not valid UTF-8
    #[error("authorization header is not valid UTF-8")]
    InvalidEncoding,
    /// The scheme is not the literal `Bearer`
    #[error("authorization scheme is not 'Bearer'")]
    UnsupportedScheme,
    /// The scheme is present but no token follows it
    #[error("authorization header carries no token")]
    MissingToken,
    /// Content follows the token segment
    #[error("authorization header has content after the token")]
    TrailingContent,
}

/// Pulls the bearer token out of the request headers
///
/// Requires exactly one `Authorization` header of the form
/// `Bearer <token>`: a case-sensitive scheme literal followed by a single
/// non-empty token segment.
pub fn extract(headers: &HeaderMap) -> Result<RawToken<'_>, ExtractError> {
    let mut values = headers.get_all(AUTHORIZATION).iter();
    let value = values.next().ok_or(ExtractError::MissingHeader)?;
    if values.next().is_some() {
        return Err(ExtractError::MultipleHeaders);
    }

    let value = value.to_str().map_err(|_| ExtractError::InvalidEncoding)?;

    let mut segments = value.split_whitespace();
    match segments.next() {
        Some("Bearer") => {}
        _ => return Err(ExtractError::UnsupportedScheme),
    }

    let token = segments.next().ok_or(ExtractError::MissingToken)?;
    if segments.next().is_some() {
        return Err(ExtractError::TrailingContent);
    }

    Ok(RawToken(token))
}

#[cfg(test)]
mod tests {
    use http::HeaderValue;

    use super::*;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value.parse().unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        let headers = headers_with("Bearer abc.def.ghi");
        let token = extract(&headers).unwrap();
        assert_eq!(token.as_str(), "abc.def.ghi");
    }

    #[test]
    fn missing_header_is_distinct() {
        let headers = HeaderMap::new();
        assert_eq!(extract(&headers), Err(ExtractError::MissingHeader));
    }

    #[test]
    fn rejects_multiple_headers() {
        let mut headers = headers_with("Bearer abc");
        headers.append(AUTHORIZATION, "Bearer def".parse().unwrap());
        assert_eq!(extract(&headers), Err(ExtractError::MultipleHeaders));
    }

    #[test]
    fn rejects_basic_scheme() {
        assert_eq!(
            extract(&headers_with("Basic dXNlcjpwYXNz")),
            Err(ExtractError::UnsupportedScheme)
        );
    }

    #[test]
    fn scheme_match_is_case_sensitive() {
        assert_eq!(
            extract(&headers_with("bearer abc.def.ghi")),
            Err(ExtractError::UnsupportedScheme)
        );
    }

    #[test]
    fn rejects_missing_token_segment() {
        assert_eq!(extract(&headers_with("Bearer")), Err(ExtractError::MissingToken));
    }

    #[test]
    fn rejects_trailing_content() {
        assert_eq!(
            extract(&headers_with("Bearer abc def")),
            Err(ExtractError::TrailingContent)
        );
    }

    #[test]
    fn rejects_non_utf8_values() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_bytes(b"Bearer \xff").unwrap());
        assert_eq!(extract(&headers), Err(ExtractError::InvalidEncoding));
    }
}
