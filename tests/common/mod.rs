#![allow(dead_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use http::header::AUTHORIZATION;
use http::HeaderMap;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use openssl::rsa::Rsa;
use serde::Serialize;
use tokengate::{Authority, Jwk, Jwks};

pub const ISSUER: &str = "https://issuer.example.com/";
pub const AUDIENCE: &str = "https://api.example.com";

pub struct SigningKey {
    pub kid: &'static str,
    pub encoding: EncodingKey,
    pub jwk: Jwk,
}

pub fn generate_key(kid: &'static str) -> SigningKey {
    let rsa = Rsa::generate(2048).unwrap();
    let pem = rsa.private_key_to_pem().unwrap();

    SigningKey {
        kid,
        encoding: EncodingKey::from_rsa_pem(&pem).unwrap(),
        jwk: Jwk {
            kid: kid.to_owned(),
            kty: "RSA".to_owned(),
            alg: Some("RS256".to_owned()),
            usage: Some("sig".to_owned()),
            n: URL_SAFE_NO_PAD.encode(rsa.n().to_vec()),
            e: URL_SAFE_NO_PAD.encode(rsa.e().to_vec()),
        },
    }
}

pub fn jwks_of(keys: &[&SigningKey]) -> Jwks {
    let mut jwks = Jwks::default();
    for key in keys {
        jwks.add_key(key.jwk.clone());
    }
    jwks
}

#[derive(Serialize)]
pub struct TokenClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    pub exp: u64,
    pub iat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn standard_claims(permissions: &[&str]) -> TokenClaims {
    TokenClaims {
        sub: "auth0|alice".to_owned(),
        iss: ISSUER.to_owned(),
        aud: vec![AUDIENCE.to_owned()],
        exp: now() + 300,
        iat: now(),
        permissions: Some(permissions.iter().map(|p| (*p).to_owned()).collect()),
    }
}

pub fn sign(key: &SigningKey, claims: &impl Serialize) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(key.kid.to_owned());
    jsonwebtoken::encode(&header, claims, &key.encoding).unwrap()
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
    headers
}

pub fn authority_for(key: &SigningKey) -> Authority {
    Authority::builder()
        .local_keys(jwks_of(&[key]))
        .issuer(ISSUER)
        .audience(AUDIENCE)
        .build()
        .unwrap()
}
