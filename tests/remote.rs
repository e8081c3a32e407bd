//! Key directory behavior against a remote JWKS endpoint

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use http::StatusCode;
use tokengate::directory::DirectoryError;
use tokengate::{AuthError, Authority, KeyDirectory};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use common::*;

/// Serves each body once, in order, as an HTTP/1.1 JSON response, then stops
/// accepting connections.
async fn serve_bodies(bodies: Vec<String>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        for body in bodies {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            // These requests are tiny; a single read is enough.
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;

            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    addr
}

/// Serves the body once with an `ETag`, then answers `304 Not Modified` to
/// every request presenting that tag and `500` to any request that fails to
/// present it.
async fn serve_revalidating(body: String, etag: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut served_body = false;
        loop {
            let (mut stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            let mut buf = [0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buf[..n]).to_ascii_lowercase();

            let response = if !served_body {
                served_body = true;
                format!(
                    "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\netag: {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    etag,
                    body.len(),
                    body
                )
            } else if request.contains(&format!("if-none-match: {etag}")) {
                "HTTP/1.1 304 Not Modified\r\nconnection: close\r\n\r\n".to_owned()
            } else {
                "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
                    .to_owned()
            };
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });

    addr
}

fn jwks_body(keys: &[&SigningKey]) -> String {
    serde_json::to_string(&jwks_of(keys)).unwrap()
}

#[tokio::test]
async fn first_resolve_fetches_and_caches() {
    let key = generate_key("remote-1");
    let addr = serve_bodies(vec![jwks_body(&[&key])]).await;

    let directory = KeyDirectory::remote(
        format!("http://{addr}/.well-known/jwks.json"),
        Duration::from_secs(300),
        Duration::from_secs(5),
    )
    .unwrap();

    assert_eq!(directory.resolve("remote-1").await.unwrap().kid, "remote-1");

    // The server has no second body to give; success here proves the
    // second resolution was served from the cache.
    assert_eq!(directory.resolve("remote-1").await.unwrap().kid, "remote-1");
}

#[tokio::test]
async fn stale_cache_is_refetched() {
    let key = generate_key("remote-1");
    let addr = serve_bodies(vec![jwks_body(&[&key]), jwks_body(&[&key])]).await;

    let directory = KeyDirectory::remote(
        format!("http://{addr}/.well-known/jwks.json"),
        Duration::ZERO,
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(directory.resolve("remote-1").await.is_ok());
    assert!(directory.resolve("remote-1").await.is_ok());
}

#[tokio::test]
async fn not_modified_revalidation_retains_cached_keys() {
    let key = generate_key("revalidated");
    let addr = serve_revalidating(jwks_body(&[&key]), "\"v1\"").await;

    // A zero TTL makes every resolution revalidate against the endpoint.
    let directory = KeyDirectory::remote(
        format!("http://{addr}/.well-known/jwks.json"),
        Duration::ZERO,
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(directory.resolve("revalidated").await.is_ok());

    // The server only ever answers 304 from here on; the key must keep
    // resolving out of the retained cached set.
    assert!(directory.resolve("revalidated").await.is_ok());
    assert!(directory.resolve("revalidated").await.is_ok());
}

#[tokio::test]
async fn forced_refresh_covers_key_rotation() {
    let key1 = generate_key("rotation-1");
    let key2 = generate_key("rotation-2");
    let addr = serve_bodies(vec![
        jwks_body(&[&key1]),
        jwks_body(&[&key1, &key2]),
    ])
    .await;

    let authority = Authority::builder()
        .jwks_url(format!("http://{addr}/.well-known/jwks.json"))
        .issuer(ISSUER)
        .audience(AUDIENCE)
        .refresh_ttl(Duration::from_secs(3600))
        .build()
        .unwrap();

    // The first fetch sees only the old key; the newly rotated-in signing
    // key is found through the single forced refresh.
    let token = sign(&key2, &standard_claims(&["get:items"]));
    let claims = authority
        .authorize(&bearer(&token), "get:items")
        .await
        .unwrap();
    assert_eq!(claims.sub, "auth0|alice");
}

#[tokio::test]
async fn provider_outage_is_distinct_from_unknown_key() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let directory = KeyDirectory::remote(
        format!("http://{addr}/.well-known/jwks.json"),
        Duration::from_secs(60),
        Duration::from_secs(2),
    )
    .unwrap();

    let err = directory.resolve("any").await.unwrap_err();
    assert!(matches!(err, DirectoryError::ProviderUnavailable(_)));
}

#[tokio::test]
async fn provider_outage_surfaces_as_upstream_error_at_the_gate() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let authority = Authority::builder()
        .jwks_url(format!("http://{addr}/.well-known/jwks.json"))
        .issuer(ISSUER)
        .audience(AUDIENCE)
        .http_timeout(Duration::from_secs(2))
        .build()
        .unwrap();

    let key = generate_key("unreachable");
    let token = sign(&key, &standard_claims(&["get:items"]));

    let err = authority
        .authorize(&bearer(&token), "get:items")
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::ProviderUnavailable(_)));
    assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(err.error_code(), "provider_unavailable");
}
