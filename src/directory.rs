//! Cached access to the identity provider's published signing keys

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::jwks::{Jwk, Jwks};

/// Failure to resolve a signing key
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The identifier is absent even from a current key set
    ///
    /// Signals an invalid or foreign token rather than a provider outage.
    #[error("no signing key matches key id '{0}'")]
    KeyNotFound(String),
    /// The key-set fetch failed or timed out
    #[error("failed to fetch the provider key set")]
    ProviderUnavailable(#[source] reqwest::Error),
}

#[derive(Debug)]
struct KeySet {
    jwks: Jwks,
    fetched_at: Option<Instant>,
    etag: Option<HeaderValue>,
    last_modified: Option<HeaderValue>,
}

impl KeySet {
    fn seeded(jwks: Jwks) -> Self {
        Self {
            jwks,
            fetched_at: Some(Instant::now()),
            etag: None,
            last_modified: None,
        }
    }

    fn unpopulated() -> Self {
        Self {
            jwks: Jwks::default(),
            fetched_at: None,
            etag: None,
            last_modified: None,
        }
    }
}

#[derive(Debug)]
struct RemoteOptions {
    jwks_url: String,
    client: Client,
    refresh_ttl: Duration,
}

#[derive(Debug)]
struct Inner {
    data: ArcSwap<KeySet>,
    remote: Option<RemoteOptions>,
    refresh_lock: Mutex<()>,
}

/// A process-local cache of the provider's signing keys
///
/// Reads are lock-free; the cached key set is replaced wholesale through an
/// atomic pointer swap, so concurrent resolutions observe either the old or
/// the fully populated new set, never a mix. Refreshes are serialized
/// through an exclusive lock.
#[derive(Clone, Debug)]
#[must_use]
pub struct KeyDirectory {
    inner: Arc<Inner>,
}

impl KeyDirectory {
    /// Constructs a directory over a fixed, locally supplied key set
    ///
    /// No remote endpoint is consulted; [`refresh`](Self::refresh) is a
    /// no-op and the set only changes through [`set_keys`](Self::set_keys).
    pub fn new(jwks: Jwks) -> Self {
        Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(KeySet::seeded(jwks)),
                remote: None,
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    /// Constructs a directory backed by a remote JWKS endpoint
    ///
    /// No network activity happens here; the first resolution populates the
    /// cache. Every fetch is bounded by `http_timeout`, and the cached set
    /// is refreshed once `refresh_ttl` has elapsed since the last fetch.
    pub fn remote(
        jwks_url: impl Into<String>,
        refresh_ttl: Duration,
        http_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("tokengate/", env!("CARGO_PKG_VERSION")))
            .timeout(http_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                data: ArcSwap::from_pointee(KeySet::unpopulated()),
                remote: Some(RemoteOptions {
                    jwks_url: jwks_url.into(),
                    client,
                    refresh_ttl,
                }),
                refresh_lock: Mutex::new(()),
            }),
        })
    }

    /// Replaces the cached key set wholesale
    pub fn set_keys(&self, jwks: Jwks) {
        self.inner.data.store(Arc::new(KeySet::seeded(jwks)));
    }

    /// Looks up the signing key for the given key identifier
    ///
    /// An unpopulated or stale cache is refreshed first; a fetch failure
    /// surfaces as [`DirectoryError::ProviderUnavailable`]. A key id absent
    /// from a current set is [`DirectoryError::KeyNotFound`] — the caller
    /// decides whether a forced [`refresh`](Self::refresh) is warranted.
    pub async fn resolve(&self, kid: &str) -> Result<Jwk, DirectoryError> {
        if self.is_stale() {
            self.refresh_if_stale().await?;
        }

        let guard = self.inner.data.load();
        guard
            .jwks
            .get_key(kid)
            .cloned()
            .ok_or_else(|| DirectoryError::KeyNotFound(kid.to_owned()))
    }

    /// Fetches the key set from the remote endpoint, replacing the cache
    ///
    /// A no-op for a locally seeded directory. No retries are attempted; a
    /// failed fetch leaves the cached set unchanged.
    #[tracing::instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), DirectoryError> {
        let Some(remote) = &self.inner.remote else {
            return Ok(());
        };

        let _guard = self.inner.refresh_lock.lock().await;
        self.fetch(remote).await
    }

    fn is_stale(&self) -> bool {
        let Some(remote) = &self.inner.remote else {
            return false;
        };

        match self.inner.data.load().fetched_at {
            None => true,
            Some(at) => at.elapsed() >= remote.refresh_ttl,
        }
    }

    async fn refresh_if_stale(&self) -> Result<(), DirectoryError> {
        let Some(remote) = &self.inner.remote else {
            return Ok(());
        };

        let _guard = self.inner.refresh_lock.lock().await;

        // A concurrent refresher may have repopulated the cache while this
        // task waited on the lock.
        if !self.is_stale() {
            return Ok(());
        }

        self.fetch(remote).await
    }

    async fn fetch(&self, remote: &RemoteOptions) -> Result<(), DirectoryError> {
        tracing::debug!(jwks.url = %remote.jwks_url, "refreshing JWKS");

        let mut request = remote.client.get(&remote.jwks_url);
        {
            let data = self.inner.data.load();
            if let Some(etag) = &data.etag {
                request = request.header(header::IF_NONE_MATCH, etag);
            } else if let Some(last_modified) = &data.last_modified {
                request = request.header(header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(DirectoryError::ProviderUnavailable)?;

        if response.status() == StatusCode::NOT_MODIFIED {
            tracing::debug!("JWKS not modified");
            let prior = self.inner.data.load_full();
            self.inner.data.store(Arc::new(KeySet {
                jwks: prior.jwks.clone(),
                fetched_at: Some(Instant::now()),
                etag: prior.etag.clone(),
                last_modified: prior.last_modified.clone(),
            }));
            return Ok(());
        }

        if let Err(err) = response.error_for_status_ref() {
            let error: &dyn std::error::Error = &err;
            tracing::warn!(
                error,
                http.status_code = response.status().as_u16(),
                "JWKS refresh failed; unexpected response status",
            );
            return Err(DirectoryError::ProviderUnavailable(err));
        }

        let etag = response.headers().get(header::ETAG).map(ToOwned::to_owned);
        let last_modified = response
            .headers()
            .get(header::LAST_MODIFIED)
            .map(ToOwned::to_owned);

        match response.json::<Jwks>().await {
            Ok(jwks) => {
                self.inner.data.store(Arc::new(KeySet {
                    jwks,
                    fetched_at: Some(Instant::now()),
                    etag,
                    last_modified,
                }));
                tracing::info!(jwks.url = %remote.jwks_url, "JWKS refreshed");
                Ok(())
            }
            Err(err) => {
                let error: &dyn std::error::Error = &err;
                tracing::warn!(error, "JWKS refresh failed; malformed key set");
                Err(DirectoryError::ProviderUnavailable(err))
            }
        }
    }
}
