//! HTTP client for fetching vector tiles.

use std::future::Future;
use std::pin::Pin;

use tessera_decode::TileKey;

use crate::error::{Error, Result};
use crate::types::TileSource;

/// Future type for tile fetches.
#[cfg(not(target_family = "wasm"))]
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// Future type for tile fetches.
#[cfg(target_family = "wasm")]
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + 'a>>;

/// Something that can produce the raw bytes of a tile.
///
/// Implementations report a tile the source does not have as
/// [`Error::NotFound`]; every other failure is treated as retryable.
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, key: TileKey) -> FetchFuture<'_>;
}

/// HTTP tile fetcher for a [`TileSource`].
///
/// The client is runtime-agnostic and works with any async executor. On
/// native targets requests are bounded by the source's timeout.
///
/// # Example
///
/// ```ignore
/// let client = Client::new(TileSource::new("https://tiles.example/{z}/{x}/{y}.pbf"))?;
/// let bytes = client.fetch_tile(TileKey::new(14, 8190, 5447)?).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    source: TileSource,
}

impl Client {
    /// Create a client for `source`.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails validation or the HTTP client
    /// cannot be built.
    pub fn new(source: TileSource) -> Result<Self> {
        source.validate()?;
        let http = build_http(&source)?;
        Ok(Self { http, source })
    }

    /// Create a client with a custom HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the source fails validation.
    pub fn with_http(http: reqwest::Client, source: TileSource) -> Result<Self> {
        source.validate()?;
        Ok(Self { http, source })
    }

    /// Fetch a TileJSON document and create a client for the source it
    /// describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the document is invalid.
    pub async fn from_tilejson_url(url: &str) -> Result<Self> {
        let http = reqwest::Client::new();
        let bytes = get_bytes(&http, url).await?;
        let json = String::from_utf8(bytes).map_err(|e| Error::InvalidConfig {
            context: "tilejson",
            detail: e.to_string(),
        })?;
        let source = TileSource::from_tilejson(&json)?;
        let http = build_http(&source)?;
        Ok(Self { http, source })
    }

    #[must_use]
    pub fn source(&self) -> &TileSource {
        &self.source
    }

    /// Fetch the raw (possibly gzip-compressed) bytes of one tile.
    ///
    /// Tiles outside the source's zoom range or bounds are reported as
    /// [`Error::NotFound`] without touching the network.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for 404/204 responses, and a network
    /// error for transport failures, timeouts and other statuses.
    pub async fn fetch_tile(&self, key: TileKey) -> Result<Vec<u8>> {
        if !self.source.serves(key) {
            return Err(Error::NotFound { key });
        }

        let url = self.source.url(key);
        match get_bytes(&self.http, &url).await {
            Err(Error::HttpStatus {
                status: 404 | 204, ..
            }) => Err(Error::NotFound { key }),
            other => other,
        }
    }
}

impl TileFetcher for Client {
    fn fetch(&self, key: TileKey) -> FetchFuture<'_> {
        Box::pin(self.fetch_tile(key))
    }
}

#[cfg(not(target_family = "wasm"))]
fn build_http(source: &TileSource) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(source.timeout())
        .build()
        .map_err(|e| Error::InvalidConfig {
            context: "http client",
            detail: e.to_string(),
        })
}

#[cfg(target_family = "wasm")]
#[allow(clippy::unnecessary_wraps)]
fn build_http(_source: &TileSource) -> Result<reqwest::Client> {
    // The browser owns request timeouts.
    Ok(reqwest::Client::new())
}

async fn get_bytes(http: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    tracing::debug!(url, "fetching");

    let response = http.get(url).send().await.map_err(|e| request_error(url, &e))?;

    let status = response.status();
    if status == reqwest::StatusCode::NO_CONTENT || !status.is_success() {
        return Err(Error::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let data = response
        .bytes()
        .await
        .map_err(|e| request_error(url, &e))?;

    tracing::debug!(url, bytes = data.len(), "fetched");
    Ok(data.to_vec())
}

fn request_error(url: &str, e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else {
        Error::Http {
            url: url.to_string(),
            message: e.to_string(),
        }
    }
}
