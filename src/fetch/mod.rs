// Fetching of feeds and episode audio
// Remote hosts that refuse direct requests are retried through CORS relays

pub mod cors;

use async_trait::async_trait;
use thiserror::Error;

pub use cors::CorsFetcher;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid URL {0}")]
    InvalidUrl(String),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to read {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("All CORS proxies failed for {0}")]
    AllProxiesFailed(String),
}

/// Source of raw bytes for a URL
#[async_trait]
pub trait TrackFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
