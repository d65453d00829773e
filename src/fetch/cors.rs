// CORS-aware fetcher
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Client, Url};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use super::{FetchError, TrackFetcher};

/// Relay used when no proxy list is configured
pub const DEFAULT_CORS_PROXIES: &[&str] = &["https://jwt.mousetail.nl/proxy/cors?url="];

type HostsChanged = Box<dyn Fn(&[String]) + Send + Sync>;

/// Fetcher that falls back to CORS relays for hosts that refuse direct requests
pub struct CorsFetcher {
    client: Client,
    proxies: Vec<String>,
    current_proxy: AtomicUsize,
    cors_hosts: Mutex<Vec<String>>,
    on_hosts_changed: Option<HostsChanged>,
}

impl CorsFetcher {
    pub fn new(
        proxies: Vec<String>,
        cors_hosts: Vec<String>,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                source: e,
            })?;

        Ok(Self::with_client(client, proxies, cors_hosts))
    }

    pub fn with_client(client: Client, proxies: Vec<String>, cors_hosts: Vec<String>) -> Self {
        Self {
            client,
            proxies,
            current_proxy: AtomicUsize::new(0),
            cors_hosts: Mutex::new(cors_hosts),
            on_hosts_changed: None,
        }
    }

    /// Called with the full host list whenever a new host is found to need a proxy
    pub fn on_hosts_changed(mut self, callback: impl Fn(&[String]) + Send + Sync + 'static) -> Self {
        self.on_hosts_changed = Some(Box::new(callback));
        self
    }

    /// Origins currently routed through a proxy
    pub fn cors_hosts(&self) -> Vec<String> {
        self.cors_hosts.lock().clone()
    }

    /// Proxy URL for a target: relay prefix followed by the encoded absolute URL
    pub fn proxied_url(proxy: &str, target: &Url) -> String {
        format!("{}{}", proxy, urlencoding::encode(target.as_str()))
    }

    fn requires_proxy(&self, origin: &str) -> bool {
        self.cors_hosts.lock().iter().any(|h| h == origin)
    }

    fn remember_host(&self, origin: String) {
        let hosts = {
            let mut hosts = self.cors_hosts.lock();
            if hosts.contains(&origin) {
                return;
            }
            info!("Routing {} through CORS proxy from now on", origin);
            hosts.push(origin);
            hosts.clone()
        };
        if let Some(callback) = &self.on_hosts_changed {
            callback(&hosts);
        }
    }

    fn rotate_proxy(&self) {
        if !self.proxies.is_empty() {
            let next = (self.current_proxy.load(Ordering::SeqCst) + 1) % self.proxies.len();
            self.current_proxy.store(next, Ordering::SeqCst);
        }
    }

    async fn fetch_direct(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Request {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| FetchError::Request {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }

    async fn fetch_with_cors(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        for _ in 0..self.proxies.len() {
            let index = self.current_proxy.load(Ordering::SeqCst) % self.proxies.len();
            let proxied = Self::proxied_url(&self.proxies[index], url);
            let target = Url::parse(&proxied).map_err(|_| FetchError::InvalidUrl(proxied.clone()))?;

            match self.fetch_direct(&target).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!("Error fetching through proxy: {}", e);
                    self.rotate_proxy();
                }
            }
        }

        Err(FetchError::AllProxiesFailed(url.to_string()))
    }

    async fn fetch_file(path: &Path) -> Result<Vec<u8>, FetchError> {
        tokio::fs::read(path).await.map_err(|e| FetchError::File {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl TrackFetcher for CorsFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            // No scheme: a path on this machine
            Err(_) => return Self::fetch_file(Path::new(url)).await,
        };

        match parsed.scheme() {
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
                Self::fetch_file(&path).await
            }
            "http" | "https" => {
                let origin = parsed.origin().ascii_serialization();
                if self.requires_proxy(&origin) {
                    return self.fetch_with_cors(&parsed).await;
                }

                match self.fetch_direct(&parsed).await {
                    Err(FetchError::Request { source, .. }) => {
                        debug!("Direct request to {} failed: {}", origin, source);
                        self.remember_host(origin);
                        self.fetch_with_cors(&parsed).await
                    }
                    other => other,
                }
            }
            // Windows drive letters parse as a one letter scheme
            scheme if scheme.len() == 1 => Self::fetch_file(Path::new(url)).await,
            _ => Err(FetchError::InvalidUrl(url.to_string())),
        }
    }
}
