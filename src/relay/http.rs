// reqwest-backed listing fetcher

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::config::NetworkConfig;
use super::errors::RelayError;
use super::traits::{FetchedPage, PageFetcher};

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    /// Client with the configured timeout and (optional) proxy
    pub fn new(network: &NetworkConfig) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(network.timeout_seconds));

        if let Some(proxy_url) = network.proxy.as_deref() {
            let proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| RelayError::Config(format!("invalid proxy {}: {}", proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| RelayError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    fn name(&self) -> &'static str {
        "reqwest"
    }

    async fn fetch(&self, url: &str, headers: &[(String, String)]) -> Result<FetchedPage, RelayError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(url, status, bytes = body.len(), "page fetched");
        Ok(FetchedPage { status, body })
    }
}
