//! Public address lookup for alert headers

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::warn;

/// Default plain-text IP echo service
pub const DEFAULT_PUBLIC_IP_URL: &str = "https://api.ipify.org";

/// Returned when the address cannot be determined
pub const UNKNOWN_ADDRESS: &str = "unknown";

/// Resolves the host's public address; never fails, falls back to [`UNKNOWN_ADDRESS`]
#[async_trait]
pub trait PublicAddressResolver: Send + Sync {
    async fn resolve(&self) -> String;
}

/// Resolver querying an HTTP service that answers with the caller's IP
pub struct HttpAddressResolver {
    client: Client,
    url: String,
}

impl HttpAddressResolver {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch(&self) -> Result<String, reqwest::Error> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }
}

#[async_trait]
impl PublicAddressResolver for HttpAddressResolver {
    async fn resolve(&self) -> String {
        match self.fetch().await {
            Ok(address) if !address.is_empty() => address,
            Ok(_) => {
                warn!(url = %self.url, "Public address service returned an empty body");
                UNKNOWN_ADDRESS.to_string()
            }
            Err(e) => {
                warn!(url = %self.url, error = %e, "Failed to resolve public address");
                UNKNOWN_ADDRESS.to_string()
            }
        }
    }
}
