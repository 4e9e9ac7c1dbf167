//! Best-effort IP geolocation for registration metadata.

use crate::config::GeoConfig;
use crate::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[async_trait]
pub trait GeoLocator: Send + Sync {
    /// `"Country, City"` for `ip`, or `None` when unknown.
    async fn locate(&self, ip: &str) -> Option<String>;
}

/// Used when geolocation is disabled.
#[derive(Debug, Default)]
pub struct NoopLocator;

#[async_trait]
impl GeoLocator for NoopLocator {
    async fn locate(&self, _ip: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    #[serde(default)]
    country: String,
    #[serde(default)]
    city: String,
}

/// Client for the ip-api.com JSON endpoint.
pub struct IpApiLocator {
    client: reqwest::Client,
    base_url: Url,
}

impl IpApiLocator {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::ConfigError(format!("invalid geo base url: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::InternalError(format!("failed to build http client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &GeoConfig) -> Result<Self, AppError> {
        Self::new(&config.base_url, Duration::from_millis(config.timeout_ms))
    }

    async fn lookup(&self, ip: &str) -> Result<IpApiResponse, String> {
        let url = self
            .base_url
            .join(&format!("json/{ip}"))
            .map_err(|e| e.to_string())?;

        let res = self.client.get(url).send().await.map_err(|e| e.to_string())?;
        let res = res.error_for_status().map_err(|e| e.to_string())?;
        res.json::<IpApiResponse>().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: &str) -> Option<String> {
        match self.lookup(ip).await {
            Ok(body) if !body.country.is_empty() || !body.city.is_empty() => {
                Some(format!("{}, {}", body.country, body.city))
            }
            Ok(_) => None,
            Err(e) => {
                debug!(target: "identity.geo", error = %e, "IP geolocation failed");
                None
            }
        }
    }
}
