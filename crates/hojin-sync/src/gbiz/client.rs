//! HTTP transport for the update API

use async_trait::async_trait;
use hojin_common::types::DateWindow;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::paged::PageFetcher;
use crate::config::GbizConfig;
use crate::error::{Result, SyncError};

/// Header carrying the API token
pub const TOKEN_HEADER: &str = "X-hojinInfo-api-token";

/// reqwest-backed [`PageFetcher`]; one request per page, no retries
pub struct GbizClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GbizClient {
    pub fn new(config: &GbizConfig) -> Result<Self> {
        let token = config
            .api_token
            .clone()
            .ok_or_else(|| SyncError::Config("GBIZ_API_TOKEN is not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("hojin-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }
}

#[async_trait]
impl PageFetcher for GbizClient {
    async fn fetch_page(&self, endpoint: &str, page: u32, window: &DateWindow) -> Result<Value> {
        let url = self.endpoint_url(endpoint);
        debug!(url = %url, page, window = %window, "Requesting page");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(TOKEN_HEADER, &self.token)
            .query(&[
                ("page", page.to_string()),
                ("from", window.from_param()),
                ("to", window.to_param()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!(
                "{} page {} returned HTTP {}",
                url, page, status
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SyncError::Fetch(format!("{} page {}: unparsable body: {}", url, page, e)))
    }
}
