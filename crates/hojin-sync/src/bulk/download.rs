//! Archive acquisition over HTTP

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, Response};
use scraper::{Html, Selector};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::catalog::BulkRequest;
use crate::config::BulkConfig;
use crate::error::{Result, SyncError};

/// Writes the archive described by a [`BulkRequest`] to a local file
#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Returns the number of bytes written to `dest`
    async fn fetch_archive(&self, request: &BulkRequest, dest: &Path) -> Result<u64>;
}

/// reqwest-backed fetcher with a cookie session, so a token handshake
/// and the download it unlocks share one session
pub struct HttpArchiveFetcher {
    client: Client,
}

impl HttpArchiveFetcher {
    pub fn new(config: &BulkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .user_agent(concat!("hojin-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn session_token(&self, landing_url: &str, token_field: &str) -> Result<String> {
        let response = self.client.get(landing_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Fetch(format!(
                "landing page {} returned HTTP {}",
                landing_url, status
            )));
        }
        let html = response.text().await?;
        extract_hidden_value(&html, token_field)
    }
}

/// Value of the `<input>` named `field` in an HTML form
pub fn extract_hidden_value(html: &str, field: &str) -> Result<String> {
    let document = Html::parse_document(html);
    let inputs = Selector::parse("input")
        .map_err(|e| SyncError::Fetch(format!("invalid selector: {:?}", e)))?;

    document
        .select(&inputs)
        .find(|el| el.value().attr("name") == Some(field))
        .and_then(|el| el.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| SyncError::Fetch(format!("form token '{}' not found on landing page", field)))
}

async fn stream_to_file(response: Response, dest: &Path) -> Result<u64> {
    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Fetch(format!(
            "archive download {} returned HTTP {}",
            response.url(),
            status
        )));
    }

    let mut file = tokio::fs::File::create(dest).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch_archive(&self, request: &BulkRequest, dest: &Path) -> Result<u64> {
        let response = match request {
            BulkRequest::TokenGated {
                landing_url,
                download_url,
                token_field,
                selector_field,
                selector,
                extra_params,
            } => {
                let token = self.session_token(landing_url, token_field).await?;
                debug!(landing_url = %landing_url, "Obtained download token");

                let mut form: Vec<(&str, &str)> = vec![
                    (token_field.as_str(), token.as_str()),
                    (selector_field.as_str(), selector.as_str()),
                ];
                form.extend(extra_params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                self.client.post(download_url).form(&form).send().await?
            },
            BulkRequest::Direct {
                download_url,
                params,
            } => self.client.post(download_url).form(params).send().await?,
        };

        let bytes = stream_to_file(response, dest).await?;
        info!(bytes, dest = %dest.display(), "Downloaded bulk archive");
        Ok(bytes)
    }
}
