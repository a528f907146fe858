//! Paged record source over the update API

use async_trait::async_trait;
use hojin_common::types::DateWindow;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Key under which pages normally carry their records
pub const PRIMARY_LIST_KEY: &str = "hojin-infos";

/// Key some endpoints use instead of the primary one
pub const ALTERNATE_LIST_KEY: &str = "update_infos";

/// Key holding the reported page count
pub const TOTAL_PAGES_KEY: &str = "total_pages";

/// Fetches one page of an endpoint as a parsed JSON body.
///
/// Implementations own transport concerns (auth header, timeouts, retry).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, endpoint: &str, page: u32, window: &DateWindow) -> Result<Value>;
}

/// Which record-list key a page carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListPresence {
    PrimaryPresent,
    AlternatePresent,
    NeitherPresent,
}

/// One parsed response page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Value>,
    pub total_pages: u32,
    pub presence: ListPresence,
}

fn non_empty_list(body: &Value, key: &str) -> Option<Vec<Value>> {
    match body.get(key) {
        Some(Value::Array(items)) if !items.is_empty() => Some(items.clone()),
        _ => None,
    }
}

fn total_pages(body: &Value) -> u32 {
    let reported = match body.get(TOTAL_PAGES_KEY) {
        Some(Value::Number(n)) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    reported
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(1)
        .max(1)
}

impl Page {
    /// Classify a response body; an empty list counts as absent
    pub fn parse(body: Value) -> Result<Self> {
        if !body.is_object() {
            return Err(SyncError::Fetch(format!(
                "unexpected response body: expected a JSON object, got {}",
                json_kind(&body)
            )));
        }

        let total_pages = total_pages(&body);
        let (records, presence) = if let Some(records) = non_empty_list(&body, PRIMARY_LIST_KEY) {
            (records, ListPresence::PrimaryPresent)
        } else if let Some(records) = non_empty_list(&body, ALTERNATE_LIST_KEY) {
            (records, ListPresence::AlternatePresent)
        } else {
            (Vec::new(), ListPresence::NeitherPresent)
        };

        Ok(Self {
            records,
            total_pages,
            presence,
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Pages through one endpoint within a date window, starting at page 1.
///
/// Stops after the page whose number reaches the reported page count, or as
/// soon as a page carries records under neither list key.
pub struct PagedSource {
    fetcher: Arc<dyn PageFetcher>,
    endpoint: String,
    window: DateWindow,
    next_page: u32,
    finished: bool,
    fetches: u32,
}

impl PagedSource {
    pub fn new(fetcher: Arc<dyn PageFetcher>, endpoint: impl Into<String>, window: DateWindow) -> Self {
        Self {
            fetcher,
            endpoint: endpoint.into(),
            window,
            next_page: 1,
            finished: false,
            fetches: 0,
        }
    }

    /// Next page of raw records, or `None` once the endpoint is exhausted
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Value>>> {
        if self.finished {
            return Ok(None);
        }

        let page_no = self.next_page;
        let body = self
            .fetcher
            .fetch_page(&self.endpoint, page_no, &self.window)
            .await?;
        self.fetches += 1;
        let page = Page::parse(body)?;

        if page.presence == ListPresence::NeitherPresent {
            debug!(endpoint = %self.endpoint, page = page_no, "Page carried no records");
            self.finished = true;
            return Ok(None);
        }

        debug!(
            endpoint = %self.endpoint,
            page = page_no,
            total_pages = page.total_pages,
            records = page.records.len(),
            presence = ?page.presence,
            "Fetched page"
        );

        if page_no >= page.total_pages {
            self.finished = true;
        } else {
            self.next_page += 1;
        }
        Ok(Some(page.records))
    }

    /// Number of pages requested so far
    pub fn fetches(&self) -> u32 {
        self.fetches
    }
}
