//! gBizINFO update API
//!
//! The API lists corporate records updated within a date window, one
//! endpoint per dataset, paginated:
//!
//! ```text
//! GET {base}/{endpoint}?page=1&from=20250901&to=20251002
//! X-hojinInfo-api-token: ...
//!
//! { "total_pages": 2, "hojin-infos": [ { "corporate_number": "...", ... } ] }
//! ```
//!
//! [`PagedSource`] owns the paging and termination rules; [`GbizClient`] is
//! the HTTP transport behind the [`PageFetcher`] seam.

pub mod client;
pub mod paged;

pub use client::{GbizClient, TOKEN_HEADER};
pub use paged::{ListPresence, Page, PageFetcher, PagedSource};
