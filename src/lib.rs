//! # pagewise
//!
//! Composable deferred values and lazy pagination for paged JSON/HTTP APIs.
//!
//! ## Design Philosophy
//!
//! pagewise is designed to be:
//! - **Uniform** - A value that is already known, still on its way from a
//!   worker, or composed from other values is the same [`Task`]
//! - **Absence-aware** - "Not found" is an outcome, not an error, and flows
//!   through every combinator untouched
//! - **Page-transparent** - Remote listings read as one forward-only sequence,
//!   either blocking ([`EagerPages`]) or as prefetched tasks ([`PipelinedPages`])
//! - **Library-first** - No global state; the worker pool and the default
//!   failure handler live in an injected [`Scheduler`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use pagewise::{Client, ClientConfig, Page, PageQuery, Request};
//!
//! # fn main() -> pagewise::Result<()> {
//! let mut config = ClientConfig::new("https://api.example.com");
//! config.api_key = Some("secret".into());
//! let client = Client::from_config(&config)?;
//!
//! // Single values compose without blocking
//! let name = client
//!     .get::<serde_json::Value>("/v1/games/432")
//!     .map(|game| game["name"].to_string());
//! name.on_complete(
//!     client.scheduler(),
//!     |name| println!("game: {name}"),
//!     |error| eprintln!("lookup failed: {error}"),
//! );
//!
//! // Listings read element by element, pages are fetched ahead of need
//! let mut mods = client
//!     .pages_pipelined(|query: PageQuery| {
//!         Request::<Page<serde_json::Value>>::page("/v1/mods/search?gameId=432", query)
//!     })
//!     .wait()?;
//! let first_ten: Vec<_> = mods.by_ref().take(10).collect();
//! for task in first_ten {
//!     println!("{}", task.wait()?["name"]);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// API client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Paginated sequences
pub mod pagination;
/// Request descriptions
pub mod request;
/// Retry logic with exponential backoff
pub mod retry;
/// Worker scheduling and the default failure handler
pub mod scheduler;
/// Deferred values
pub mod task;
/// HTTP transport
pub mod transport;

// Re-export commonly used types
pub use client::Client;
pub use config::{ClientConfig, RetryConfig, SchedulerConfig};
pub use error::{Error, Result};
pub use pagination::{EagerPages, Page, PageQuery, PageRequester, Pagination, PipelinedPages};
pub use request::Request;
pub use scheduler::{FailureHandler, Scheduler};
pub use task::{Outcome, Promise, Task};
pub use transport::{Method, RawResponse, ReqwestTransport, Transport};
