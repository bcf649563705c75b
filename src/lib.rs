//! Financial data scraper.
//!
//! Pages are fetched with a plain HTTP request first. When that fails, or
//! the HTML does not look like it carries financial data yet (tables filled
//! in later by JavaScript), the page is rendered in headless Chrome instead.
//! The chosen HTML is parsed into tables, currency amounts, dates,
//! percentages and keywords, and saved or returned over HTTP.

pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod pipeline;
pub mod quality;
pub mod quote;
pub mod server;
pub mod sites;
pub mod survey;
pub mod tables;

pub use config::Settings;
pub use error::{Result, ScrapeError};
pub use fetch::{Method, Page, PageFetcher};
pub use pipeline::{FetchMode, Outcome, Report, SmartScraper, build_report};
