//! Fetch tiers: a fast plain HTTP request and a headless browser render.

pub mod agents;
pub mod browser;
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{Result, ScrapeError};
use crate::sites::SiteProfile;

pub use browser::BrowserFetcher;
pub use http::{HttpFetcher, ProxyStats};

/// Which tier produced a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Fast,
    Browser,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Browser => "browser",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Raw result of one fetch.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    /// Only known for the HTTP tier.
    pub status: Option<u16>,
    pub html: String,
    pub method: Method,
    pub elapsed: Duration,
    /// Non-fatal problems, e.g. a readiness wait that timed out.
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`, using `profile` for site-specific timing and waits.
    async fn fetch(&self, url: &str, profile: &SiteProfile) -> Result<Page>;

    fn method(&self) -> Method;
}

/// Rejects URLs that are not absolute http(s) URLs with a host.
pub fn validate_url(url: &str) -> Result<url::Url> {
    let parsed = url::Url::parse(url).map_err(|e| ScrapeError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScrapeError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ScrapeError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(validate_url("https://finance.yahoo.com/quote/AAPL").is_ok());
        assert!(matches!(
            validate_url("ftp://example.com/x"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
        assert!(matches!(
            validate_url("not a url"),
            Err(ScrapeError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::Fast.to_string(), "fast");
        assert_eq!(serde_json::to_string(&Method::Browser).unwrap(), "\"browser\"");
    }
}
