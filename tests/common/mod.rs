#![allow(dead_code)]

use async_trait::async_trait;
use finscrape::config::Settings;
use finscrape::error::{Result, ScrapeError};
use finscrape::fetch::{Method, Page, PageFetcher};
use finscrape::sites::SiteProfile;
use finscrape::SmartScraper;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Rendered dividend page: well above the broad threshold.
pub const DIVIDEND_PAGE: &str = r#"<html><head><title>KO Dividends</title></head><body>
<h1>Dividend History</h1>
<p>Forward dividend yield: 3.05% paid quarterly</p>
<table class="dividend-table">
  <tr><th>Ex-Date</th><th>Yield</th><th>Dividend Per Share</th></tr>
  <tr class="data-row"><td>2024-09-13</td><td>3.05%</td><td>$0.485</td></tr>
  <tr class="data-row"><td>2024-06-14</td><td>3.10%</td><td>$0.485</td></tr>
</table>
</body></html>"#;

/// What a JavaScript-heavy site returns to a plain GET.
pub const SHELL_PAGE: &str = r#"<html><head><title>Loading</title></head><body>
<div id="__nuxt"><main class="mds-page"></main></div>
<script src="/app.js"></script></body></html>"#;

/// Fetcher that returns a canned page or a canned failure and counts calls.
pub struct StubFetcher {
    method: Method,
    response: std::result::Result<String, String>,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn ok(method: Method, html: &str) -> Arc<Self> {
        Arc::new(Self {
            method,
            response: Ok(html.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(method: Method, reason: &str) -> Arc<Self> {
        Arc::new(Self {
            method,
            response: Err(reason.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str, _profile: &SiteProfile) -> Result<Page> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Ok(html) => Ok(Page {
                url: url.to_string(),
                final_url: url.to_string(),
                status: (self.method == Method::Fast).then_some(200),
                html: html.clone(),
                method: self.method,
                elapsed: Duration::from_millis(5),
                warnings: Vec::new(),
            }),
            Err(reason) => Err(ScrapeError::Browser(reason.clone())),
        }
    }

    fn method(&self) -> Method {
        self.method
    }
}

pub fn scraper(fast: Arc<StubFetcher>, browser: Arc<StubFetcher>) -> SmartScraper {
    SmartScraper::new(fast, browser, Settings::default())
}
