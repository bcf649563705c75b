//! Fast tier: one plain HTTP GET with browser-like headers.
//!
//! Transient failures (timeouts, connection errors, body read errors, HTTP
//! 429 and 5xx) are retried with exponential backoff, or after the server's
//! `Retry-After` when it sends one. 403 and 404 are permanent and reported
//! straight away so the caller can fall back to the browser.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{Method, Page, PageFetcher, agents, validate_url};
use crate::config::HttpSettings;
use crate::error::{Result, ScrapeError};
use crate::quality::detect_challenge;
use crate::sites::SiteProfile;

/// Upper bound on a server-sent `Retry-After`.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(120);

struct ProxyRoute {
    url: String,
    client: Client,
    healthy: AtomicBool,
    successes: AtomicU64,
    failures: AtomicU64,
}

/// Usage counters for one configured proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyStats {
    pub proxy: String,
    pub healthy: bool,
    pub successes: u64,
    pub failures: u64,
}

pub struct HttpFetcher {
    direct: Client,
    /// Proxies are dropped from rotation after a connect or timeout error.
    /// With none left, requests go out directly.
    proxies: Vec<ProxyRoute>,
    settings: HttpSettings,
}

/// Body of a successful response.
struct Fetched {
    status: u16,
    final_url: String,
    html: String,
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
    headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert("sec-fetch-site", HeaderValue::from_static("none"));
    headers
}

/// Seconds form of `Retry-After`; the HTTP-date form is ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl HttpFetcher {
    pub fn new(settings: &HttpSettings) -> Result<Self> {
        let builder = || -> ClientBuilder {
            Client::builder()
                .default_headers(browser_headers())
                .timeout(Duration::from_secs(settings.timeout_seconds))
        };

        let proxies = settings
            .proxies
            .iter()
            .map(|p| {
                Ok(ProxyRoute {
                    url: p.clone(),
                    client: builder().proxy(reqwest::Proxy::all(p)?).build()?,
                    healthy: AtomicBool::new(true),
                    successes: AtomicU64::new(0),
                    failures: AtomicU64::new(0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            direct: builder().build()?,
            proxies,
            settings: settings.clone(),
        })
    }

    /// Random healthy proxy, `None` for a direct request.
    fn pick_proxy(&self) -> Option<usize> {
        let healthy: Vec<usize> = self
            .proxies
            .iter()
            .enumerate()
            .filter(|(_, p)| p.healthy.load(Ordering::Relaxed))
            .map(|(i, _)| i)
            .collect();
        if healthy.is_empty() && !self.proxies.is_empty() {
            warn!("No working proxies available, sending direct request");
        }
        healthy.choose(&mut rand::thread_rng()).copied()
    }

    fn client(&self, proxy: Option<usize>) -> &Client {
        proxy.map_or(&self.direct, |i| &self.proxies[i].client)
    }

    fn mark_success(&self, proxy: Option<usize>) {
        if let Some(route) = proxy.map(|i| &self.proxies[i]) {
            route.successes.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn mark_failed(&self, proxy: Option<usize>, error: &reqwest::Error) {
        if let Some(route) = proxy.map(|i| &self.proxies[i]) {
            route.healthy.store(false, Ordering::Relaxed);
            route.failures.fetch_add(1, Ordering::Relaxed);
            warn!("Marked proxy {} as failed: {}", route.url, error);
        }
    }

    #[must_use]
    pub fn proxy_stats(&self) -> Vec<ProxyStats> {
        self.proxies
            .iter()
            .map(|p| ProxyStats {
                proxy: p.url.clone(),
                healthy: p.healthy.load(Ordering::Relaxed),
                successes: p.successes.load(Ordering::Relaxed),
                failures: p.failures.load(Ordering::Relaxed),
            })
            .collect()
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.settings.retry_base_delay_ms.saturating_mul(factor))
    }

    /// Sends the GET and reads the body, retrying transient failures up to
    /// `retry_times`.
    async fn send(&self, url: &str) -> Result<Fetched> {
        let max_retries = self.settings.retry_times;
        let mut attempt = 0;

        loop {
            let proxy = self.pick_proxy();
            let agent = agents::pick(
                &self.settings.user_agent,
                self.settings.user_agent_rotation,
                &self.settings.custom_user_agents,
            );
            debug!("User agent set: {}", agent);

            let result = self
                .client(proxy)
                .get(url)
                .header(header::USER_AGENT, agent)
                .send()
                .await;

            let (err, server_delay) = match result {
                Ok(response) => {
                    self.mark_success(proxy);
                    let status = response.status();
                    match classify(url, status, attempt + 1) {
                        None => {
                            let final_url = response.url().to_string();
                            match response.text().await {
                                Ok(html) => {
                                    return Ok(Fetched {
                                        status: status.as_u16(),
                                        final_url,
                                        html,
                                    });
                                }
                                Err(e) => (ScrapeError::Http(e), None),
                            }
                        }
                        Some(err) => (err, retry_after(response.headers())),
                    }
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        self.mark_failed(proxy, &e);
                    }
                    (ScrapeError::Http(e), None)
                }
            };

            if !err.is_transient() || attempt >= max_retries {
                return Err(err);
            }
            attempt += 1;
            let delay = server_delay.map_or_else(|| self.backoff(attempt), |d| d.min(MAX_RETRY_AFTER));
            warn!("  transient error: {}", err);
            warn!("  retry {}/{} for {} in {:?}", attempt, max_retries, url, delay);
            tokio::time::sleep(delay).await;
        }
    }
}

/// Maps a response status to an error, `None` for success.
fn classify(url: &str, status: StatusCode, attempts: u32) -> Option<ScrapeError> {
    let url = url.to_string();
    if status.is_success() || status.is_redirection() {
        None
    } else if status == StatusCode::FORBIDDEN {
        Some(ScrapeError::Blocked { url, status })
    } else if status == StatusCode::NOT_FOUND {
        Some(ScrapeError::NotFound { url })
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(ScrapeError::RateLimited { url, attempts })
    } else {
        Some(ScrapeError::Status { url, status })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, _profile: &SiteProfile) -> Result<Page> {
        validate_url(url)?;
        info!("Making HTTP request to: {}", url);
        let start = Instant::now();

        let Fetched {
            status,
            final_url,
            html,
        } = self.send(url).await?;
        let elapsed = start.elapsed();

        info!(
            "Retrieved HTML in {:.2}s ({} characters)",
            elapsed.as_secs_f64(),
            html.len()
        );

        let mut warnings = Vec::new();
        if let Some(indicator) = detect_challenge(&html) {
            warn!("Anti-scraping page suspected on {}: '{}'", url, indicator);
            warnings.push(format!("anti-bot indicator '{indicator}' in response"));
        }

        Ok(Page {
            url: url.to_string(),
            final_url,
            status: Some(status),
            html,
            method: Method::Fast,
            elapsed,
            warnings,
        })
    }

    fn method(&self) -> Method {
        Method::Fast
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(classify("u", StatusCode::OK, 1).is_none());
        assert!(matches!(
            classify("u", StatusCode::FORBIDDEN, 1),
            Some(ScrapeError::Blocked { .. })
        ));
        assert!(matches!(
            classify("u", StatusCode::NOT_FOUND, 1),
            Some(ScrapeError::NotFound { .. })
        ));
        assert!(matches!(
            classify("u", StatusCode::TOO_MANY_REQUESTS, 4),
            Some(ScrapeError::RateLimited { attempts: 4, .. })
        ));
        assert!(matches!(
            classify("u", StatusCode::SERVICE_UNAVAILABLE, 1),
            Some(ScrapeError::Status { .. })
        ));
    }

    #[test]
    fn backoff_doubles() {
        let fetcher = HttpFetcher::new(&HttpSettings {
            retry_base_delay_ms: 100,
            ..HttpSettings::default()
        })
        .unwrap();
        assert_eq!(fetcher.backoff(1), Duration::from_millis(100));
        assert_eq!(fetcher.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(header::RETRY_AFTER, HeaderValue::from_static(" 7 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));
        headers.insert(
            header::RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn proxies_start_healthy() {
        let fetcher = HttpFetcher::new(&HttpSettings {
            proxies: vec!["http://127.0.0.1:1".into()],
            ..HttpSettings::default()
        })
        .unwrap();
        assert_eq!(fetcher.pick_proxy(), Some(0));
        assert!(fetcher.proxy_stats()[0].healthy);
    }
}
