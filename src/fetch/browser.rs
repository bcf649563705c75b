//! Heavy tier: render the page in headless Chrome.
//!
//! `headless_chrome` is a blocking API, so each fetch runs on the blocking
//! thread pool with its own browser process, closed when the fetch returns.

use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::{OsStr, OsString};
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::{Method, Page, PageFetcher, agents, validate_url};
use crate::config::{BrowserSettings, HttpSettings};
use crate::error::{Result, ScrapeError};
use crate::quality::detect_challenge;
use crate::sites::{ReadyStep, SiteProfile};

/// Selector / needles meaning "financial content has rendered".
const CONTENT_SELECTOR: &str = "table, [class*='dividend']";
const CONTENT_NEEDLE: &str = "dividend per share";

#[derive(Clone)]
pub struct BrowserFetcher {
    settings: BrowserSettings,
    /// Agent source; one is picked per render.
    http: HttpSettings,
}

fn browser_err(context: &str, e: impl std::fmt::Display) -> ScrapeError {
    ScrapeError::Browser(format!("{context}: {e}"))
}

impl BrowserFetcher {
    #[must_use]
    pub fn new(settings: &BrowserSettings, http: &HttpSettings) -> Self {
        Self {
            settings: settings.clone(),
            http: http.clone(),
        }
    }

    /// The configured agent, or a fresh random one when rotating.
    #[must_use]
    pub fn pick_agent(&self) -> String {
        agents::pick(
            &self.http.user_agent,
            self.http.user_agent_rotation,
            &self.http.custom_user_agents,
        )
        .to_string()
    }

    /// Chrome command-line flags for this configuration.
    #[must_use]
    pub fn launch_args(&self, user_agent: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--disable-blink-features=AutomationControlled",
            "--disable-dev-shm-usage",
            "--disable-gpu",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(OsString::from(format!("--user-agent={user_agent}")));
        args.extend(self.settings.extra_args.iter().map(OsString::from));
        args
    }

    /// The longer of the configured and the site's page-load timeout.
    fn page_load_timeout(&self, profile: &SiteProfile) -> Duration {
        profile
            .page_load_timeout()
            .max(Duration::from_secs(self.settings.page_load_timeout_seconds))
    }

    fn launch(&self, args: &[OsString], profile: &SiteProfile) -> Result<Browser> {
        let options = LaunchOptions {
            headless: self.settings.headless,
            sandbox: false,
            window_size: Some((self.settings.window_width, self.settings.window_height)),
            args: args.iter().map(OsString::as_os_str).collect::<Vec<&OsStr>>(),
            idle_browser_timeout: self.page_load_timeout(profile) * 2,
            ..Default::default()
        };
        info!("Launching headless Chrome browser");
        Browser::new(options).map_err(|e| {
            browser_err("failed to launch headless Chrome (is Chrome/Chromium installed?)", e)
        })
    }

    /// Blocking body of [`PageFetcher::fetch`].
    fn render(&self, url: &str, profile: &SiteProfile) -> Result<Page> {
        let start = Instant::now();
        let user_agent = self.pick_agent();
        let args = self.launch_args(&user_agent);
        let browser = self.launch(&args, profile)?;

        let tab = browser
            .new_tab()
            .map_err(|e| browser_err("failed to open tab", e))?;
        tab.set_default_timeout(self.page_load_timeout(profile));
        // registers navigator.webdriver hiding for every document loaded later
        if let Err(e) = tab.enable_stealth_mode() {
            warn!("Could not enable stealth mode: {}", e);
        }
        tab.set_user_agent(&user_agent, Some("en-US,en;q=0.5"), None)
            .map_err(|e| browser_err("failed to set user agent", e))?;

        if self.settings.respect_download_delay && profile.download_delay > 0 {
            std::thread::sleep(Duration::from_secs(profile.download_delay));
        }

        info!("Loading page: {}", url);
        tab.navigate_to(url)
            .map_err(|e| browser_err("failed to navigate", e))?
            .wait_until_navigated()
            .map_err(|e| browser_err("navigation did not finish", e))?;

        let mut warnings = Vec::new();
        self.wait_for_challenge(&tab, &mut warnings);
        for step in &profile.ready {
            self.run_step(&tab, step, profile, &mut warnings);
        }
        self.wait_for_content(&tab, &mut warnings);

        let html = tab
            .get_content()
            .map_err(|e| browser_err("failed to read page content", e))?;
        let final_url = tab.get_url();
        let elapsed = start.elapsed();
        info!(
            "Rendered page in {:.2}s ({} characters)",
            elapsed.as_secs_f64(),
            html.len()
        );

        Ok(Page {
            url: url.to_string(),
            final_url,
            status: None,
            html,
            method: Method::Browser,
            elapsed,
            warnings,
        })
    }

    /// Polls while the page still looks like an anti-bot interstitial.
    fn wait_for_challenge(&self, tab: &Tab, warnings: &mut Vec<String>) {
        let Some(indicator) = tab.get_content().ok().as_deref().and_then(detect_challenge) else {
            return;
        };
        info!("Detected anti-bot challenge ('{}'), waiting for resolution...", indicator);

        let poll = Duration::from_secs(self.settings.challenge_poll_seconds.max(1));
        let limit = Duration::from_secs(self.settings.challenge_wait_seconds);
        let cleared = poll_until(limit, poll, || {
            tab.get_content()
                .map(|html| detect_challenge(&html).is_none())
                .unwrap_or(false)
        });

        if cleared {
            info!("Challenge resolved");
        } else {
            warn!("Challenge still present after {:?}", limit);
            warnings.push(format!("anti-bot challenge '{indicator}' did not clear"));
        }
    }

    fn run_step(&self, tab: &Tab, step: &ReadyStep, profile: &SiteProfile, warnings: &mut Vec<String>) {
        match step {
            ReadyStep::Element {
                selector,
                timeout_secs,
            } => {
                let timeout = Duration::from_secs(*timeout_secs);
                if tab.wait_for_element_with_custom_timeout(selector, timeout).is_err() {
                    warn!("Timeout waiting for '{}' on {}", selector, profile.name);
                    warnings.push("Dynamic content may not have loaded completely".to_string());
                }
            }
            ReadyStep::ContentContains {
                needles,
                timeout_secs,
            } => {
                let found = poll_until(Duration::from_secs(*timeout_secs), Duration::from_millis(500), || {
                    tab.get_content()
                        .map(|html| needles.iter().any(|n| html.contains(n.as_str())))
                        .unwrap_or(false)
                });
                if !found {
                    warn!("Timeout waiting for {:?} on {}", needles, profile.name);
                    warnings.push("Dynamic content may not have loaded completely".to_string());
                }
            }
            ReadyStep::Settle => std::thread::sleep(Duration::from_secs(profile.wait_time)),
        }
    }

    fn wait_for_content(&self, tab: &Tab, warnings: &mut Vec<String>) {
        let limit = Duration::from_secs(self.settings.content_wait_seconds);
        let found = poll_until(limit, Duration::from_millis(500), || {
            tab.find_element(CONTENT_SELECTOR).is_ok()
                || tab
                    .get_content()
                    .map(|html| html.to_lowercase().contains(CONTENT_NEEDLE))
                    .unwrap_or(false)
        });
        if found {
            info!("Financial content detected");
        } else {
            warn!("Timeout waiting for financial content, proceeding anyway");
            warnings.push("no financial content detected after render".to_string());
        }
    }
}

/// Calls `check` every `interval` until it returns true or `limit` passes.
/// The check always runs at least once.
pub fn poll_until<F>(limit: Duration, interval: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    loop {
        if check() {
            return true;
        }
        if start.elapsed() + interval > limit {
            return false;
        }
        std::thread::sleep(interval);
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, profile: &SiteProfile) -> Result<Page> {
        validate_url(url)?;
        let this = self.clone();
        let url = url.to_string();
        let profile = profile.clone();
        tokio::task::spawn_blocking(move || this.render(&url, &profile)).await?
    }

    fn method(&self) -> Method {
        Method::Browser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_carry_agent_and_extras() {
        let fetcher = BrowserFetcher::new(
            &BrowserSettings {
                extra_args: vec!["--lang=en-US".into()],
                ..BrowserSettings::default()
            },
            &HttpSettings {
                user_agent: "test-agent/1.0".into(),
                ..HttpSettings::default()
            },
        );
        let args = fetcher.launch_args("test-agent/1.0");
        assert!(args.contains(&OsString::from("--user-agent=test-agent/1.0")));
        assert!(args.contains(&OsString::from("--disable-blink-features=AutomationControlled")));
        assert_eq!(args.last(), Some(&OsString::from("--lang=en-US")));
    }

    #[test]
    fn each_render_picks_its_own_agent() {
        let fetcher = BrowserFetcher::new(
            &BrowserSettings::default(),
            &HttpSettings {
                user_agent_rotation: true,
                custom_user_agents: vec!["a/1".into(), "b/2".into()],
                ..HttpSettings::default()
            },
        );
        let seen: std::collections::HashSet<String> =
            (0..64).map(|_| fetcher.pick_agent()).collect();
        assert_eq!(seen.len(), 2);

        let fixed = BrowserFetcher::new(&BrowserSettings::default(), &HttpSettings::default());
        assert_eq!(fixed.pick_agent(), HttpSettings::default().user_agent);
    }

    #[test]
    fn poll_until_stops_on_success() {
        let mut calls = 0;
        let ok = poll_until(Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            calls == 3
        });
        assert!(ok);
        assert_eq!(calls, 3);
    }

    #[test]
    fn poll_until_gives_up() {
        let mut calls = 0;
        let ok = poll_until(Duration::from_millis(5), Duration::from_millis(2), || {
            calls += 1;
            false
        });
        assert!(!ok);
        assert!(calls >= 1);
    }

    #[tokio::test]
    async fn rejects_invalid_url_without_launching() {
        let fetcher = BrowserFetcher::new(&BrowserSettings::default(), &HttpSettings::default());
        let err = fetcher
            .fetch("mailto:someone@example.com", &SiteProfile::generic())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidUrl { .. }));
    }
}
