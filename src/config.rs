//! Configuration loading and management

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::quality::QualityCheck;

/// File looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "finscrape.toml";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    pub http: HttpSettings,
    pub browser: BrowserSettings,
    pub quality: QualitySettings,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_seconds: u64,
    pub retry_times: u32,
    /// First backoff delay; doubles on each retry.
    pub retry_base_delay_ms: u64,
    pub user_agent: String,
    pub user_agent_rotation: bool,
    /// Replaces the built-in rotation pool when non-empty.
    pub custom_user_agents: Vec<String>,
    pub proxies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    pub page_load_timeout_seconds: u64,
    /// How long to wait for an anti-bot challenge page to clear itself.
    pub challenge_wait_seconds: u64,
    pub challenge_poll_seconds: u64,
    /// Final wait for tables or dividend markup after the site's own steps.
    pub content_wait_seconds: u64,
    /// Sleep the profile's download delay before navigating.
    pub respect_download_delay: bool,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QualitySettings {
    pub check: QualityCheck,
    pub broad_threshold: u32,
    pub dividend_cells_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub format: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            http: HttpSettings::default(),
            browser: BrowserSettings::default(),
            quality: QualitySettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_times: 3,
            retry_base_delay_ms: 1000,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            user_agent_rotation: false,
            custom_user_agents: Vec::new(),
            proxies: Vec::new(),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            page_load_timeout_seconds: 60,
            challenge_wait_seconds: 30,
            challenge_poll_seconds: 2,
            content_wait_seconds: 15,
            respect_download_delay: true,
            extra_args: Vec::new(),
        }
    }
}

impl Default for QualitySettings {
    fn default() -> Self {
        Self {
            check: QualityCheck::Broad,
            broad_threshold: 20,
            dividend_cells_threshold: 10,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            format: "json".to_string(),
        }
    }
}

impl Settings {
    /// Load configuration from TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Explicit path, else `finscrape.toml` if present, else defaults; then
    /// `FINSCRAPE_*` environment overrides.
    ///
    /// Also returns the overrides that were ignored, since this usually runs
    /// before logging is set up.
    pub fn discover(path: Option<&Path>) -> Result<(Self, Vec<String>)> {
        let mut settings = match path {
            Some(p) => Self::load(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                debug!("Loading {}", DEFAULT_CONFIG_FILE);
                Self::load(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };
        let ignored = settings.apply_overrides(|key| std::env::var(key).ok());
        Ok((settings, ignored))
    }

    /// Applies `FINSCRAPE_*` overrides read through `lookup`, returning a
    /// message for each value that could not be used.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Vec<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ignored = Vec::new();
        if let Some(level) = lookup("FINSCRAPE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(dir) = lookup("FINSCRAPE_OUTPUT_DIR") {
            self.output.directory = PathBuf::from(dir);
        }
        if let Some(v) = lookup("FINSCRAPE_REQUEST_TIMEOUT") {
            match v.parse() {
                Ok(secs) => self.http.timeout_seconds = secs,
                Err(_) => ignored.push(format!("Ignoring FINSCRAPE_REQUEST_TIMEOUT={v}: not a number")),
            }
        }
        if let Some(v) = lookup("FINSCRAPE_RETRY_TIMES") {
            match v.parse() {
                Ok(n) => self.http.retry_times = n,
                Err(_) => ignored.push(format!("Ignoring FINSCRAPE_RETRY_TIMES={v}: not a number")),
            }
        }
        if let Some(v) = lookup("FINSCRAPE_HEADLESS") {
            self.browser.headless = parse_flag(&v);
        }
        if let Some(v) = lookup("FINSCRAPE_USER_AGENT_ROTATION") {
            self.http.user_agent_rotation = parse_flag(&v);
        }
        if let Some(v) = lookup("FINSCRAPE_PROXY_LIST") {
            self.http.proxies = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        ignored
    }

    /// Threshold for whichever heuristic is configured.
    #[must_use]
    pub fn quality_threshold(&self) -> u32 {
        match self.quality.check {
            QualityCheck::Broad => self.quality.broad_threshold,
            QualityCheck::DividendCells => self.quality.dividend_cells_threshold,
        }
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_settings() {
        let s = Settings::default();
        assert_eq!(s.http.timeout_seconds, 30);
        assert_eq!(s.http.retry_times, 3);
        assert_eq!((s.browser.window_width, s.browser.window_height), (1920, 1080));
        assert_eq!(s.browser.challenge_wait_seconds, 30);
        assert_eq!(s.quality_threshold(), 20);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s: Settings = toml::from_str(
            r#"
            log_level = "debug"
            [http]
            retry_times = 5
            [quality]
            check = "dividend-cells"
            "#,
        )
        .unwrap();
        assert_eq!(s.log_level, "debug");
        assert_eq!(s.http.retry_times, 5);
        assert_eq!(s.http.timeout_seconds, 30);
        assert_eq!(s.quality.check, QualityCheck::DividendCells);
        assert_eq!(s.quality_threshold(), 10);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("FINSCRAPE_OUTPUT_DIR", "/tmp/scrapes"),
            ("FINSCRAPE_HEADLESS", "false"),
            ("FINSCRAPE_PROXY_LIST", "http://a:1, ,http://b:2"),
            ("FINSCRAPE_REQUEST_TIMEOUT", "soon"),
        ]
        .into_iter()
        .collect();
        let mut s = Settings::default();
        let ignored = s.apply_overrides(|k| env.get(k).map(|v| (*v).to_string()));
        assert_eq!(s.output.directory, PathBuf::from("/tmp/scrapes"));
        assert!(!s.browser.headless);
        assert_eq!(s.http.proxies, vec!["http://a:1", "http://b:2"]);
        assert_eq!(s.http.timeout_seconds, 30);
        assert_eq!(
            ignored,
            vec!["Ignoring FINSCRAPE_REQUEST_TIMEOUT=soon: not a number".to_string()]
        );
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("finscrape.toml");
        std::fs::write(&path, "[output]\ndirectory = \"out\"\n").unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.output.directory, PathBuf::from("out"));
    }
}
