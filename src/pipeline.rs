//! Two-tier smart scrape: fast HTTP first, browser render when the fast
//! result is missing or too thin, then a full parse into a [`Report`].

use chrono::{DateTime, Utc};
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::error::{Result, ScrapeError};
use crate::extract::{ExtractedData, extract_financial_data};
use crate::fetch::{BrowserFetcher, HttpFetcher, Method, Page, PageFetcher, validate_url};
use crate::quality::{Assessment, AssessmentInput, QualityReport, assess, evaluate};
use crate::sites::{SiteProfile, profile_for_url};
use crate::tables::{TableData, extract_tables, page_title, visible_text};

/// `--method` choice: let the pipeline decide, or force one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    #[default]
    Auto,
    Fast,
    Browser,
}

/// The page the pipeline settled on and how it got there.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub page: Page,
    pub method: Method,
    /// Wall time across every tier tried.
    pub duration: Duration,
    /// Fast-tier quality check, when the fast tier returned a page.
    pub quality: Option<QualityReport>,
    pub profile: SiteProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub html_length: usize,
    pub text_length: usize,
    pub total_tables: usize,
    pub financial_tables: usize,
    pub status: Option<u16>,
    pub fetch_seconds: f64,
    pub total_seconds: f64,
}

/// Everything parsed out of one scraped page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub url: String,
    pub final_url: String,
    pub title: String,
    pub scraped_at: DateTime<Utc>,
    pub site: String,
    pub method: Method,
    pub success: bool,
    pub html: String,
    pub text: String,
    pub extracted: ExtractedData,
    pub tables: Vec<TableData>,
    /// Fetch warnings and parse problems; none of them fatal.
    pub errors: Vec<String>,
    pub metadata: ReportMetadata,
    pub quality: Option<QualityReport>,
    pub assessment: Assessment,
}

impl Report {
    pub fn financial_tables(&self) -> impl Iterator<Item = &TableData> {
        self.tables.iter().filter(|t| t.metadata.appears_financial)
    }
}

/// Parses the outcome's HTML with its site profile.
#[must_use]
pub fn build_report(outcome: &Outcome) -> Report {
    let page = &outcome.page;
    let profile = &outcome.profile;
    let document = Html::parse_document(&page.html);

    let title = page_title(&document);
    let text = visible_text(&document);
    let tables = extract_tables(&document, &profile.table_selectors);
    let extracted = extract_financial_data(&text, &profile.financial_keywords);

    let financial_tables = tables.iter().filter(|t| t.metadata.appears_financial).count();
    info!(
        "Found {} tables ({} financial), {} amounts, {} dates",
        tables.len(),
        financial_tables,
        extracted.currency_amounts.len(),
        extracted.dates.len()
    );

    let assessment = assess(AssessmentInput {
        dividend_keywords: extracted.dividend_keywords().count(),
        currency_amounts: extracted.currency_amounts.len(),
        dates: extracted.dates.len(),
        tables: tables.len(),
        text_length: text.len(),
    });

    let metadata = ReportMetadata {
        html_length: page.html.len(),
        text_length: text.len(),
        total_tables: tables.len(),
        financial_tables,
        status: page.status,
        fetch_seconds: page.elapsed.as_secs_f64(),
        total_seconds: outcome.duration.as_secs_f64(),
    };

    Report {
        url: page.url.clone(),
        final_url: page.final_url.clone(),
        title,
        scraped_at: Utc::now(),
        site: profile.name.to_string(),
        method: outcome.method,
        success: !page.html.trim().is_empty(),
        html: page.html.clone(),
        text,
        extracted,
        tables,
        errors: page.warnings.clone(),
        metadata,
        quality: outcome.quality.clone(),
        assessment,
    }
}

pub struct SmartScraper {
    fast: Arc<dyn PageFetcher>,
    browser: Arc<dyn PageFetcher>,
    settings: Settings,
}

impl SmartScraper {
    pub fn new(fast: Arc<dyn PageFetcher>, browser: Arc<dyn PageFetcher>, settings: Settings) -> Self {
        Self {
            fast,
            browser,
            settings,
        }
    }

    /// Builds the real HTTP and headless-Chrome tiers from `settings`.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let fast = HttpFetcher::new(&settings.http)?;
        let browser = BrowserFetcher::new(&settings.browser, &settings.http);
        Ok(Self::new(Arc::new(fast), Arc::new(browser), settings))
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Runs the configured quality check on fast-tier HTML.
    #[must_use]
    pub fn check_quality(&self, html: &str) -> QualityReport {
        evaluate(
            self.settings.quality.check,
            html,
            self.settings.quality_threshold(),
        )
    }

    /// Smart scrape with the profile detected from the URL.
    pub async fn scrape(&self, url: &str) -> Result<Outcome> {
        self.scrape_with_profile(url, profile_for_url(url)).await
    }

    pub async fn scrape_with_profile(&self, url: &str, profile: SiteProfile) -> Result<Outcome> {
        validate_url(url)?;
        let start = Instant::now();
        info!("Smart scraping {} ({} profile)", url, profile.name);

        let (fast_reason, quality) = match self.fast.fetch(url, &profile).await {
            Ok(page) => {
                let quality = self.check_quality(&page.html);
                if quality.has_data() {
                    info!(
                        "Fast method found meaningful data (score {} > {})",
                        quality.score, quality.threshold
                    );
                    return Ok(Outcome {
                        page,
                        method: Method::Fast,
                        duration: start.elapsed(),
                        quality: Some(quality),
                        profile,
                    });
                }
                warn!(
                    "Insufficient data from fast method (score {} <= {}), trying browser...",
                    quality.score, quality.threshold
                );
                (
                    format!(
                        "insufficient content (score {} <= {})",
                        quality.score, quality.threshold
                    ),
                    Some(quality),
                )
            }
            Err(e) => {
                warn!("Fast method failed: {}, trying browser...", e);
                (e.to_string(), None)
            }
        };

        match self.browser.fetch(url, &profile).await {
            Ok(page) => {
                info!(
                    "Completed in {:.2}s using browser method",
                    start.elapsed().as_secs_f64()
                );
                Ok(Outcome {
                    page,
                    method: Method::Browser,
                    duration: start.elapsed(),
                    quality,
                    profile,
                })
            }
            Err(e) => {
                error!("Browser method failed: {}", e);
                Err(ScrapeError::AllTiersFailed {
                    fast: fast_reason,
                    browser: e.to_string(),
                })
            }
        }
    }

    /// Runs exactly one tier, skipping the quality gate.
    pub async fn force(&self, url: &str, method: Method) -> Result<Outcome> {
        validate_url(url)?;
        let profile = profile_for_url(url);
        let start = Instant::now();
        let fetcher = match method {
            Method::Fast => &self.fast,
            Method::Browser => &self.browser,
        };
        let page = fetcher.fetch(url, &profile).await?;
        let quality = (method == Method::Fast).then(|| self.check_quality(&page.html));
        Ok(Outcome {
            page,
            method,
            duration: start.elapsed(),
            quality,
            profile,
        })
    }

    pub async fn run(&self, url: &str, mode: FetchMode) -> Result<Outcome> {
        match mode {
            FetchMode::Auto => self.scrape(url).await,
            FetchMode::Fast => self.force(url, Method::Fast).await,
            FetchMode::Browser => self.force(url, Method::Browser).await,
        }
    }

    /// Smart-scrapes `url` `iterations` times, sleeping `pause` in between.
    pub async fn benchmark(&self, url: &str, iterations: usize, pause: Duration) -> Benchmark {
        let mut runs = Vec::with_capacity(iterations);
        for iteration in 1..=iterations {
            info!("Benchmark iteration {}/{}", iteration, iterations);
            let run = match self.scrape(url).await {
                Ok(outcome) => BenchmarkRun {
                    iteration,
                    method: Some(outcome.method),
                    duration_seconds: outcome.duration.as_secs_f64(),
                    content_length: outcome.page.html.len(),
                    error: None,
                },
                Err(e) => {
                    warn!("Iteration {} failed: {}", iteration, e);
                    BenchmarkRun {
                        iteration,
                        method: None,
                        duration_seconds: 0.0,
                        content_length: 0,
                        error: Some(e.to_string()),
                    }
                }
            };
            runs.push(run);
            if iteration < iterations && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }
        Benchmark::from_runs(url, runs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRun {
    pub iteration: usize,
    /// `None` when both tiers failed.
    pub method: Option<Method>,
    pub duration_seconds: f64,
    pub content_length: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodStats {
    pub runs: usize,
    pub avg_duration_seconds: f64,
    pub avg_content_length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub iterations: usize,
    pub runs: Vec<BenchmarkRun>,
    /// Keyed by method name.
    pub methods: BTreeMap<String, MethodStats>,
    /// Fraction of runs that produced a page, 0.0 to 1.0.
    pub success_rate: f64,
}

impl Benchmark {
    #[must_use]
    pub fn from_runs(url: &str, runs: Vec<BenchmarkRun>) -> Self {
        let mut methods: BTreeMap<String, MethodStats> = BTreeMap::new();
        for run in &runs {
            let Some(method) = run.method else { continue };
            let stats = methods.entry(method.to_string()).or_default();
            stats.runs += 1;
            stats.avg_duration_seconds += run.duration_seconds;
            stats.avg_content_length += run.content_length as f64;
        }
        for stats in methods.values_mut() {
            let n = stats.runs as f64;
            stats.avg_duration_seconds /= n;
            stats.avg_content_length /= n;
        }

        let successes = runs.iter().filter(|r| r.method.is_some()).count();
        let success_rate = if runs.is_empty() {
            0.0
        } else {
            successes as f64 / runs.len() as f64
        };

        Self {
            url: url.to_string(),
            timestamp: Utc::now(),
            iterations: runs.len(),
            runs,
            methods,
            success_rate,
        }
    }
}
