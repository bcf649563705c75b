//! Scraping one symbol across several financial sites.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::extract::dedup_limited;
use crate::pipeline::{Report, SmartScraper, build_report};
use crate::sites::{
    SiteProfile, Task, google_finance_url, marketwatch_url, morningstar_url, profile_for_url,
    yahoo_finance_url,
};
use crate::tables::TableData;

pub const DEFAULT_SITES: [&str; 3] = ["morningstar", "yahoo", "marketwatch"];

/// Amounts and dates kept in a dividend summary.
pub const SUMMARY_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteResult {
    pub site: String,
    pub url: String,
    pub report: Option<Report>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSurvey {
    pub symbol: String,
    pub results: Vec<SiteResult>,
}

impl SymbolSurvey {
    pub fn successes(&self) -> impl Iterator<Item = &Report> {
        self.results.iter().filter_map(|r| r.report.as_ref())
    }
}

/// URL and profile for a short site name; `None` for unknown sites.
#[must_use]
pub fn site_target(site: &str, symbol: &str) -> Option<(String, SiteProfile)> {
    let target = match site.to_lowercase().as_str() {
        "morningstar" => (
            morningstar_url(symbol, "dividends"),
            SiteProfile::morningstar().extended(
                &["quarterly dividend"],
                &["[class*=\"dividend\"]", "[data-testid*=\"dividend\"]"],
            ),
        ),
        "yahoo" | "yahoo_finance" => (yahoo_finance_url(symbol, "quote"), SiteProfile::yahoo_finance()),
        "marketwatch" => (marketwatch_url(symbol, "quote"), SiteProfile::marketwatch()),
        "google" | "google_finance" => (
            google_finance_url(symbol, "NASDAQ"),
            SiteProfile::google_finance(),
        ),
        _ => return None,
    };
    Some(target)
}

/// Scrapes one URL and files the outcome under `site`, success or not.
async fn scrape_target(
    scraper: &SmartScraper,
    site: String,
    url: String,
    profile: SiteProfile,
) -> SiteResult {
    match scraper.scrape_with_profile(&url, profile).await {
        Ok(outcome) => {
            let report = build_report(&outcome);
            info!(
                "  {}: {} tables, {} prices",
                site,
                report.tables.len(),
                report.extracted.currency_amounts.len()
            );
            SiteResult {
                site,
                url,
                report: Some(report),
                error: None,
            }
        }
        Err(e) => {
            warn!("  Failed to scrape {}: {}", url, e);
            SiteResult {
                site,
                url,
                report: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Scrapes `symbol` on each site in turn. Unknown site names are skipped.
pub async fn scrape_symbol(scraper: &SmartScraper, symbol: &str, sites: &[String]) -> SymbolSurvey {
    let symbol = symbol.to_uppercase();
    info!("Comprehensive scraping for {}", symbol);

    let mut results = Vec::new();
    for site in sites {
        let Some((url, profile)) = site_target(site, &symbol) else {
            warn!("Unknown site: {}", site);
            continue;
        };
        info!("Scraping {}...", site);
        results.push(scrape_target(scraper, site.clone(), url, profile).await);
    }

    SymbolSurvey { symbol, results }
}

/// Scrapes the URLs of a canned task, adding the task's keywords to each
/// site profile.
pub async fn scrape_task(scraper: &SmartScraper, symbol: &str, task: Task) -> SymbolSurvey {
    let symbol = symbol.to_uppercase();
    info!("Running {:?} for {}", task, symbol);

    let mut results = Vec::new();
    for url in task.urls(&symbol) {
        let profile = profile_for_url(&url).extended(task.keywords(), &[]);
        let site = profile.name.to_string();
        results.push(scrape_target(scraper, site, url, profile).await);
    }

    SymbolSurvey { symbol, results }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DividendSummary {
    pub total_dividend_amounts: Vec<String>,
    pub total_dividend_dates: Vec<String>,
    pub dividend_keywords: Vec<String>,
    pub financial_tables: Vec<TableData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DividendReport {
    pub symbol: String,
    pub scraped_urls: Vec<String>,
    pub results: Vec<SiteResult>,
    pub summary: DividendSummary,
}

/// Merges the successful reports into one dividend summary.
#[must_use]
pub fn summarize_dividends<'a, I>(reports: I) -> DividendSummary
where
    I: IntoIterator<Item = &'a Report>,
{
    let mut amounts = Vec::new();
    let mut dates = Vec::new();
    let mut keywords = Vec::new();
    let mut financial_tables = Vec::new();

    for report in reports.into_iter().filter(|r| r.success) {
        amounts.extend(report.extracted.currency_amounts.iter().cloned());
        dates.extend(report.extracted.dates.iter().cloned());
        keywords.extend(report.extracted.dividend_keywords().map(String::from));
        financial_tables.extend(report.financial_tables().cloned());
    }

    DividendSummary {
        total_dividend_amounts: dedup_limited(amounts, SUMMARY_LIMIT),
        total_dividend_dates: dedup_limited(dates, SUMMARY_LIMIT),
        dividend_keywords: dedup_limited(keywords, usize::MAX),
        financial_tables,
    }
}

/// Morningstar dividends page plus the Yahoo quote page, summarized.
pub async fn dividend_summary(scraper: &SmartScraper, symbol: &str) -> DividendReport {
    let symbol = symbol.to_uppercase();
    info!("Dividend analysis for {}", symbol);

    let urls = vec![
        morningstar_url(&symbol, "dividends"),
        yahoo_finance_url(&symbol, "quote"),
    ];

    let mut results = Vec::new();
    for url in &urls {
        info!("Checking: {}", url);
        let profile = profile_for_url(url);
        let site = profile.name.to_string();
        let result = scrape_target(scraper, site, url.clone(), profile).await;
        if let Some(report) = &result.report {
            let found: Vec<&str> = report.extracted.dividend_keywords().collect();
            info!("  Found dividend keywords: {:?}", found);
        }
        results.push(result);
    }

    let summary = summarize_dividends(results.iter().filter_map(|r| r.report.as_ref()));
    DividendReport {
        symbol,
        scraped_urls: urls,
        results,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_and_unknown_sites() {
        let (url, profile) = site_target("Morningstar", "KO").unwrap();
        assert_eq!(url, "https://www.morningstar.com/stocks/xnas/ko/dividends");
        assert_eq!(profile.name, "morningstar");
        assert!(profile.financial_keywords.iter().any(|k| k == "quarterly dividend"));

        let (url, _) = site_target("google", "KO").unwrap();
        assert_eq!(url, "https://www.google.com/finance/quote/KO:NASDAQ");

        assert!(site_target("bloomberg", "KO").is_none());
    }
}
