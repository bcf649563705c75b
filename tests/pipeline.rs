//! Two-tier fallback behavior with stubbed tiers.

mod common;

use common::{DIVIDEND_PAGE, SHELL_PAGE, StubFetcher, scraper};
use finscrape::config::{HttpSettings, Settings};
use finscrape::fetch::{HttpFetcher, Method};
use finscrape::quality::QualityCheck;
use finscrape::survey;
use finscrape::{FetchMode, ScrapeError, SmartScraper, build_report};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const URL: &str = "https://www.morningstar.com/stocks/xnas/ko/dividends";

#[tokio::test]
async fn fast_tier_wins_when_content_is_rich() {
    let fast = StubFetcher::ok(Method::Fast, DIVIDEND_PAGE);
    let browser = StubFetcher::ok(Method::Browser, "<html></html>");
    let scraper = scraper(fast.clone(), browser.clone());

    let outcome = scraper.scrape(URL).await.unwrap();

    assert_eq!(outcome.method, Method::Fast);
    assert_eq!(outcome.profile.name, "morningstar");
    assert!(outcome.quality.as_ref().is_some_and(|q| q.has_data()));
    assert_eq!(fast.calls(), 1);
    assert_eq!(browser.calls(), 0);
}

#[tokio::test]
async fn shell_page_falls_back_to_browser() {
    let fast = StubFetcher::ok(Method::Fast, SHELL_PAGE);
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let scraper = scraper(fast.clone(), browser.clone());

    let outcome = scraper.scrape(URL).await.unwrap();

    assert_eq!(outcome.method, Method::Browser);
    assert_eq!(outcome.page.html, DIVIDEND_PAGE);
    let quality = outcome.quality.expect("fast tier was scored");
    assert!(!quality.has_data());
    assert_eq!(browser.calls(), 1);
}

#[tokio::test]
async fn empty_fast_body_falls_back_under_default_check() {
    let fast = StubFetcher::ok(Method::Fast, "");
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let scraper = SmartScraper::new(fast.clone(), browser.clone(), Settings::default());

    let outcome = scraper.scrape(URL).await.unwrap();

    assert_eq!(outcome.method, Method::Browser);
    assert_eq!(outcome.page.html, DIVIDEND_PAGE);
    assert_eq!(fast.calls(), 1);
    assert_eq!(browser.calls(), 1);
}

#[tokio::test]
async fn fast_error_falls_back_to_browser() {
    let fast = StubFetcher::failing(Method::Fast, "connection reset");
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let outcome = scraper(fast, browser).scrape(URL).await.unwrap();

    assert_eq!(outcome.method, Method::Browser);
    assert!(outcome.quality.is_none());
}

#[tokio::test]
async fn both_tiers_failing_reports_both_reasons() {
    let fast = StubFetcher::failing(Method::Fast, "connection reset");
    let browser = StubFetcher::failing(Method::Browser, "chrome not found");
    let err = scraper(fast, browser).scrape(URL).await.unwrap_err();

    match err {
        ScrapeError::AllTiersFailed { fast, browser } => {
            assert!(fast.contains("connection reset"));
            assert!(browser.contains("chrome not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn insufficient_content_is_named_in_failure() {
    let fast = StubFetcher::ok(Method::Fast, SHELL_PAGE);
    let browser = StubFetcher::failing(Method::Browser, "chrome not found");
    let err = scraper(fast, browser).scrape(URL).await.unwrap_err();
    assert!(err.to_string().contains("insufficient content"));
}

#[tokio::test]
async fn invalid_url_is_rejected_before_fetching() {
    let fast = StubFetcher::ok(Method::Fast, DIVIDEND_PAGE);
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let scraper = scraper(fast.clone(), browser.clone());

    let err = scraper.scrape("http://").await.unwrap_err();
    assert!(matches!(err, ScrapeError::InvalidUrl { .. }));
    assert_eq!(fast.calls() + browser.calls(), 0);
}

#[tokio::test]
async fn forced_methods_use_one_tier() {
    let fast = StubFetcher::ok(Method::Fast, SHELL_PAGE);
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let scraper = scraper(fast.clone(), browser.clone());

    let outcome = scraper.run(URL, FetchMode::Fast).await.unwrap();
    assert_eq!(outcome.method, Method::Fast);
    assert_eq!(outcome.page.html, SHELL_PAGE);
    assert_eq!(browser.calls(), 0);

    let outcome = scraper.run(URL, FetchMode::Browser).await.unwrap();
    assert_eq!(outcome.method, Method::Browser);
    assert!(outcome.quality.is_none());
    assert_eq!(fast.calls(), 1);
}

#[tokio::test]
async fn dividend_cells_check_can_gate_fallback() {
    let mut settings = Settings::default();
    settings.quality.check = QualityCheck::DividendCells;

    // plenty of dividend words, but no dividend-sized values in cells
    let wordy = "<html><body><table><tr><td>dividend dividend dividend yield</td></tr></table>\
                 <p>$12.50 $13.75 dividend payout quarterly annual</p></body></html>";
    let fast = StubFetcher::ok(Method::Fast, wordy);
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let scraper = SmartScraper::new(fast, browser, settings);

    let outcome = scraper.scrape(URL).await.unwrap();
    assert_eq!(outcome.method, Method::Browser);
}

#[tokio::test]
async fn benchmark_counts_methods() {
    let fast = StubFetcher::ok(Method::Fast, DIVIDEND_PAGE);
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let bench = scraper(fast, browser)
        .benchmark(URL, 3, Duration::ZERO)
        .await;

    assert_eq!(bench.iterations, 3);
    assert_eq!(bench.methods["fast"].runs, 3);
    assert!((bench.success_rate - 1.0).abs() < f64::EPSILON);
    assert!((bench.methods["fast"].avg_content_length - DIVIDEND_PAGE.len() as f64).abs() < 1e-9);
}

#[tokio::test]
async fn real_http_tier_against_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quote/KO"))
        .respond_with(ResponseTemplate::new(200).set_body_string(SHELL_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let fast = HttpFetcher::new(&HttpSettings {
        retry_base_delay_ms: 1,
        ..HttpSettings::default()
    })
    .unwrap();
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let scraper = SmartScraper::new(Arc::new(fast), browser.clone(), Settings::default());

    let outcome = scraper
        .scrape(&format!("{}/quote/KO", server.uri()))
        .await
        .unwrap();
    assert_eq!(outcome.method, Method::Browser);
    assert_eq!(browser.calls(), 1);

    let report = build_report(&outcome);
    assert_eq!(report.title, "KO Dividends");
    assert!(report.extracted.currency_amounts.contains(&"$0.485".to_string()));
}

#[tokio::test]
async fn symbol_survey_skips_unknown_sites() {
    let fast = StubFetcher::ok(Method::Fast, DIVIDEND_PAGE);
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let scraper = scraper(fast, browser);

    let sites = ["morningstar", "bloomberg", "yahoo"].map(String::from);
    let survey = survey::scrape_symbol(&scraper, "ko", &sites).await;

    assert_eq!(survey.symbol, "KO");
    let names: Vec<&str> = survey.results.iter().map(|r| r.site.as_str()).collect();
    assert_eq!(names, vec!["morningstar", "yahoo"]);
    assert_eq!(survey.successes().count(), 2);
    assert!(survey.results[0].url.ends_with("/ko/dividends"));
}

#[tokio::test]
async fn dividend_summary_merges_and_dedups() {
    let fast = StubFetcher::ok(Method::Fast, DIVIDEND_PAGE);
    let browser = StubFetcher::ok(Method::Browser, DIVIDEND_PAGE);
    let report = survey::dividend_summary(&scraper(fast, browser), "ko").await;

    assert_eq!(report.scraped_urls.len(), 2);
    assert_eq!(report.results.len(), 2);
    let summary = &report.summary;
    assert_eq!(summary.total_dividend_amounts, vec!["$0.485"]);
    assert_eq!(summary.total_dividend_dates, vec!["2024-09-13", "2024-06-14"]);
    assert!(summary.dividend_keywords.iter().any(|k| k == "dividend"));
    // one financial table per page
    assert_eq!(summary.financial_tables.len(), 2);
}

#[tokio::test]
async fn failed_site_is_kept_with_its_error() {
    let fast = StubFetcher::failing(Method::Fast, "connection reset");
    let browser = StubFetcher::failing(Method::Browser, "chrome not found");
    let scraper = scraper(fast, browser);

    let sites = ["yahoo".to_string()];
    let survey = survey::scrape_symbol(&scraper, "ko", &sites).await;

    assert_eq!(survey.results.len(), 1);
    let result = &survey.results[0];
    assert_eq!(result.site, "yahoo");
    assert!(result.report.is_none());
    assert!(result.error.as_deref().unwrap().contains("chrome not found"));
    assert_eq!(survey.successes().count(), 0);
}
