//! Site profiles for popular financial websites, URL detection and URL
//! builders.

use serde::Serialize;
use std::time::Duration;

/// One step the browser tier performs before reading the rendered page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReadyStep {
    /// Wait until an element matching the CSS selector exists.
    Element { selector: String, timeout_secs: u64 },
    /// Wait until the page source contains any of the needles.
    ContentContains {
        needles: Vec<String>,
        timeout_secs: u64,
    },
    /// Give client-side scripts the profile's `wait_time` to settle.
    Settle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteProfile {
    pub name: &'static str,
    /// Browser page-load timeout in seconds.
    pub timeout: u64,
    /// Extra settle time after readiness steps, in seconds.
    pub wait_time: u64,
    /// Politeness delay before navigation, in seconds.
    pub download_delay: u64,
    pub table_selectors: Vec<String>,
    pub financial_keywords: Vec<String>,
    pub ready: Vec<ReadyStep>,
}

pub const PROFILE_NAMES: [&str; 5] = [
    "morningstar",
    "yahoo_finance",
    "marketwatch",
    "google_finance",
    "generic",
];

/// Substring of the lower-cased URL -> profile name, checked in order.
const URL_PATTERNS: [(&str, &str); 5] = [
    ("morningstar.com", "morningstar"),
    ("finance.yahoo.com", "yahoo_finance"),
    ("yahoo.com/quote", "yahoo_finance"),
    ("marketwatch.com", "marketwatch"),
    ("google.com/finance", "google_finance"),
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn element(selector: &str, timeout_secs: u64) -> ReadyStep {
    ReadyStep::Element {
        selector: selector.to_string(),
        timeout_secs,
    }
}

/// Table selectors used when a site has no specific list.
#[must_use]
pub fn default_table_selectors() -> Vec<String> {
    strings(&[
        "table",
        "[role=\"table\"]",
        "[class*=\"table\"]",
        "[class*=\"data-table\"]",
        "[class*=\"grid\"]",
        "[class*=\"financial\"]",
        "[data-testid*=\"table\"]",
    ])
}

#[must_use]
pub fn default_financial_keywords() -> Vec<String> {
    strings(&[
        "dividend",
        "yield",
        "earnings",
        "revenue",
        "profit",
        "ex-dividend",
        "payment date",
        "record date",
        "quarterly",
        "annual",
        "financial",
        "income",
        "balance sheet",
        "cash flow",
        "market cap",
        "price",
        "volume",
        "change",
        "high",
        "low",
    ])
}

impl SiteProfile {
    #[must_use]
    pub fn morningstar() -> Self {
        Self {
            name: "morningstar",
            timeout: 45,
            wait_time: 15,
            download_delay: 3,
            table_selectors: strings(&[
                "table",
                "[class*=\"table\"]",
                "[class*=\"dividend\"]",
                "[class*=\"data-table\"]",
                "[role=\"table\"]",
                "[data-testid*=\"table\"]",
                "[data-testid*=\"dividend\"]",
            ]),
            financial_keywords: strings(&[
                "dividend",
                "yield",
                "ex-dividend",
                "payment date",
                "record date",
                "quarterly",
                "annual",
                "dividend per share",
                "payout ratio",
                "dividend growth",
                "trailing yield",
                "forward yield",
            ]),
            ready: vec![
                element("main", 15),
                element("table, [class*=\"table\"], [role=\"table\"]", 15),
            ],
        }
    }

    #[must_use]
    pub fn yahoo_finance() -> Self {
        Self {
            name: "yahoo_finance",
            timeout: 30,
            wait_time: 10,
            download_delay: 2,
            table_selectors: strings(&[
                "table",
                "[data-test*=\"quote\"]",
                "[data-test*=\"financials\"]",
                "[class*=\"table\"]",
                "[class*=\"data-table\"]",
                "[data-symbol]",
                "section[data-testid]",
            ]),
            financial_keywords: strings(&[
                "market cap",
                "volume",
                "avg volume",
                "beta",
                "eps",
                "revenue",
                "profit margin",
                "operating margin",
                "return on equity",
                "price/earnings",
                "price/book",
                "debt/equity",
                "current ratio",
            ]),
            ready: vec![
                element("[data-test*=\"quote\"], #Main, main", 15),
                ReadyStep::ContentContains {
                    needles: strings(&["$", "USD"]),
                    timeout_secs: 10,
                },
            ],
        }
    }

    #[must_use]
    pub fn marketwatch() -> Self {
        Self {
            name: "marketwatch",
            timeout: 25,
            wait_time: 8,
            download_delay: 2,
            table_selectors: strings(&[
                "table",
                "[class*=\"table\"]",
                "[class*=\"data-table\"]",
                ".region--primary table",
                "[data-module*=\"financials\"]",
            ]),
            financial_keywords: strings(&[
                "last price",
                "change",
                "volume",
                "market cap",
                "dividend yield",
                "p/e ratio",
                "earnings",
            ]),
            ready: vec![element(".region--primary, main, #maincontent", 15)],
        }
    }

    #[must_use]
    pub fn google_finance() -> Self {
        Self {
            name: "google_finance",
            timeout: 20,
            wait_time: 6,
            download_delay: 1,
            table_selectors: strings(&["table", "[class*=\"table\"]", "[jsname]", "[data-aid]"]),
            financial_keywords: strings(&[
                "price",
                "change",
                "volume",
                "market cap",
                "p/e ratio",
                "dividend yield",
            ]),
            ready: vec![element("body", 10), ReadyStep::Settle],
        }
    }

    #[must_use]
    pub fn generic() -> Self {
        Self {
            name: "generic",
            timeout: 30,
            wait_time: 10,
            download_delay: 3,
            table_selectors: default_table_selectors(),
            financial_keywords: default_financial_keywords(),
            ready: vec![element("body", 10), ReadyStep::Settle],
        }
    }

    #[must_use]
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Adds keywords and selectors on top of the profile's own lists.
    #[must_use]
    pub fn extended(mut self, keywords: &[&str], selectors: &[&str]) -> Self {
        self.financial_keywords.extend(strings(keywords));
        self.table_selectors.extend(strings(selectors));
        self
    }
}

/// Picks the profile whose URL pattern appears in `url`; generic otherwise.
#[must_use]
pub fn profile_for_url(url: &str) -> SiteProfile {
    let lower = url.to_lowercase();
    URL_PATTERNS
        .iter()
        .find(|(pattern, _)| lower.contains(pattern))
        .map_or_else(SiteProfile::generic, |(_, name)| profile_by_name(name))
}

/// Looks a profile up by name (`yahoo` and `google` are accepted as short
/// names); unknown names get the generic profile.
#[must_use]
pub fn profile_by_name(name: &str) -> SiteProfile {
    match name.to_lowercase().as_str() {
        "morningstar" => SiteProfile::morningstar(),
        "yahoo_finance" | "yahoo" => SiteProfile::yahoo_finance(),
        "marketwatch" => SiteProfile::marketwatch(),
        "google_finance" | "google" => SiteProfile::google_finance(),
        _ => SiteProfile::generic(),
    }
}

#[must_use]
pub fn morningstar_url(symbol: &str, page: &str) -> String {
    format!(
        "https://www.morningstar.com/stocks/xnas/{}/{}",
        symbol.to_lowercase(),
        page
    )
}

#[must_use]
pub fn yahoo_finance_url(symbol: &str, page: &str) -> String {
    let base = format!("https://finance.yahoo.com/quote/{}", symbol.to_uppercase());
    if page == "quote" {
        base
    } else {
        format!("{base}/{page}")
    }
}

#[must_use]
pub fn marketwatch_url(symbol: &str, page: &str) -> String {
    let base = format!(
        "https://www.marketwatch.com/investing/stock/{}",
        symbol.to_lowercase()
    );
    if page == "quote" {
        base
    } else {
        format!("{base}/{page}")
    }
}

#[must_use]
pub fn google_finance_url(symbol: &str, exchange: &str) -> String {
    format!(
        "https://www.google.com/finance/quote/{}:{}",
        symbol.to_uppercase(),
        exchange.to_uppercase()
    )
}

/// Canned multi-URL tasks for a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Task {
    DividendAnalysis,
    FinancialOverview,
    StockQuote,
}

impl Task {
    #[must_use]
    pub fn urls(self, symbol: &str) -> Vec<String> {
        match self {
            Self::DividendAnalysis => vec![
                morningstar_url(symbol, "dividends"),
                yahoo_finance_url(symbol, "quote"),
            ],
            Self::FinancialOverview => vec![
                yahoo_finance_url(symbol, "financials"),
                marketwatch_url(symbol, "financials"),
                morningstar_url(symbol, "financials"),
            ],
            Self::StockQuote => vec![
                yahoo_finance_url(symbol, "quote"),
                google_finance_url(symbol, "NASDAQ"),
                marketwatch_url(symbol, "quote"),
            ],
        }
    }

    #[must_use]
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::DividendAnalysis => &["dividend", "yield", "ex-dividend", "payment", "quarterly"],
            Self::FinancialOverview => &["revenue", "earnings", "profit", "margin", "cash flow"],
            Self::StockQuote => &["price", "volume", "change", "high", "low", "market cap"],
        }
    }
}
