//! Regex extraction of currency amounts, dates, percentages, keywords and a
//! few named metrics from page text.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

pub const MAX_CURRENCY_AMOUNTS: usize = 50;
pub const MAX_DATES: usize = 50;
pub const MAX_PERCENTAGES: usize = 30;

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("(?i){p}")).expect("valid regex"))
        .collect()
}

static CURRENCY: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\$[0-9,]+\.?[0-9]*",
        r"[0-9,]+\.?[0-9]*\s*USD",
        r"[0-9,]+\.?[0-9]*\s*\$",
    ])
});

static DATES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\d{1,2}/\d{1,2}/\d{4}",
        r"\d{4}-\d{2}-\d{2}",
        r"(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]* \d{1,2},? \d{4}",
        r"\d{1,2} (?:January|February|March|April|May|June|July|August|September|October|November|December) \d{4}",
    ])
});

static PERCENTAGES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[r"[0-9,]+\.?[0-9]*\s*%", r"[0-9,]+\.?[0-9]*\s*percent"])
});

/// (metric name, pattern with one capture group)
static METRICS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("dividend_yield", r"(?i)dividend yield[:\s]*([0-9.]+%)"),
        ("market_cap", r"(?i)market cap[:\s]*(\$[0-9.,]+[BMT]?)"),
        ("pe_ratio", r"(?i)p/e ratio[:\s]*([0-9.]+)"),
    ]
    .into_iter()
    .map(|(name, p)| (name, Regex::new(p).expect("valid regex")))
    .collect()
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub currency_amounts: Vec<String>,
    pub dates: Vec<String>,
    pub percentages: Vec<String>,
    pub financial_keywords: Vec<String>,
    pub financial_metrics: BTreeMap<String, String>,
}

impl ExtractedData {
    /// Keywords mentioning dividends.
    pub fn dividend_keywords(&self) -> impl Iterator<Item = &str> {
        self.financial_keywords
            .iter()
            .map(String::as_str)
            .filter(|k| k.to_lowercase().contains("dividend"))
    }
}

/// Keeps the first occurrence of each value, at most `limit` values.
pub fn dedup_limited<I>(values: I, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .take(limit)
        .collect()
}

fn find_all(patterns: &[Regex], text: &str) -> Vec<String> {
    patterns
        .iter()
        .flat_map(|re| re.find_iter(text).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// Runs every pattern over `text` and checks it for `keywords`.
#[must_use]
pub fn extract_financial_data(text: &str, keywords: &[String]) -> ExtractedData {
    let lower = text.to_lowercase();
    let financial_keywords = dedup_limited(
        keywords
            .iter()
            .filter(|k| lower.contains(&k.to_lowercase()))
            .cloned(),
        usize::MAX,
    );

    ExtractedData {
        currency_amounts: dedup_limited(find_all(&CURRENCY, text), MAX_CURRENCY_AMOUNTS),
        dates: dedup_limited(find_all(&DATES, text), MAX_DATES),
        percentages: dedup_limited(find_all(&PERCENTAGES, text), MAX_PERCENTAGES),
        financial_keywords,
        financial_metrics: extract_metrics(text),
    }
}

/// First match of each named metric.
#[must_use]
pub fn extract_metrics(text: &str) -> BTreeMap<String, String> {
    METRICS
        .iter()
        .filter_map(|(name, re)| {
            re.captures(text)
                .and_then(|c| c.get(1))
                .map(|m| ((*name).to_string(), m.as_str().to_string()))
        })
        .collect()
}
