//! Content-quality heuristics.
//!
//! The fast tier often gets back a page skeleton whose tables are filled in
//! later by JavaScript. These checks count financial-looking patterns in the
//! fetched HTML and decide whether it is good enough or the page has to be
//! rendered in a browser.

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::tables::{TableData, visible_text};

/// Which heuristic gates the browser fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum QualityCheck {
    /// Weighted count of dividend words, tables, prices and data-classed cells.
    #[default]
    Broad,
    /// Strict count of dividend-sized values in table cells.
    DividendCells,
}

/// (pattern, weight) pairs counted over lower-cased page text.
static DIVIDEND_PATTERNS: LazyLock<Vec<(Regex, u32)>> = LazyLock::new(|| {
    [
        (r"\$?\d+\.\d{2,3}", 1),
        (r"dividend", 3),
        (r"yield", 1),
        (r"payout", 1),
        (r"ex-date", 1),
        (r"quarterly", 1),
        (r"annual", 1),
    ]
    .into_iter()
    .map(|(p, w)| (Regex::new(p).expect("valid regex"), w))
    .collect()
});

static PRICE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"\$\d+\.\d{2}", r"\d+\.\d{2}%", r"\d{1,3}(,\d{3})*\.\d{2}"]
        .into_iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

static DATA_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(financial|dividend|price|data|value)").expect("valid regex"));

static DIVIDEND_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0\.[5-9]\d\b|\b[1-9]\.\d{2}\b").expect("valid regex"));

static STRUCTURED_DIVIDEND_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?is)Dividend Per Share", r"(?is)<td[^>]*>0\.\d{2}</td>"]
        .into_iter()
        .map(|p| Regex::new(p).expect("valid regex"))
        .collect()
});

static TABLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("table").expect("valid selector"));
static ROW_OR_CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr, td").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td, th").expect("valid selector"));

const FINANCIAL_HEADER_KEYWORDS: [&str; 11] = [
    "dividend", "yield", "price", "date", "amount", "payment", "ex-date", "record", "earnings",
    "revenue", "profit",
];

/// Phrases that mark an anti-bot interstitial rather than the real page.
const CHALLENGE_INDICATORS: [&str; 10] = [
    "javascript is disabled",
    "awswaf",
    "recaptcha",
    "hcaptcha",
    "captcha",
    "verify you are human",
    "prove you are not a robot",
    "robot check",
    "security check",
    "just a moment",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indicators {
    pub dividend_data: u32,
    pub financial_tables: u32,
    pub price_data: u32,
    pub total_elements: u32,
    /// Dividend-sized values found in table cells.
    pub dividend_cells: u32,
    /// Structural dividend patterns found in the raw HTML.
    pub pattern_matches: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub check: QualityCheck,
    pub indicators: Indicators,
    pub score: u32,
    pub threshold: u32,
}

impl QualityReport {
    /// Score strictly above the threshold.
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.score > self.threshold
    }
}

fn count_matches(re: &Regex, text: &str) -> u32 {
    u32::try_from(re.find_iter(text).count()).unwrap_or(u32::MAX)
}

fn count_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Broad check: dividend words, tables, price patterns and data-classed rows.
///
/// `score = dividend*2 + tables*5 + prices*3 + elements`.
#[must_use]
pub fn detect_financial_data(html: &str, threshold: u32) -> QualityReport {
    let document = Html::parse_document(html);
    let text = visible_text(&document).to_lowercase();

    let mut indicators = Indicators::default();

    for (re, weight) in DIVIDEND_PATTERNS.iter() {
        indicators.dividend_data += count_matches(re, &text) * weight;
    }

    indicators.financial_tables = count_u32(document.select(&TABLE_SEL).count());

    indicators.total_elements = count_u32(
        document
            .select(&ROW_OR_CELL_SEL)
            .filter(|el| el.value().classes().any(|c| DATA_CLASS.is_match(c)))
            .count(),
    );

    for re in PRICE_PATTERNS.iter() {
        indicators.price_data += count_matches(re, &text);
    }

    let score = indicators.dividend_data * 2
        + indicators.financial_tables * 5
        + indicators.price_data * 3
        + indicators.total_elements;

    QualityReport {
        check: QualityCheck::Broad,
        indicators,
        score,
        threshold,
    }
}

/// Strict check: actual dividend values sitting in table cells.
///
/// `score = cells*3 + patterns*5`. Empty input scores zero.
#[must_use]
pub fn has_meaningful_content(html: &str, threshold: u32) -> QualityReport {
    let mut indicators = Indicators::default();

    if !html.trim().is_empty() {
        let document = Html::parse_document(html);
        indicators.dividend_cells = count_u32(
            document
                .select(&CELL_SEL)
                .filter(|cell| {
                    let text = cell.text().collect::<String>();
                    DIVIDEND_VALUE.is_match(text.trim())
                })
                .count(),
        );
        indicators.pattern_matches = count_u32(
            STRUCTURED_DIVIDEND_PATTERNS
                .iter()
                .filter(|re| re.is_match(html))
                .count(),
        );
    }

    let score = indicators.dividend_cells * 3 + indicators.pattern_matches * 5;

    QualityReport {
        check: QualityCheck::DividendCells,
        indicators,
        score,
        threshold,
    }
}

/// Runs whichever check is selected.
#[must_use]
pub fn evaluate(check: QualityCheck, html: &str, threshold: u32) -> QualityReport {
    match check {
        QualityCheck::Broad => detect_financial_data(html, threshold),
        QualityCheck::DividendCells => has_meaningful_content(html, threshold),
    }
}

/// A table is financial if a header mentions a financial term or at least
/// two of its first five rows carry `$` or `%`.
#[must_use]
pub fn is_financial_table(table: &TableData) -> bool {
    let headers_text = table.headers.join(" ").to_lowercase();
    let header_score = FINANCIAL_HEADER_KEYWORDS
        .iter()
        .filter(|k| headers_text.contains(*k))
        .count();

    let row_score = table
        .rows
        .iter()
        .take(5)
        .filter(|row| {
            let row_text = row.join(" ");
            row_text.contains('$') || row_text.contains('%')
        })
        .count();

    header_score >= 1 || row_score >= 2
}

/// Returns the first anti-bot indicator present in the page, if any.
#[must_use]
pub fn detect_challenge(html: &str) -> Option<&'static str> {
    let lower = html.to_lowercase();
    CHALLENGE_INDICATORS
        .iter()
        .copied()
        .find(|indicator| lower.contains(indicator))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Grade {
    #[must_use]
    pub fn describe(self) -> &'static str {
        match self {
            Self::Excellent => "Excellent - likely captured dividend data successfully",
            Self::Good => "Good - some dividend data captured, may need refinement",
            Self::Fair => "Fair - limited dividend data, more work needed",
            Self::Poor => "Poor - no clear dividend data captured",
        }
    }
}

/// Post-scrape success score out of [`Assessment::MAX_SCORE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub score: u8,
    pub grade: Grade,
    pub recommendations: Vec<String>,
}

impl Assessment {
    pub const MAX_SCORE: u8 = 8;
}

/// Inputs to [`assess`]; kept separate so it does not need a full report.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssessmentInput {
    pub dividend_keywords: usize,
    pub currency_amounts: usize,
    pub dates: usize,
    pub tables: usize,
    pub text_length: usize,
}

#[must_use]
pub fn assess(input: AssessmentInput) -> Assessment {
    let mut score = 0u8;
    if input.dividend_keywords > 0 {
        score += 2;
    }
    if input.currency_amounts > 0 {
        score += 2;
    }
    if input.dates > 0 {
        score += 2;
    }
    if input.tables > 0 {
        score += 1;
    }
    if input.text_length > 100_000 {
        score += 1;
    }

    let grade = match score {
        6.. => Grade::Excellent,
        4..=5 => Grade::Good,
        2..=3 => Grade::Fair,
        _ => Grade::Poor,
    };

    let mut recommendations = Vec::new();
    if score < 4 {
        recommendations.push("Try increasing wait times for JavaScript rendering".to_string());
        recommendations.push("Check if the page requires interaction (clicks, scrolling)".to_string());
    }
    if input.tables == 0 {
        recommendations.push("No tables found - data may live in div-based pseudo-tables".to_string());
    }
    if input.text_length < 50_000 {
        recommendations.push("Low text content suggests incomplete page loading".to_string());
    }

    Assessment {
        score,
        grade,
        recommendations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHELL: &str = r#"<html><body><div id="__nuxt"><main></main></div>
        <script>window.__NUXT__={"dividend":"0.25","yield":"0.44"}</script></body></html>"#;

    fn dividend_table(rows: usize) -> String {
        let mut html = String::from(
            "<html><body><h1>Dividend History</h1><table class=\"dividend-table\">\
             <tr><th>Ex-Date</th><th>Dividend Per Share</th><th>Yield</th></tr>",
        );
        for i in 0..rows {
            html.push_str(&format!(
                "<tr class=\"data-row\"><td>2024-0{}-12</td><td>0.{}</td><td>1.{}%</td></tr>",
                i % 9 + 1,
                51 + i,
                10 + i
            ));
        }
        html.push_str("</table></body></html>");
        html
    }

    #[test]
    fn script_only_shell_is_insufficient() {
        let report = detect_financial_data(EMPTY_SHELL, 20);
        assert_eq!(report.indicators.financial_tables, 0);
        assert_eq!(report.indicators.dividend_data, 0);
        assert!(!report.has_data());
    }

    #[test]
    fn rendered_dividend_table_is_sufficient() {
        let report = detect_financial_data(&dividend_table(4), 20);
        assert_eq!(report.indicators.financial_tables, 1);
        // four rows with the "data-row" class
        assert_eq!(report.indicators.total_elements, 4);
        assert!(report.indicators.price_data >= 4);
        assert!(report.has_data(), "score {}", report.score);
    }

    #[test]
    fn broad_score_weights() {
        // one table (5), "dividend" x1 (3 * 2 = 6) => 11
        let report = detect_financial_data("<table><tr><td>dividend</td></tr></table>", 20);
        assert_eq!(report.indicators.dividend_data, 3);
        assert_eq!(report.score, 3 * 2 + 5);
        assert!(!report.has_data());
    }

    #[test]
    fn dividend_cells_check() {
        assert_eq!(has_meaningful_content("", 10).score, 0);

        let report = has_meaningful_content(&dividend_table(2), 10);
        // 0.51, 0.52 and 1.10%, 1.11% all match the dividend value pattern
        assert_eq!(report.indicators.dividend_cells, 4);
        // "Dividend Per Share" header and a bare <td>0.51</td> cell
        assert_eq!(report.indicators.pattern_matches, 2);
        assert_eq!(report.score, 4 * 3 + 2 * 5);
        assert!(report.has_data());

        let sparse = has_meaningful_content("<table><tr><td>0.12</td></tr></table>", 10);
        assert_eq!(sparse.indicators.dividend_cells, 0);
        assert_eq!(sparse.indicators.pattern_matches, 1);
        assert!(!sparse.has_data());
    }

    #[test]
    fn financial_table_rules() {
        let by_header = TableData::new("table", 0, vec!["Payment Date".into()], vec![]);
        assert!(by_header.metadata.appears_financial);

        let rows = vec![
            vec!["a".into(), "$1".into()],
            vec!["b".into(), "2%".into()],
        ];
        assert!(is_financial_table(&TableData::new("table", 0, vec!["Name".into()], rows)));

        let one_row = vec![vec!["a".into(), "$1".into()], vec!["b".into(), "2".into()]];
        assert!(!is_financial_table(&TableData::new("table", 0, vec![], one_row)));
    }

    #[test]
    fn challenge_pages_are_detected() {
        assert_eq!(
            detect_challenge("<title>Just a moment...</title>"),
            Some("just a moment")
        );
        assert_eq!(detect_challenge("<script src=\"awswaf.js\">"), Some("awswaf"));
        assert_eq!(detect_challenge("<table><td>0.25</td></table>"), None);
    }

    #[test]
    fn assessment_grades() {
        let full = assess(AssessmentInput {
            dividend_keywords: 2,
            currency_amounts: 5,
            dates: 3,
            tables: 1,
            text_length: 150_000,
        });
        assert_eq!(full.score, Assessment::MAX_SCORE);
        assert_eq!(full.grade, Grade::Excellent);
        assert!(full.recommendations.is_empty());

        let weak = assess(AssessmentInput {
            dates: 1,
            ..AssessmentInput::default()
        });
        assert_eq!(weak.score, 2);
        assert_eq!(weak.grade, Grade::Fair);
        assert!(!weak.recommendations.is_empty());

        assert_eq!(assess(AssessmentInput::default()).grade, Grade::Poor);
    }
}
