//! Saving reports to disk and the machine-readable content envelope.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::fetch::Method;
use crate::pipeline::{Outcome, Report};
use crate::quality::Assessment;

pub const RESULT_START: &str = "JSON_RESULT_START";
pub const RESULT_END: &str = "JSON_RESULT_END";

/// Characters of raw HTML quoted in stats output.
pub const SAMPLE_CHARS: usize = 500;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Full report as pretty JSON.
    #[default]
    Json,
    /// Raw HTML behind a comment header.
    Html,
    /// Human-readable text summary.
    Summary,
    /// Markdown stats with a short HTML sample.
    Stats,
}

impl OutputFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
            Self::Summary => "txt",
            Self::Stats => "md",
        }
    }

    /// Parses a config value such as `"json"`, case-insensitively.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        <Self as clap::ValueEnum>::from_str(name, true).ok()
    }
}

/// What the envelope's `content` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    Full,
    #[default]
    Stats,
}

/// Host without `www.`, dots replaced by underscores.
#[must_use]
pub fn url_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .map_or_else(
            || "unknown".to_string(),
            |host| host.trim_start_matches("www.").replace('.', "_"),
        )
}

/// First 8 hex digits of the URL's MD5.
#[must_use]
pub fn url_hash(url: &str) -> String {
    let digest = format!("{:x}", md5::compute(url.as_bytes()));
    digest[..8].to_string()
}

#[must_use]
pub fn output_filename(method: Method, url: &str, format: OutputFormat, at: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}_{}.{}",
        method,
        url_domain(url),
        url_hash(url),
        at.format("%Y%m%d_%H%M%S"),
        format.extension()
    )
}

#[must_use]
pub fn error_filename(url: &str, at: DateTime<Local>) -> String {
    format!(
        "{}_{}_{}_error.md",
        url_domain(url),
        url_hash(url),
        at.format("%Y%m%d_%H%M%S")
    )
}

fn sample(html: &str) -> String {
    html.chars().take(SAMPLE_CHARS).collect()
}

/// Markdown header shared by the stats file and the stats envelope.
#[must_use]
pub fn stats_markdown(url: &str, method: Method, duration: Duration, html: &str, at: DateTime<Local>) -> String {
    format!(
        "# Scraping Result Summary\n\n\
         **URL**: {url}\n\
         **Method**: {method}\n\
         **Duration**: {:.2}s\n\
         **Content Length**: {} characters\n\
         **Timestamp**: {}\n\
         **Status**: SUCCESS\n\n\
         **Sample Content** (first {SAMPLE_CHARS} characters):\n\
         ```html\n{}...\n```\n",
        duration.as_secs_f64(),
        html.chars().count(),
        at.format(TIMESTAMP_FORMAT),
        sample(html),
    )
}

fn html_with_header(report: &Report) -> String {
    let header = format!(
        "<!-- Scraping Result Summary\n\
         URL: {}\n\
         Method: {}\n\
         Duration: {:.2}s\n\
         Content Length: {} characters\n\
         Scraped At: {}\n\
         -->\n\n",
        report.url,
        report.method,
        report.metadata.total_seconds,
        report.metadata.html_length,
        report.scraped_at.with_timezone(&Local).format(TIMESTAMP_FORMAT),
    );
    header + &report.html
}

fn describe_assessment(assessment: &Assessment) -> String {
    format!(
        "{}/{} - {}",
        assessment.score,
        Assessment::MAX_SCORE,
        assessment.grade.describe()
    )
}

/// Plain-text digest of a report.
#[must_use]
pub fn summary_text(report: &Report) -> String {
    let mut out = String::new();
    let status = report
        .metadata
        .status
        .map_or_else(|| "n/a".to_string(), |s| s.to_string());

    // writing to a String cannot fail
    let _ = writeln!(out, "Financial Scraping Summary");
    let _ = writeln!(out, "==========================");
    let _ = writeln!(out, "URL:          {}", report.url);
    let _ = writeln!(out, "Title:        {}", report.title);
    let _ = writeln!(out, "Site profile: {}", report.site);
    let _ = writeln!(out, "Method:       {}", report.method);
    let _ = writeln!(out, "Scraped at:   {}", report.scraped_at.to_rfc3339());
    let _ = writeln!(
        out,
        "Timing:       {:.2}s fetch, {:.2}s total",
        report.metadata.fetch_seconds, report.metadata.total_seconds
    );
    let _ = writeln!(out, "HTTP status:  {status}");
    let _ = writeln!(out, "HTML length:  {} characters", report.metadata.html_length);
    let _ = writeln!(out, "Text length:  {} characters", report.metadata.text_length);

    let data = &report.extracted;
    let _ = writeln!(out, "\nCurrency amounts ({} found):", data.currency_amounts.len());
    for amount in data.currency_amounts.iter().take(10) {
        let _ = writeln!(out, "  - {amount}");
    }
    let _ = writeln!(out, "\nDates ({} found):", data.dates.len());
    for date in data.dates.iter().take(10) {
        let _ = writeln!(out, "  - {date}");
    }
    if !data.financial_keywords.is_empty() {
        let _ = writeln!(out, "\nFinancial keywords: {}", data.financial_keywords.join(", "));
    }
    if !data.financial_metrics.is_empty() {
        let _ = writeln!(out, "\nMetrics:");
        for (name, value) in &data.financial_metrics {
            let _ = writeln!(out, "  {name}: {value}");
        }
    }

    let _ = writeln!(
        out,
        "\nTables: {} ({} financial)",
        report.metadata.total_tables, report.metadata.financial_tables
    );
    for (i, table) in report.tables.iter().take(5).enumerate() {
        let _ = writeln!(
            out,
            "  [{}] {} #{}: {} rows x {} columns{}",
            i + 1,
            table.selector,
            table.index,
            table.metadata.total_rows,
            table.metadata.total_columns,
            if table.metadata.appears_financial { " (financial)" } else { "" }
        );
        if !table.headers.is_empty() {
            let _ = writeln!(out, "      headers: {}", table.headers.join(" | "));
        }
    }

    let _ = writeln!(out, "\nAssessment: {}", describe_assessment(&report.assessment));
    for rec in &report.assessment.recommendations {
        let _ = writeln!(out, "  - {rec}");
    }
    if !report.errors.is_empty() {
        let _ = writeln!(out, "\nWarnings:");
        for warning in &report.errors {
            let _ = writeln!(out, "  - {warning}");
        }
    }
    out
}

/// Renders a report in `format`.
pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(report)?,
        OutputFormat::Html => html_with_header(report),
        OutputFormat::Summary => summary_text(report),
        OutputFormat::Stats => stats_markdown(
            &report.url,
            report.method,
            Duration::from_secs_f64(report.metadata.total_seconds.max(0.0)),
            &report.html,
            report.scraped_at.with_timezone(&Local),
        ),
    })
}

fn write_file(dir: &Path, filename: &str, contents: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    fs::write(&path, contents)?;
    info!("Results saved to: {}", path.display());
    Ok(path)
}

/// Writes `report` under `dir` and returns the file path.
pub fn save_report(report: &Report, format: OutputFormat, dir: &Path) -> Result<PathBuf> {
    let filename = output_filename(report.method, &report.url, format, Local::now());
    write_file(dir, &filename, &render(report, format)?)
}

/// Writes the failure markdown for `url`.
pub fn save_error(url: &str, error: &str, dir: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let contents = format!(
        "# Scraping Error\n\n\
         **URL**: {url}\n\
         **Timestamp**: {}\n\
         **Status**: FAILED\n\n\
         ## Error Details\n\
         - {error}\n\
         - Check URL validity and network connection\n\
         - Possible anti-bot protection or site changes\n\n\
         ## Troubleshooting\n\
         1. Verify the URL is accessible in a browser\n\
         2. Check network connectivity\n\
         3. Make sure Chrome or Chromium is installed for the browser method\n\
         4. Try again later if the site is temporarily unavailable\n",
        now.format(TIMESTAMP_FORMAT),
    );
    write_file(dir, &error_filename(url, now), &contents)
}

/// Writes any serializable value as pretty JSON under `dir/filename`.
pub fn save_json<T: Serialize>(value: &T, dir: &Path, filename: &str) -> Result<PathBuf> {
    write_file(dir, filename, &serde_json::to_string_pretty(value)?)
}

/// JSON result handed back instead of files (`--return-content`, HTTP API).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentEnvelope {
    pub success: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,
    /// Seconds.
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
    pub timestamp: String,
    pub mode: ContentMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContentEnvelope {
    #[must_use]
    pub fn from_outcome(outcome: &Outcome, mode: ContentMode, include_content: bool) -> Self {
        let now = Local::now();
        let html = &outcome.page.html;
        let content = include_content.then(|| match mode {
            ContentMode::Full => html.clone(),
            ContentMode::Stats => stats_markdown(&outcome.page.url, outcome.method, outcome.duration, html, now),
        });
        Self {
            success: true,
            url: outcome.page.url.clone(),
            method: Some(outcome.method),
            duration: outcome.duration.as_secs_f64(),
            content_length: Some(html.chars().count()),
            timestamp: now.format(TIMESTAMP_FORMAT).to_string(),
            mode,
            content,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(url: &str, mode: ContentMode, duration: Duration, error: &str) -> Self {
        Self {
            success: false,
            url: url.to_string(),
            method: None,
            duration: duration.as_secs_f64(),
            content_length: None,
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            mode,
            content: None,
            error: Some(error.to_string()),
        }
    }

    /// Pretty JSON between the start and end marker lines.
    pub fn to_marked_string(&self) -> Result<String> {
        Ok(format!(
            "{RESULT_START}\n{}\n{RESULT_END}",
            serde_json::to_string_pretty(self)?
        ))
    }

    /// Recovers an envelope from output that contains the marker lines.
    #[must_use]
    pub fn from_marked(output: &str) -> Option<Self> {
        let start = output.find(RESULT_START)? + RESULT_START.len();
        let end = start + output[start..].find(RESULT_END)?;
        serde_json::from_str(output[start..end].trim()).ok()
    }
}
