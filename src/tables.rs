//! Table extraction and page text helpers.
//!
//! Works on an already-parsed [`Html`] document so the same code serves
//! both the plain HTTP tier and browser-rendered pages.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::warn;

use crate::quality::is_financial_table;

/// Rows kept per table.
pub const MAX_TABLE_ROWS: usize = 50;

static HEADER_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("th, thead td, [role='columnheader']").expect("valid selector")
});
static ROW_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr, [role='row']").expect("valid selector"));
static CELL_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("td, th, [role='cell'], [role='columnheader']").expect("valid selector")
});
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("valid selector"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub total_rows: usize,
    pub total_columns: usize,
    pub appears_financial: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    /// Selector that first matched this element.
    pub selector: String,
    /// Position among that selector's matches.
    pub index: usize,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub metadata: TableMetadata,
}

impl TableData {
    /// Builds a table from headers and rows and fills in its metadata.
    #[must_use]
    pub fn new(selector: &str, index: usize, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self {
            selector: selector.to_string(),
            index,
            headers,
            rows,
            metadata: TableMetadata::default(),
        };
        table.metadata = TableMetadata {
            total_rows: table.rows.len(),
            total_columns: if table.headers.is_empty() {
                table.rows.first().map_or(0, Vec::len)
            } else {
                table.headers.len()
            },
            appears_financial: is_financial_table(&table),
        };
        table
    }

    fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn read_table(selector: &str, index: usize, table: ElementRef<'_>) -> TableData {
    let headers = table
        .select(&HEADER_SEL)
        .map(element_text)
        .filter(|h| !h.is_empty())
        .collect();

    let rows = table
        .select(&ROW_SEL)
        .take(MAX_TABLE_ROWS)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&CELL_SEL).map(element_text).collect();
            cells.iter().any(|c| !c.is_empty()).then_some(cells)
        })
        .collect();

    TableData::new(selector, index, headers, rows)
}

/// Extracts every table-like element matched by `selectors`.
///
/// An element matched by more than one selector is reported once, under
/// the first selector that matched it. Invalid selectors are skipped with
/// a warning.
#[must_use]
pub fn extract_tables(document: &Html, selectors: &[String]) -> Vec<TableData> {
    let mut seen = HashSet::new();
    let mut tables = Vec::new();

    for selector in selectors {
        let sel = match Selector::parse(selector) {
            Ok(sel) => sel,
            Err(e) => {
                warn!("Error extracting tables with selector '{}': {}", selector, e);
                continue;
            }
        };
        for (i, element) in document.select(&sel).enumerate() {
            if !seen.insert(element.id()) {
                continue;
            }
            let table = read_table(selector, i, element);
            if !table.is_empty() {
                tables.push(table);
            }
        }
    }

    tables
}

/// Text of the page outside `script`, `style`, `noscript` and `template`,
/// one trimmed text node per line.
#[must_use]
pub fn visible_text(document: &Html) -> String {
    let mut lines = Vec::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        let trimmed = text.trim();
        if !hidden && !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }
    lines.join("\n")
}

#[must_use]
pub fn page_title(document: &Html) -> String {
    document
        .select(&TITLE_SEL)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIVIDEND_PAGE: &str = r#"
        <html><head><title> AAPL Dividends </title><script>var x = "$9.99";</script></head>
        <body>
          <table class="mds-table">
            <thead><tr><th>Ex-Date</th><th>Amount</th><th></th></tr></thead>
            <tbody>
              <tr><td>2024-08-12</td><td>$0.25</td></tr>
              <tr><td></td><td> </td></tr>
              <tr><td>2024-05-10</td><td>$0.25</td></tr>
            </tbody>
          </table>
          <div role="table"><div role="row"><span role="cell">Yield</span><span role="cell">0.44%</span></div></div>
          <table></table>
        </body></html>"#;

    fn selectors(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn extracts_headers_rows_and_metadata() {
        let doc = Html::parse_document(DIVIDEND_PAGE);
        let tables = extract_tables(&doc, &selectors(&["table"]));
        assert_eq!(tables.len(), 1);
        let t = &tables[0];
        assert_eq!(t.headers, vec!["Ex-Date", "Amount"]);
        // header row counts as a row, the blank row is dropped
        assert_eq!(t.rows.len(), 3);
        assert_eq!(t.rows[1], vec!["2024-08-12", "$0.25"]);
        assert_eq!(t.metadata.total_columns, 2);
        assert!(t.metadata.appears_financial);
    }

    #[test]
    fn role_tables_and_duplicate_matches() {
        let doc = Html::parse_document(DIVIDEND_PAGE);
        let tables = extract_tables(
            &doc,
            &selectors(&["table", "[class*=\"table\"]", "[role=\"table\"]", "td:::bad"]),
        );
        // the classed <table> is the same element as "table" and is reported once
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[1].selector, "[role=\"table\"]");
        assert_eq!(tables[1].rows, vec![vec!["Yield".to_string(), "0.44%".to_string()]]);
        assert_eq!(tables[1].metadata.total_columns, 2);
    }

    #[test]
    fn visible_text_skips_scripts() {
        let doc = Html::parse_document(DIVIDEND_PAGE);
        let text = visible_text(&doc);
        assert!(text.contains("Ex-Date"));
        assert!(text.contains("2024-05-10"));
        assert!(!text.contains("$9.99"));
        assert_eq!(page_title(&doc), "AAPL Dividends");
    }

    #[test]
    fn missing_title_is_empty() {
        let doc = Html::parse_document("<p>no title</p>");
        assert_eq!(page_title(&doc), "");
    }
}
