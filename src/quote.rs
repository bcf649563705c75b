//! Quote history and dividend events from the Yahoo Finance API, as a
//! cross-check for scraped prices.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;
use tracing::info;
use yahoo_finance_api as yahoo;

use crate::error::{Result, ScrapeError};

/// One daily bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl From<&yahoo::Quote> for PricePoint {
    fn from(q: &yahoo::Quote) -> Self {
        Self {
            timestamp: q.timestamp as i64,
            open: q.open,
            high: q.high,
            low: q.low,
            close: q.close,
            volume: q.volume as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub date: DateTime<Utc>,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteHistory {
    pub symbol: String,
    pub points: Vec<PricePoint>,
    pub dividends: Vec<DividendEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub symbol: String,
    pub trading_days: usize,
    pub start_close: f64,
    pub latest_close: f64,
    pub percent_change: f64,
    pub highest: f64,
    pub lowest: f64,
    pub avg_volume: f64,
}

impl fmt::Display for QuoteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Analysis of {} over {} trading days:\n\
             - Starting price: ${:.2}\n\
             - Latest price: ${:.2}\n\
             - Change: {:.2}%\n\
             - Highest price: ${:.2}\n\
             - Lowest price: ${:.2}\n\
             - Average daily volume: {:.0}",
            self.symbol,
            self.trading_days,
            self.start_close,
            self.latest_close,
            self.percent_change,
            self.highest,
            self.lowest,
            self.avg_volume
        )
    }
}

/// Summarizes a price series; `None` when there are no points.
#[must_use]
pub fn analyze(symbol: &str, points: &[PricePoint]) -> Option<QuoteSummary> {
    let first = points.first()?;
    let last = points.last()?;

    let mut highest = first.high;
    let mut lowest = first.low;
    let mut total_volume: u64 = 0;
    for point in points {
        highest = highest.max(point.high);
        lowest = lowest.min(point.low);
        total_volume = total_volume.saturating_add(point.volume);
    }

    let percent_change = if first.close == 0.0 {
        0.0
    } else {
        (last.close - first.close) / first.close * 100.0
    };

    Some(QuoteSummary {
        symbol: symbol.to_uppercase(),
        trading_days: points.len(),
        start_close: first.close,
        latest_close: last.close,
        percent_change,
        highest,
        lowest,
        avg_volume: total_volume as f64 / points.len() as f64,
    })
}

fn to_offset(at: DateTime<Utc>) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| ScrapeError::Parse(format!("timestamp out of range: {e}")))
}

/// Daily history and dividends for the last `days` days.
pub async fn quote_history(symbol: &str, days: i64) -> Result<QuoteHistory> {
    let provider = yahoo::YahooConnector::new()?;

    let end = Utc::now();
    let start = end - Duration::days(days);
    info!("Fetching {} days of history for {}", days, symbol);

    let response = provider
        .get_quote_history(symbol, to_offset(start)?, to_offset(end)?)
        .await?;

    let points = response.quotes()?.iter().map(PricePoint::from).collect();
    let dividends = response
        .dividends()
        .unwrap_or_default()
        .iter()
        .filter_map(|d| {
            Utc.timestamp_opt(d.date as i64, 0)
                .single()
                .map(|date| DividendEvent {
                    date,
                    amount: d.amount,
                })
        })
        .collect();

    Ok(QuoteHistory {
        symbol: symbol.to_uppercase(),
        points,
        dividends,
    })
}

/// Most recent daily bar.
pub async fn latest_quote(symbol: &str) -> Result<PricePoint> {
    let provider = yahoo::YahooConnector::new()?;
    info!("Fetching latest quote for {}", symbol);
    let response = provider.get_latest_quotes(symbol, "1d").await?;
    Ok(PricePoint::from(&response.last_quote()?))
}
