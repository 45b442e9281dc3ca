use anyhow::Context;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::domain::{Observation, normalize_ticker, parse_decimal};

#[derive(Debug, Error)]
pub enum MarketDataError {
    /// The source could not supply data for this instrument.
    #[error("{ticker}: {reason}")]
    Unavailable { ticker: String, reason: String },
    /// The source answered, but with data that cannot be interpreted.
    #[error("{ticker}: malformed {field} {value:?}")]
    Malformed {
        ticker: String,
        field: &'static str,
        value: String,
    },
}

impl MarketDataError {
    fn unavailable(ticker: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            ticker: ticker.to_string(),
            reason: reason.into(),
        }
    }

    fn malformed(ticker: &str, field: &'static str, value: impl Into<String>) -> Self {
        Self::Malformed {
            ticker: ticker.to_string(),
            field,
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryFileError {
    #[error(transparent)]
    Parse(#[from] serde_json::Error),
    #[error("{ticker} appears more than once in {section}")]
    DuplicateTicker {
        ticker: String,
        section: &'static str,
    },
}

pub trait MarketData {
    /// Historical payments for `ticker`, oldest first, timestamps in UTC.
    fn dividends(&self, ticker: &str) -> Result<Vec<Observation>, MarketDataError>;

    /// Latest known unit price, if the source has one.
    fn latest_price(&self, ticker: &str) -> Result<Option<Decimal>, MarketDataError>;
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        pb.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
    }
    pb.enable_steady_tick(Duration::from_millis(80));
    pb.set_message(message.to_string());
    pb
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default)]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: BTreeMap<String, ChartDividend>,
}

#[derive(Debug, Deserialize)]
struct ChartDividend {
    amount: f64,
    date: i64,
}

/// Yahoo Finance chart endpoint. `url_template` contains `{ticker}`.
pub struct YahooChart {
    client: Client,
    url_template: String,
}

impl YahooChart {
    pub fn new(url_template: &str) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url_template: url_template.to_string(),
        })
    }

    fn fetch(&self, ticker: &str) -> Result<ChartResult, MarketDataError> {
        let url = self.url_template.replace("{ticker}", ticker);
        let pb = spinner(&format!("Fetching {ticker} history..."));
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", "dividendero")
            .send();
        pb.finish_and_clear();

        let resp = resp.map_err(|e| MarketDataError::unavailable(ticker, e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MarketDataError::unavailable(
                ticker,
                format!("HTTP {}", resp.status()),
            ));
        }
        let body: ChartResponse = resp
            .json()
            .map_err(|e| MarketDataError::unavailable(ticker, format!("invalid JSON: {e}")))?;

        if let Some(err) = body.chart.error {
            return Err(MarketDataError::unavailable(
                ticker,
                err.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        body.chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| MarketDataError::unavailable(ticker, "empty chart result"))
    }
}

fn decimal_from_f64(
    ticker: &str,
    field: &'static str,
    raw: f64,
) -> Result<Decimal, MarketDataError> {
    Decimal::from_f64_retain(raw)
        .map(|d| d.round_dp(6).normalize())
        .filter(|d| !d.is_sign_negative())
        .ok_or_else(|| MarketDataError::malformed(ticker, field, raw.to_string()))
}

impl MarketData for YahooChart {
    fn dividends(&self, ticker: &str) -> Result<Vec<Observation>, MarketDataError> {
        let result = self.fetch(ticker)?;
        let Some(events) = result.events else {
            return Ok(Vec::new());
        };

        let mut out = Vec::with_capacity(events.dividends.len());
        for div in events.dividends.into_values() {
            let paid_at = Utc
                .timestamp_opt(div.date, 0)
                .single()
                .ok_or_else(|| MarketDataError::malformed(ticker, "date", div.date.to_string()))?;
            out.push(Observation {
                paid_at,
                amount_per_unit: decimal_from_f64(ticker, "amount", div.amount)?,
            });
        }
        out.sort_by_key(|o| o.paid_at);
        Ok(out)
    }

    fn latest_price(&self, ticker: &str) -> Result<Option<Decimal>, MarketDataError> {
        let result = self.fetch(ticker)?;
        result
            .meta
            .and_then(|m| m.regular_market_price)
            .map(|p| decimal_from_f64(ticker, "price", p))
            .transpose()
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FileObservation {
    date: String,
    amount: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
struct FileContents {
    #[serde(default)]
    dividends: BTreeMap<String, Vec<FileObservation>>,
    #[serde(default)]
    prices: BTreeMap<String, serde_json::Value>,
}

/// Offline history, read from a JSON document:
///
/// ```json
/// { "dividends": { "KO": [{ "date": "2024-06-14", "amount": 0.485 }] },
///   "prices": { "KO": 62.1 } }
/// ```
///
/// Dates are `YYYY-MM-DD` (taken as UTC midnight) or RFC3339 with any offset.
#[derive(Debug, Clone)]
pub struct HistoryFile {
    contents: FileContents,
}

impl HistoryFile {
    pub fn from_json(raw: &str) -> Result<Self, HistoryFileError> {
        let parsed: FileContents = serde_json::from_str(raw)?;
        Ok(Self {
            contents: FileContents {
                dividends: normalize_keys(parsed.dividends, "dividends")?,
                prices: normalize_keys(parsed.prices, "prices")?,
            },
        })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

fn normalize_keys<V>(
    raw: BTreeMap<String, V>,
    section: &'static str,
) -> Result<BTreeMap<String, V>, HistoryFileError> {
    let mut out = BTreeMap::new();
    for (ticker, value) in raw {
        let ticker = normalize_ticker(&ticker);
        if out.contains_key(&ticker) {
            return Err(HistoryFileError::DuplicateTicker { ticker, section });
        }
        out.insert(ticker, value);
    }
    Ok(out)
}

pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn decimal_from_json(
    ticker: &str,
    field: &'static str,
    value: &serde_json::Value,
) -> Result<Decimal, MarketDataError> {
    let text = match value {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.trim().to_string(),
        other => return Err(MarketDataError::malformed(ticker, field, other.to_string())),
    };
    parse_decimal(&text)
        .filter(|d| !d.is_sign_negative())
        .ok_or_else(|| MarketDataError::malformed(ticker, field, text))
}

impl MarketData for HistoryFile {
    fn dividends(&self, ticker: &str) -> Result<Vec<Observation>, MarketDataError> {
        let rows = self
            .contents
            .dividends
            .get(&normalize_ticker(ticker))
            .ok_or_else(|| MarketDataError::unavailable(ticker, "no history in file"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let paid_at = parse_utc(&row.date)
                .ok_or_else(|| MarketDataError::malformed(ticker, "date", row.date.clone()))?;
            out.push(Observation {
                paid_at,
                amount_per_unit: decimal_from_json(ticker, "amount", &row.amount)?,
            });
        }
        out.sort_by_key(|o| o.paid_at);
        Ok(out)
    }

    fn latest_price(&self, ticker: &str) -> Result<Option<Decimal>, MarketDataError> {
        self.contents
            .prices
            .get(&normalize_ticker(ticker))
            .map(|v| decimal_from_json(ticker, "price", v))
            .transpose()
    }
}
