use anyhow::Context;
use reqwest::blocking::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

use crate::domain::parse_decimal;
use crate::market::spinner;

#[derive(Debug, Error)]
pub enum RateError {
    #[error("rate request for {base}/{quote} failed: {reason}")]
    Request {
        base: String,
        quote: String,
        reason: String,
    },
    #[error("no {quote} rate in {base} response")]
    MissingQuote { base: String, quote: String },
    #[error("{quote} rate {value} in {base} response is not a usable decimal")]
    Unparsable {
        base: String,
        quote: String,
        value: String,
    },
    #[error("rate {rate} for {base}/{quote} is not positive")]
    NotPositive {
        base: String,
        quote: String,
        rate: Decimal,
    },
}

pub trait RateSource {
    /// Units of `quote` per one unit of `base`.
    fn rate(&self, base: &str, quote: &str) -> Result<Decimal, RateError>;
}

/// A rate supplied up front (e.g. `--rate`).
#[derive(Debug, Clone, Copy)]
pub struct FixedRate(pub Decimal);

impl RateSource for FixedRate {
    fn rate(&self, base: &str, quote: &str) -> Result<Decimal, RateError> {
        ensure_positive(base, quote, self.0)
    }
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: BTreeMap<String, serde_json::Number>,
}

/// exchangerate-api.com style endpoint; `url_template` contains `{base}`.
pub struct ExchangeRateApi {
    client: Client,
    url_template: String,
}

impl ExchangeRateApi {
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
}

fn ensure_positive(base: &str, quote: &str, rate: Decimal) -> Result<Decimal, RateError> {
    if rate <= Decimal::ZERO {
        return Err(RateError::NotPositive {
            base: base.to_string(),
            quote: quote.to_string(),
            rate,
        });
    }
    Ok(rate)
}

fn quote_from_rates(base: &str, quote: &str, body: &LatestRates) -> Result<Decimal, RateError> {
    let value = body
        .rates
        .get(quote)
        .ok_or_else(|| RateError::MissingQuote {
            base: base.to_string(),
            quote: quote.to_string(),
        })?
        .to_string();
    let rate = parse_decimal(&value).ok_or_else(|| RateError::Unparsable {
        base: base.to_string(),
        quote: quote.to_string(),
        value,
    })?;
    ensure_positive(base, quote, rate)
}

impl RateSource for ExchangeRateApi {
    fn rate(&self, base: &str, quote: &str) -> Result<Decimal, RateError> {
        let request_err = |reason: String| RateError::Request {
            base: base.to_string(),
            quote: quote.to_string(),
            reason,
        };

        let url = self.url_template.replace("{base}", base);
        let pb = spinner(&format!("Fetching {base}/{quote} rate..."));
        let resp = self
            .client
            .get(&url)
            .header("User-Agent", "dividendero")
            .send();
        pb.finish_and_clear();

        let resp = resp.map_err(|e| request_err(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(request_err(format!("HTTP {}", resp.status())));
        }
        let body: LatestRates = resp
            .json()
            .map_err(|e| request_err(format!("invalid JSON: {e}")))?;
        quote_from_rates(base, quote, &body)
    }
}
