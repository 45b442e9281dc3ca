use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// A monetary computation left the representable `Decimal` range.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{context}: amount out of range")]
pub struct AmountOverflow {
    pub context: String,
}

impl AmountOverflow {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
        }
    }
}

/// Parses plain (`0.485`) or exponent (`1e-7`) decimal notation.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    text.parse::<Decimal>()
        .ok()
        .or_else(|| Decimal::from_scientific(text).ok())
}

/// One observed payment as reported by a market-data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub paid_at: DateTime<Utc>,
    pub amount_per_unit: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalPaymentRecord {
    pub instrument_id: String,
    pub shares_owned: Decimal,
    pub amount_per_unit: Decimal,
    /// `amount_per_unit * shares_owned`, fixed at creation.
    pub total_amount: Decimal,
    pub payment_date: NaiveDate,
    pub day_of_month: u32,
}

impl HistoricalPaymentRecord {
    pub fn new(
        instrument_id: &str,
        shares_owned: Decimal,
        observation: &Observation,
    ) -> Result<Self, AmountOverflow> {
        let payment_date = observation.paid_at.date_naive();
        let total_amount = observation
            .amount_per_unit
            .checked_mul(shares_owned)
            .ok_or_else(|| {
                AmountOverflow::new(format!("{instrument_id} payment on {payment_date}"))
            })?;
        Ok(Self {
            instrument_id: instrument_id.to_string(),
            shares_owned,
            amount_per_unit: observation.amount_per_unit,
            total_amount,
            payment_date,
            day_of_month: payment_date.day(),
        })
    }

    pub fn month(&self) -> u32 {
        self.payment_date.month()
    }
}

/// Calendar month (1-12) to the records observed in it, in observation order.
pub type MonthlyBuckets = BTreeMap<u32, Vec<HistoricalPaymentRecord>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictedPayment {
    pub record: HistoricalPaymentRecord,
    pub predicted_date: NaiveDate,
}

/// A portfolio line, resolved once when the portfolio is loaded.
///
/// Accepts either a bare share count or `{ "shares": n, "cost_per_share": c }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PortfolioEntry {
    SharesWithCost {
        shares: Decimal,
        cost_per_share: Decimal,
    },
    Shares(Decimal),
}

impl PortfolioEntry {
    pub fn shares(&self) -> Decimal {
        match self {
            PortfolioEntry::Shares(n) => *n,
            PortfolioEntry::SharesWithCost { shares, .. } => *shares,
        }
    }

    pub fn cost_per_share(&self) -> Option<Decimal> {
        match self {
            PortfolioEntry::Shares(_) => None,
            PortfolioEntry::SharesWithCost { cost_per_share, .. } => Some(*cost_per_share),
        }
    }
}

pub type Portfolio = BTreeMap<String, PortfolioEntry>;

pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn normalize_currency(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn record_freezes_total_and_caches_day() {
        let obs = Observation {
            paid_at: Utc.with_ymd_and_hms(2024, 5, 31, 23, 30, 0).unwrap(),
            amount_per_unit: Decimal::new(25, 2),
        };
        let rec = HistoricalPaymentRecord::new("KO", Decimal::from(40), &obs).unwrap();
        assert_eq!(rec.total_amount, Decimal::from(10));
        assert_eq!(rec.day_of_month, 31);
        assert_eq!(rec.month(), 5);
    }

    #[test]
    fn oversized_total_is_an_error() {
        let obs = Observation {
            paid_at: Utc.with_ymd_and_hms(2024, 5, 31, 0, 0, 0).unwrap(),
            amount_per_unit: Decimal::from(10_000_000_000i64),
        };
        let err = HistoricalPaymentRecord::new("KO", Decimal::MAX, &obs).unwrap_err();
        assert_eq!(err.context, "KO payment on 2024-05-31");
    }

    #[test]
    fn parses_exponent_notation() {
        assert_eq!(parse_decimal("0.485"), Some(Decimal::new(485, 3)));
        assert_eq!(parse_decimal("1e-7"), Some(Decimal::new(1, 7)));
        assert_eq!(parse_decimal("2.5e3"), Some(Decimal::from(2500)));
        assert_eq!(parse_decimal("lots"), None);
    }

    #[test]
    fn portfolio_entry_accepts_both_shapes() {
        let plain: PortfolioEntry = serde_json::from_str("12.5").unwrap();
        assert_eq!(plain, PortfolioEntry::Shares(Decimal::new(125, 1)));
        assert_eq!(plain.cost_per_share(), None);

        let full: PortfolioEntry =
            serde_json::from_str(r#"{"shares": 10, "cost_per_share": 52.3}"#).unwrap();
        assert_eq!(full.shares(), Decimal::from(10));
        assert_eq!(full.cost_per_share(), Some(Decimal::new(523, 1)));
    }
}
