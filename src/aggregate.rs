use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    AmountOverflow, HistoricalPaymentRecord, MonthlyBuckets, Observation, Portfolio,
};
use crate::market::{MarketData, MarketDataError};

pub type Histories = BTreeMap<String, Vec<Observation>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("lookback of {0} days does not fit before {1}")]
    WindowOutOfRange(i64, DateTime<Utc>),
    #[error(transparent)]
    Overflow(#[from] AmountOverflow),
}

/// Pulls payment history for every instrument in the portfolio.
///
/// Instruments the source cannot serve are skipped with a warning; malformed
/// data aborts the whole collection.
pub fn collect_histories(
    source: &dyn MarketData,
    portfolio: &Portfolio,
) -> Result<Histories, MarketDataError> {
    let mut out = Histories::new();
    for ticker in portfolio.keys() {
        match source.dividends(ticker) {
            Ok(obs) if obs.is_empty() => {
                debug!(ticker = %ticker, "no payment history");
            }
            Ok(obs) => {
                out.insert(ticker.clone(), obs);
            }
            Err(err @ MarketDataError::Unavailable { .. }) => {
                warn!(ticker = %ticker, error = %err, "skipping instrument");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(out)
}

/// Groups observations inside the trailing `lookback_days` window into
/// calendar-month buckets (UTC months).
pub fn aggregate_by_month(
    histories: &Histories,
    shares: &BTreeMap<String, Decimal>,
    now: DateTime<Utc>,
    lookback_days: i64,
) -> Result<MonthlyBuckets, AggregateError> {
    let window_start = Duration::try_days(lookback_days)
        .and_then(|span| now.checked_sub_signed(span))
        .ok_or(AggregateError::WindowOutOfRange(lookback_days, now))?;
    let mut buckets = MonthlyBuckets::new();

    for (ticker, observations) in histories {
        let Some(&owned) = shares.get(ticker) else {
            debug!(ticker = %ticker, "history without portfolio entry");
            continue;
        };
        for obs in observations.iter().filter(|o| o.paid_at >= window_start) {
            let record = HistoricalPaymentRecord::new(ticker, owned, obs)?;
            buckets.entry(record.month()).or_default().push(record);
        }
    }

    Ok(buckets)
}
