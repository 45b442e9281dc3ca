use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::{Portfolio, PortfolioEntry, normalize_ticker};

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("failed to read portfolio {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse portfolio {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{ticker}: shares must be positive, got {shares}")]
    NonPositiveShares { ticker: String, shares: Decimal },
    #[error("{ticker}: cost per share must not be negative, got {cost}")]
    NegativeCost { ticker: String, cost: Decimal },
    #[error("{ticker} is listed more than once")]
    DuplicateTicker { ticker: String },
    #[error("portfolio is empty")]
    Empty,
}

pub fn parse_portfolio(raw: &str, origin: &str) -> Result<Portfolio, PortfolioError> {
    let parsed: BTreeMap<String, PortfolioEntry> =
        serde_json::from_str(raw).map_err(|source| PortfolioError::Parse {
            path: origin.to_string(),
            source,
        })?;

    let mut portfolio = Portfolio::new();
    for (ticker, entry) in parsed {
        let ticker = normalize_ticker(&ticker);
        if entry.shares() <= Decimal::ZERO {
            return Err(PortfolioError::NonPositiveShares {
                ticker,
                shares: entry.shares(),
            });
        }
        if let Some(cost) = entry.cost_per_share().filter(|c| c.is_sign_negative()) {
            return Err(PortfolioError::NegativeCost { ticker, cost });
        }
        if portfolio.contains_key(&ticker) {
            return Err(PortfolioError::DuplicateTicker { ticker });
        }
        portfolio.insert(ticker, entry);
    }

    if portfolio.is_empty() {
        return Err(PortfolioError::Empty);
    }
    Ok(portfolio)
}

pub fn load_portfolio(path: &Path) -> Result<Portfolio, PortfolioError> {
    let origin = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| PortfolioError::Read {
        path: origin.clone(),
        source,
    })?;
    parse_portfolio(&raw, &origin)
}

pub fn shares_by_ticker(portfolio: &Portfolio) -> BTreeMap<String, Decimal> {
    portfolio
        .iter()
        .map(|(ticker, entry)| (ticker.clone(), entry.shares()))
        .collect()
}
