use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marginal bracket covering `[lower, upper)`; `upper = None` is open-ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBracket {
    pub lower: Decimal,
    pub upper: Option<Decimal>,
    pub rate: Decimal,
}

impl TaxBracket {
    pub fn width(&self) -> Option<Decimal> {
        self.upper.map(|u| u - self.lower)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BracketError {
    #[error("bracket table is empty")]
    Empty,
    #[error("first bracket must start at 0, got {0}")]
    FirstLowerNotZero(Decimal),
    #[error("bracket {index}: upper bound {upper} is not above lower bound {lower}")]
    EmptyRange {
        index: usize,
        lower: Decimal,
        upper: Decimal,
    },
    #[error("bracket {index}: lower bound {lower} does not match previous upper bound {expected}")]
    Gap {
        index: usize,
        lower: Decimal,
        expected: Decimal,
    },
    #[error("bracket {index}: rate {rate} is outside [0, 1]")]
    RateOutOfRange { index: usize, rate: Decimal },
    #[error("bracket {0} is open-ended but is not the last bracket")]
    OpenEndedNotLast(usize),
    #[error("last bracket must be open-ended")]
    LastBracketBounded,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaxError {
    #[error("gross amount must not be negative, got {0}")]
    NegativeAmount(Decimal),
}

/// Contiguous, non-overlapping bracket table covering `[0, inf)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketTable {
    brackets: Vec<TaxBracket>,
}

impl BracketTable {
    pub fn new(brackets: Vec<TaxBracket>) -> Result<Self, BracketError> {
        let Some(first) = brackets.first() else {
            return Err(BracketError::Empty);
        };
        if !first.lower.is_zero() {
            return Err(BracketError::FirstLowerNotZero(first.lower));
        }

        let last = brackets.len() - 1;
        let mut expected_lower = Decimal::ZERO;
        for (index, b) in brackets.iter().enumerate() {
            if b.lower != expected_lower {
                return Err(BracketError::Gap {
                    index,
                    lower: b.lower,
                    expected: expected_lower,
                });
            }
            if b.rate < Decimal::ZERO || b.rate > Decimal::ONE {
                return Err(BracketError::RateOutOfRange {
                    index,
                    rate: b.rate,
                });
            }
            match b.upper {
                Some(upper) => {
                    if upper <= b.lower {
                        return Err(BracketError::EmptyRange {
                            index,
                            lower: b.lower,
                            upper,
                        });
                    }
                    if index == last {
                        return Err(BracketError::LastBracketBounded);
                    }
                    expected_lower = upper;
                }
                None if index != last => return Err(BracketError::OpenEndedNotLast(index)),
                None => {}
            }
        }

        Ok(Self { brackets })
    }

    pub fn brackets(&self) -> &[TaxBracket] {
        &self.brackets
    }
}

/// Savings-income table: 19% to 6 000, 21% to 50 000, 23% to 200 000,
/// 27% to 300 000, 28% above.
pub fn default_brackets() -> Vec<TaxBracket> {
    let b = |lower: i64, upper: Option<i64>, rate_pct: i64| TaxBracket {
        lower: Decimal::from(lower),
        upper: upper.map(Decimal::from),
        rate: Decimal::new(rate_pct, 2),
    };
    vec![
        b(0, Some(6_000), 19),
        b(6_000, Some(50_000), 21),
        b(50_000, Some(200_000), 23),
        b(200_000, Some(300_000), 27),
        b(300_000, None, 28),
    ]
}

/// Total tax owed on `gross`, applying each bracket's rate only to the
/// portion of `gross` that falls inside it.
pub fn compute_tax(gross: Decimal, table: &BracketTable) -> Result<Decimal, TaxError> {
    if gross < Decimal::ZERO {
        return Err(TaxError::NegativeAmount(gross));
    }

    let mut total = Decimal::ZERO;
    let mut remaining = gross;
    for bracket in table.brackets() {
        if remaining <= Decimal::ZERO {
            break;
        }
        let taxable = match bracket.width() {
            Some(width) => remaining.min(width),
            None => remaining,
        };
        if taxable > Decimal::ZERO {
            total += taxable * bracket.rate;
            remaining -= taxable;
        }
    }
    Ok(total)
}
