use chrono::Datelike;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::{AmountOverflow, Portfolio, PortfolioEntry, PredictedPayment};
use crate::market::MarketData;
use crate::tax::{BracketTable, TaxError, compute_tax};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub base: Decimal,
    pub quote: Decimal,
}

impl Totals {
    fn add(
        &mut self,
        base: Decimal,
        rate: Decimal,
        context: &str,
    ) -> Result<(), AmountOverflow> {
        let overflow = || AmountOverflow::new(context);
        let quote = base.checked_mul(rate).ok_or_else(overflow)?;
        self.base = self.base.checked_add(base).ok_or_else(overflow)?;
        self.quote = self.quote.checked_add(quote).ok_or_else(overflow)?;
        Ok(())
    }
}

/// `amount * rate`, failing instead of overflowing.
pub fn convert(amount: Decimal, rate: Decimal, context: &str) -> Result<Decimal, AmountOverflow> {
    amount
        .checked_mul(rate)
        .ok_or_else(|| AmountOverflow::new(context))
}

pub fn checked_total<'a>(
    amounts: impl IntoIterator<Item = &'a Decimal>,
    context: &str,
) -> Result<Decimal, AmountOverflow> {
    amounts.into_iter().try_fold(Decimal::ZERO, |acc, d| {
        acc.checked_add(*d).ok_or_else(|| AmountOverflow::new(context))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearlyTax {
    pub gross: Decimal,
    pub tax: Decimal,
    pub net: Decimal,
}

/// Totals keyed by `(year, month)` of the predicted date.
pub fn monthly_totals(
    payments: &[PredictedPayment],
    rate: Decimal,
) -> Result<BTreeMap<(i32, u32), Totals>, AmountOverflow> {
    let mut out: BTreeMap<(i32, u32), Totals> = BTreeMap::new();
    for p in payments {
        let key = (p.predicted_date.year(), p.predicted_date.month());
        let context = format!("total for {:04}-{:02}", key.0, key.1);
        out.entry(key)
            .or_default()
            .add(p.record.total_amount, rate, &context)?;
    }
    Ok(out)
}

pub fn yearly_totals(
    payments: &[PredictedPayment],
    rate: Decimal,
) -> Result<BTreeMap<i32, Totals>, AmountOverflow> {
    let mut out: BTreeMap<i32, Totals> = BTreeMap::new();
    for p in payments {
        let year = p.predicted_date.year();
        out.entry(year)
            .or_default()
            .add(p.record.total_amount, rate, &format!("total for {year}"))?;
    }
    Ok(out)
}

/// Tax on each year's quote-currency total.
pub fn yearly_taxes(
    yearly: &BTreeMap<i32, Totals>,
    table: &BracketTable,
) -> Result<BTreeMap<i32, YearlyTax>, TaxError> {
    yearly
        .iter()
        .map(|(&year, totals)| -> Result<(i32, YearlyTax), TaxError> {
            let tax = compute_tax(totals.quote, table)?;
            Ok((
                year,
                YearlyTax {
                    gross: totals.quote,
                    tax,
                    net: totals.quote - tax,
                },
            ))
        })
        .collect()
}

/// Amount invested per instrument, in the base currency.
///
/// Uses the recorded cost when present, otherwise the latest market price.
/// Instruments without a usable price count as zero.
pub fn investment_costs(
    portfolio: &Portfolio,
    prices: &dyn MarketData,
) -> Result<BTreeMap<String, Decimal>, AmountOverflow> {
    let mut out = BTreeMap::new();
    for (ticker, entry) in portfolio {
        let (shares, unit_cost) = match entry {
            PortfolioEntry::SharesWithCost {
                shares,
                cost_per_share,
            } => (*shares, *cost_per_share),
            PortfolioEntry::Shares(shares) => match prices.latest_price(ticker) {
                Ok(Some(price)) => (*shares, price),
                Ok(None) => {
                    warn!(ticker = %ticker, "no market price, counting investment as zero");
                    (*shares, Decimal::ZERO)
                }
                Err(err) => {
                    warn!(ticker = %ticker, error = %err, "price lookup failed, counting investment as zero");
                    (*shares, Decimal::ZERO)
                }
            },
        };
        let cost = shares
            .checked_mul(unit_cost)
            .ok_or_else(|| AmountOverflow::new(format!("{ticker} investment")))?;
        out.insert(ticker.clone(), cost);
    }
    Ok(out)
}

/// `income / invested * 100`, or `None` when nothing is invested.
pub fn roi_percent(income: Decimal, invested: Decimal) -> Option<Decimal> {
    if invested <= Decimal::ZERO {
        return None;
    }
    income
        .checked_div(invested)
        .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HistoricalPaymentRecord, Observation};
    use crate::market::HistoryFile;
    use crate::tax::default_brackets;
    use chrono::NaiveDate;

    fn payment(ticker: &str, predicted: (i32, u32, u32), total_cents: i64) -> PredictedPayment {
        let date = NaiveDate::from_ymd_opt(predicted.0 - 1, predicted.1, predicted.2).unwrap();
        let obs = Observation {
            paid_at: date.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            amount_per_unit: Decimal::new(total_cents, 2),
        };
        PredictedPayment {
            record: HistoricalPaymentRecord::new(ticker, Decimal::ONE, &obs).unwrap(),
            predicted_date: NaiveDate::from_ymd_opt(predicted.0, predicted.1, predicted.2)
                .unwrap(),
        }
    }

    fn sample() -> Vec<PredictedPayment> {
        vec![
            payment("KO", (2024, 7, 1), 10_000),
            payment("T", (2024, 7, 20), 5_000),
            payment("KO", (2024, 10, 1), 10_000),
            payment("KO", (2025, 4, 1), 20_000),
        ]
    }

    #[test]
    fn groups_by_month_and_year() {
        let rate = Decimal::new(9, 1);
        let monthly = monthly_totals(&sample(), rate).unwrap();
        assert_eq!(
            monthly[&(2024, 7)],
            Totals {
                base: Decimal::from(150),
                quote: Decimal::from(135),
            }
        );
        assert_eq!(monthly.len(), 3);

        let yearly = yearly_totals(&sample(), rate).unwrap();
        assert_eq!(yearly[&2024].base, Decimal::from(250));
        assert_eq!(yearly[&2025].quote, Decimal::from(180));
    }

    #[test]
    fn oversized_rate_is_an_error() {
        let err = yearly_totals(&sample(), Decimal::MAX).unwrap_err();
        assert_eq!(err.context, "total for 2024");
        assert!(monthly_totals(&sample(), Decimal::MAX).is_err());
        assert!(convert(Decimal::MAX, Decimal::TWO, "investment").is_err());
    }

    #[test]
    fn checked_total_stops_at_overflow() {
        let ok = [Decimal::ONE, Decimal::TWO];
        assert_eq!(checked_total(&ok, "sum").unwrap(), Decimal::from(3));
        let too_big = [Decimal::MAX, Decimal::ONE];
        assert_eq!(
            checked_total(&too_big, "sum"),
            Err(AmountOverflow::new("sum"))
        );
    }

    #[test]
    fn taxes_each_year_separately() {
        let table = BracketTable::new(default_brackets()).unwrap();
        let yearly = BTreeMap::from([
            (
                2024,
                Totals {
                    base: Decimal::from(8000),
                    quote: Decimal::from(7000),
                },
            ),
            (
                2025,
                Totals {
                    base: Decimal::from(100),
                    quote: Decimal::from(100),
                },
            ),
        ]);
        let taxes = yearly_taxes(&yearly, &table).unwrap();
        assert_eq!(taxes[&2024].tax, Decimal::from(1350));
        assert_eq!(taxes[&2024].net, Decimal::from(5650));
        assert_eq!(taxes[&2025].tax, Decimal::from(19));
    }

    #[test]
    fn investment_uses_cost_then_price() {
        let prices =
            HistoryFile::from_json(r#"{"prices": {"KO": 60}}"#).unwrap();
        let portfolio = Portfolio::from([
            ("KO".to_string(), PortfolioEntry::Shares(Decimal::from(10))),
            (
                "MSFT".to_string(),
                PortfolioEntry::SharesWithCost {
                    shares: Decimal::from(2),
                    cost_per_share: Decimal::from(300),
                },
            ),
            ("T".to_string(), PortfolioEntry::Shares(Decimal::from(5))),
        ]);
        let costs = investment_costs(&portfolio, &prices).unwrap();
        assert_eq!(costs["KO"], Decimal::from(600));
        assert_eq!(costs["MSFT"], Decimal::from(600));
        assert_eq!(costs["T"], Decimal::ZERO);
    }

    #[test]
    fn roi_needs_investment() {
        assert_eq!(roi_percent(Decimal::from(5), Decimal::ZERO), None);
        assert_eq!(
            roi_percent(Decimal::from(5), Decimal::from(200)),
            Some(Decimal::new(25, 1))
        );
    }
}
