use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::cli::OutputFormat;
use crate::domain::PredictedPayment;
use crate::summary::{Totals, YearlyTax};

pub struct Currencies<'a> {
    pub base: &'a str,
    pub quote: &'a str,
}

pub fn money(d: Decimal) -> String {
    format!(
        "{:.2}",
        d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    )
}

pub fn month_label(year: i32, month: u32) -> String {
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|d| d.format("%B %Y").to_string())
        .unwrap_or_else(|| format!("{year:04}-{month:02}"))
}

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    if headers.is_empty() {
        out.push_str("(no columns)\n");
        return out;
    }

    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().take(cols).enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
        out.push('|');
        for (i, w) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let _ = write!(out, " {:width$} |", cell, width = *w);
        }
        out.push('\n');
    }

    fn push_sep(out: &mut String, widths: &[usize]) {
        out.push('|');
        for w in widths {
            out.push_str(&"-".repeat(w + 2));
            out.push('|');
        }
        out.push('\n');
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    push_row(&mut out, &header_cells, &widths);
    push_sep(&mut out, &widths);
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn render_tsv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = headers.join("\t");
    out.push('\n');
    for row in rows {
        out.push_str(&row.join("\t"));
        out.push('\n');
    }
    out
}

fn render(format: OutputFormat, headers: &[&str], rows: &[Vec<String>]) -> String {
    match format {
        OutputFormat::Table => render_table(headers, rows),
        OutputFormat::Tsv => render_tsv(headers, rows),
    }
}

pub fn schedule(
    payments: &[PredictedPayment],
    rate: Decimal,
    cur: &Currencies,
    format: OutputFormat,
) -> String {
    let total_base = format!("total {}", cur.base);
    let total_quote = format!("total {}", cur.quote);
    let headers = [
        "ticker",
        "date",
        "shares",
        "per share",
        total_base.as_str(),
        total_quote.as_str(),
    ];
    let row = |p: &PredictedPayment| {
        vec![
            p.record.instrument_id.clone(),
            p.predicted_date.to_string(),
            p.record.shares_owned.normalize().to_string(),
            money(p.record.amount_per_unit),
            money(p.record.total_amount),
            p.record
                .total_amount
                .checked_mul(rate)
                .map(money)
                .unwrap_or_else(|| "overflow".to_string()),
        ]
    };

    if format == OutputFormat::Tsv {
        let rows: Vec<_> = payments.iter().map(&row).collect();
        return render_tsv(&headers, &rows);
    }

    let mut out = String::from("Dividend Payment Schedule\n");
    if payments.is_empty() {
        out.push_str("(no payments)\n");
        return out;
    }

    let mut groups: Vec<(String, Vec<Vec<String>>)> = Vec::new();
    for p in payments {
        let label = p.predicted_date.format("%B %Y").to_string();
        if let Some((current, rows)) = groups.last_mut() {
            if *current == label {
                rows.push(row(p));
                continue;
            }
        }
        groups.push((label, vec![row(p)]));
    }
    for (label, rows) in groups {
        let _ = write!(out, "\n{label}\n{}", render_table(&headers, &rows));
    }
    out
}

pub fn monthly_totals(
    totals: &BTreeMap<(i32, u32), Totals>,
    cur: &Currencies,
    format: OutputFormat,
) -> String {
    let rows: Vec<Vec<String>> = totals
        .iter()
        .map(|(&(y, m), t)| vec![month_label(y, m), money(t.base), money(t.quote)])
        .collect();
    let headers = ["month", cur.base, cur.quote];
    section("Monthly Expected Totals", format, &headers, &rows)
}

pub fn yearly_totals(
    totals: &BTreeMap<i32, Totals>,
    cur: &Currencies,
    format: OutputFormat,
) -> String {
    let rows: Vec<Vec<String>> = totals
        .iter()
        .map(|(y, t)| vec![y.to_string(), money(t.base), money(t.quote)])
        .collect();
    let headers = ["year", cur.base, cur.quote];
    section("Yearly Expected Totals", format, &headers, &rows)
}

pub fn yearly_taxes(
    taxes: &BTreeMap<i32, YearlyTax>,
    cur: &Currencies,
    format: OutputFormat,
) -> String {
    let rows: Vec<Vec<String>> = taxes
        .iter()
        .map(|(y, t)| vec![y.to_string(), money(t.gross), money(t.tax), money(t.net)])
        .collect();
    let gross = format!("gross {}", cur.quote);
    let headers = ["year", gross.as_str(), "tax", "net"];
    section("Yearly Tax Calculations", format, &headers, &rows)
}

pub struct Investment<'a> {
    pub total_base: Decimal,
    pub total_quote: Decimal,
    pub monthly_roi: Vec<(String, Option<Decimal>, Decimal)>,
    pub yearly_roi: Vec<(String, Option<Decimal>, Decimal)>,
    pub cur: &'a Currencies<'a>,
}

pub fn investment(inv: &Investment, format: OutputFormat) -> String {
    let mut out = format!(
        "Investment Summary\nTotal Investment: {} {} | {} {}\n",
        money(inv.total_base),
        inv.cur.base,
        money(inv.total_quote),
        inv.cur.quote
    );

    let roi_rows = |rows: &[(String, Option<Decimal>, Decimal)]| -> Vec<Vec<String>> {
        rows.iter()
            .map(|(label, roi, income)| {
                vec![
                    label.clone(),
                    roi.map(|r| format!("{}%", money(r)))
                        .unwrap_or_else(|| "n/a".to_string()),
                    money(*income),
                ]
            })
            .collect()
    };
    let income = format!("income {}", inv.cur.quote);
    let headers = ["period", "roi", income.as_str()];
    out.push('\n');
    out.push_str(&section(
        "Monthly Return on Investment",
        format,
        &headers,
        &roi_rows(&inv.monthly_roi),
    ));
    out.push('\n');
    out.push_str(&section(
        "Yearly Return on Investment",
        format,
        &headers,
        &roi_rows(&inv.yearly_roi),
    ));
    out
}

pub fn brackets(table: &crate::tax::BracketTable, format: OutputFormat) -> String {
    let rows: Vec<Vec<String>> = table
        .brackets()
        .iter()
        .map(|b| {
            vec![
                money(b.lower),
                b.upper.map(money).unwrap_or_else(|| "inf".to_string()),
                format!("{}%", (b.rate * Decimal::ONE_HUNDRED).normalize()),
            ]
        })
        .collect();
    render(format, &["from", "to", "rate"], &rows)
}

fn section(title: &str, format: OutputFormat, headers: &[&str], rows: &[Vec<String>]) -> String {
    match format {
        OutputFormat::Table => format!("{title}\n{}", render_table(headers, rows)),
        OutputFormat::Tsv => render_tsv(headers, rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HistoricalPaymentRecord, Observation};

    fn payment(ticker: &str, y: i32, m: u32, d: u32) -> PredictedPayment {
        let date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
        let obs = Observation {
            paid_at: date.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            amount_per_unit: Decimal::new(485, 3),
        };
        PredictedPayment {
            record: HistoricalPaymentRecord::new(ticker, Decimal::from(100), &obs).unwrap(),
            predicted_date: date,
        }
    }

    #[test]
    fn table_pads_columns() {
        let out = render_table(&["a", "bb"], &[vec!["long".into(), "x".into()]]);
        assert_eq!(out, "| a    | bb |\n|------|----|\n| long | x  |\n");
    }

    #[test]
    fn schedule_groups_by_month() {
        let cur = Currencies {
            base: "USD",
            quote: "EUR",
        };
        let payments = vec![
            payment("KO", 2024, 7, 1),
            payment("T", 2024, 7, 20),
            payment("KO", 2024, 10, 1),
        ];
        let out = schedule(&payments, Decimal::ONE, &cur, OutputFormat::Table);
        assert_eq!(out.matches("July 2024").count(), 1);
        assert!(out.contains("October 2024"));
        assert!(out.contains("| KO     | 2024-07-01 | 100    | 0.49      | 48.50     | 48.50     |"));

        let tsv = schedule(&payments, Decimal::new(9, 1), &cur, OutputFormat::Tsv);
        assert_eq!(
            tsv.lines().nth(1),
            Some("KO\t2024-07-01\t100\t0.49\t48.50\t43.65")
        );
    }

    #[test]
    fn month_labels_are_spelled_out() {
        assert_eq!(month_label(2025, 2), "February 2025");
    }
}
