mod aggregate;
mod cli;
mod config;
mod domain;
mod fx;
mod logging;
mod market;
mod portfolio;
mod projection;
mod report;
mod summary;
mod tax;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing::info;

use crate::cli::{BracketsArgs, Cli, Command, ConfigCmd, ForecastArgs, TaxArgs};
use crate::config::{AppConfig, app_paths, load_brackets, load_or_init_config, now_utc};
use crate::domain::normalize_currency;
use crate::fx::{ExchangeRateApi, FixedRate, RateSource};
use crate::market::{HistoryFile, MarketData, YahooChart};
use crate::report::Currencies;
use crate::tax::BracketTable;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::logging::init_logging(cli.verbose)?;

    let paths = app_paths(cli.home.clone())?;
    let (cfg, cfg_path) = load_or_init_config(&paths)?;

    match cli.command {
        Command::Forecast(args) => handle_forecast(&cfg, args),
        Command::Tax(args) => handle_tax(&cfg, args),
        Command::Brackets(args) => {
            let table = resolve_brackets(&cfg, &args)?;
            print!("{}", report::brackets(&table, cli::OutputFormat::Table));
            Ok(())
        }
        Command::Config(args) => match args.cmd {
            ConfigCmd::Show => {
                println!("# {}", cfg_path.display());
                println!("{}", serde_json::to_string_pretty(&cfg)?);
                Ok(())
            }
        },
    }
}

fn resolve_brackets(cfg: &AppConfig, args: &BracketsArgs) -> Result<BracketTable> {
    match args.file.as_deref() {
        Some(path) => load_brackets(path),
        None => cfg.bracket_table(),
    }
}

fn parse_rfc3339_or_now(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(now_utc()),
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid RFC3339 timestamp: {s}"))?
            .with_timezone(&Utc)),
    }
}

fn handle_tax(cfg: &AppConfig, args: TaxArgs) -> Result<()> {
    let table = resolve_brackets(cfg, &args.brackets)?;
    let quote = normalize_currency(&cfg.quote_currency);
    let tax = tax::compute_tax(args.amount, &table)?;
    let net = args.amount - tax;
    println!(
        "Gross: {} {quote} | Tax: {} {quote} | Net: {} {quote}",
        report::money(args.amount),
        report::money(tax),
        report::money(net),
    );
    Ok(())
}

fn handle_forecast(cfg: &AppConfig, args: ForecastArgs) -> Result<()> {
    let table = resolve_brackets(cfg, &args.brackets)?;
    let now = parse_rfc3339_or_now(args.as_of.as_deref())?;
    let base = normalize_currency(&cfg.base_currency);
    let quote = normalize_currency(&cfg.quote_currency);

    // Without a rate none of the converted totals mean anything; stop before any output.
    let rate = match args.rate {
        Some(r) => FixedRate(r).rate(&base, &quote),
        None => ExchangeRateApi::new(&cfg.fx_url)?.rate(&base, &quote),
    }
    .with_context(|| format!("Failed to obtain {base}/{quote} rate"))?;
    info!(base = %base, quote = %quote, rate = %rate, "using exchange rate");

    let portfolio = portfolio::load_portfolio(&args.portfolio)?;
    let source: Box<dyn MarketData> = match args.history.as_deref() {
        Some(path) => Box::new(HistoryFile::load(path)?),
        None => Box::new(YahooChart::new(&cfg.market_data_url)?),
    };

    let histories = aggregate::collect_histories(source.as_ref(), &portfolio)
        .context("Payment history is malformed")?;
    let shares = portfolio::shares_by_ticker(&portfolio);
    let buckets = aggregate::aggregate_by_month(&histories, &shares, now, cfg.lookback_days)?;
    let predictions = projection::project(&buckets, now)?;
    info!(
        instruments = histories.len(),
        predictions = predictions.len(),
        "projection complete"
    );

    let cur = Currencies {
        base: &base,
        quote: &quote,
    };
    let monthly = summary::monthly_totals(&predictions, rate)?;
    let yearly = summary::yearly_totals(&predictions, rate)?;
    let taxes = summary::yearly_taxes(&yearly, &table)?;

    // Everything fallible happens before the first line is printed.
    let investment = if args.roi {
        let costs = summary::investment_costs(&portfolio, source.as_ref())?;
        let total_base = summary::checked_total(costs.values(), "total investment")?;
        let total_quote = summary::convert(total_base, rate, "total investment")?;

        let monthly_roi = monthly
            .iter()
            .map(|(&(y, m), t)| {
                (
                    report::month_label(y, m),
                    summary::roi_percent(t.quote, total_quote),
                    t.quote,
                )
            })
            .collect();
        let yearly_roi = yearly
            .iter()
            .map(|(y, t)| {
                (
                    y.to_string(),
                    summary::roi_percent(t.quote, total_quote),
                    t.quote,
                )
            })
            .collect();

        Some(report::Investment {
            total_base,
            total_quote,
            monthly_roi,
            yearly_roi,
            cur: &cur,
        })
    } else {
        None
    };

    println!("{}", report::schedule(&predictions, rate, &cur, args.format));
    println!("{}", report::monthly_totals(&monthly, &cur, args.format));
    println!("{}", report::yearly_totals(&yearly, &cur, args.format));
    print!("{}", report::yearly_taxes(&taxes, &cur, args.format));

    if let Some(inv) = investment {
        println!();
        print!("{}", report::investment(&inv, args.format));
    }

    Ok(())
}
