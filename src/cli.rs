use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "dividendero")]
#[command(about = "Dividend income forecaster with progressive tax estimates", long_about = None)]
pub struct Cli {
    /// Override Dividendero home directory (a config subdir will be created inside it).
    #[arg(long, env = "DIVIDENDERO_HOME")]
    pub home: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug). RUST_LOG overrides this.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Forecast(ForecastArgs),
    Tax(TaxArgs),
    Brackets(BracketsArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Tsv,
}

#[derive(Debug, Args)]
pub struct ForecastArgs {
    /// Path to the portfolio JSON (ticker -> shares or {shares, cost_per_share}).
    #[arg(long)]
    pub portfolio: PathBuf,

    /// Read payment history from a local JSON file instead of the market-data service.
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Use this base->quote rate instead of fetching one.
    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Evaluate as of this instant (RFC3339). Defaults to now.
    #[arg(long)]
    pub as_of: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,

    /// Also report invested capital and return on investment.
    #[arg(long)]
    pub roi: bool,

    #[command(flatten)]
    pub brackets: BracketsArgs,
}

#[derive(Debug, Args)]
pub struct TaxArgs {
    /// Gross yearly income in the quote currency.
    #[arg(allow_negative_numbers = true)]
    pub amount: Decimal,

    #[command(flatten)]
    pub brackets: BracketsArgs,
}

#[derive(Debug, Args, Clone)]
pub struct BracketsArgs {
    /// JSON array of {lower, upper, rate} brackets overriding the configured table.
    #[arg(long = "brackets")]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    Show,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}
