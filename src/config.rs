use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::tax::{BracketTable, TaxBracket, default_brackets};

pub const DEFAULT_MARKET_DATA_URL: &str =
    "https://query1.finance.yahoo.com/v8/finance/chart/{ticker}?range=2y&interval=1mo&events=div";
/// Projection rolls a payment forward at most one year, so history older
/// than a year (plus a leap day) would be projected twice.
pub const MAX_LOOKBACK_DAYS: i64 = 366;
pub const DEFAULT_FX_URL: &str = "https://api.exchangerate-api.com/v4/latest/{base}";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Currency the market data is quoted in (e.g. USD).
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    /// Currency totals and taxes are reported in (e.g. EUR).
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,

    /// Trailing history window used for projection.
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    /// Chart endpoint; `{ticker}` is substituted.
    #[serde(default = "default_market_data_url")]
    pub market_data_url: String,

    /// Latest-rates endpoint; `{base}` is substituted.
    #[serde(default = "default_fx_url")]
    pub fx_url: String,

    /// Marginal brackets applied to yearly quote-currency income.
    #[serde(default = "default_brackets")]
    pub tax_brackets: Vec<TaxBracket>,
}

fn default_base_currency() -> String {
    "USD".to_string()
}

fn default_quote_currency() -> String {
    "EUR".to_string()
}

fn default_lookback_days() -> i64 {
    365
}

fn default_market_data_url() -> String {
    DEFAULT_MARKET_DATA_URL.to_string()
}

fn default_fx_url() -> String {
    DEFAULT_FX_URL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            quote_currency: default_quote_currency(),
            lookback_days: default_lookback_days(),
            market_data_url: default_market_data_url(),
            fx_url: default_fx_url(),
            tax_brackets: default_brackets(),
        }
    }
}

impl AppConfig {
    pub fn bracket_table(&self) -> Result<BracketTable> {
        BracketTable::new(self.tax_brackets.clone()).context("Invalid tax_brackets in config")
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
}

pub fn app_paths(override_home: Option<PathBuf>) -> Result<AppPaths> {
    if let Some(home) = override_home {
        return Ok(AppPaths {
            config_dir: home.join("config"),
        });
    }

    let proj = ProjectDirs::from("com", "dividendero", "dividendero")
        .context("Failed to resolve platform directories")?;

    Ok(AppPaths {
        config_dir: proj.config_dir().to_path_buf(),
    })
}

pub fn load_or_init_config(paths: &AppPaths) -> Result<(AppConfig, PathBuf)> {
    fs::create_dir_all(&paths.config_dir)
        .with_context(|| format!("Failed to create config dir {}", paths.config_dir.display()))?;

    let cfg_path = paths.config_dir.join("config.json");
    if !cfg_path.exists() {
        let cfg = AppConfig::default();
        write_config(&cfg_path, &cfg)?;
        return Ok((cfg, cfg_path));
    }

    let raw = fs::read_to_string(&cfg_path)
        .with_context(|| format!("Failed to read {}", cfg_path.display()))?;
    let cfg: AppConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", cfg_path.display()))?;

    if !(1..=MAX_LOOKBACK_DAYS).contains(&cfg.lookback_days) {
        anyhow::bail!(
            "Invalid lookback_days in {}: must be between 1 and {MAX_LOOKBACK_DAYS}, got {}",
            cfg_path.display(),
            cfg.lookback_days
        );
    }

    Ok((cfg, cfg_path))
}

pub fn write_config(path: &Path, cfg: &AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Reads a JSON array of brackets from `path`.
pub fn load_brackets(path: &Path) -> Result<BracketTable> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let brackets: Vec<TaxBracket> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    BracketTable::new(brackets).with_context(|| format!("Invalid bracket table in {}", path.display()))
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}
