//! Configuration management for the funding carry bot.
//!
//! Loads settings from `.env`, an optional `config` file and environment
//! variables (`CARRY__SECTION__KEY`). The flat variable names used by earlier
//! deployments (`API_KEY`, `TARGET_SYMBOL`, ...) are still honored and win over
//! everything else.

use crate::strategy::DEFAULT_ALLOWED_BASES;
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest allowed rebalance interval.
pub const MIN_REBALANCE_INTERVAL_HOURS: f64 = 1.0;
/// Longest accepted rebalance interval (one week).
pub const MAX_REBALANCE_INTERVAL_HOURS: f64 = 7.0 * 24.0;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Venue endpoint and credentials
    #[serde(default)]
    pub exchange: ExchangeConfig,
    /// What to hedge and how often
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    /// Telegram notifications (optional)
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key for authentication
    #[serde(default)]
    pub api_key: String,
    /// Secret used to sign request bodies
    #[serde(default)]
    pub api_secret: String,
    /// Subaccount to trade on, if any
    #[serde(default)]
    pub subaccount: Option<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// How the traded instrument is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Always hedge `strategy.symbol`
    #[default]
    Fixed,
    /// Hedge the selector's pick from the first cycle, then keep it
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Instrument to hedge in fixed mode
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Perp leverage applied to the hedge
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    /// Quote amount to deploy (0 = all available capital)
    #[serde(default)]
    pub quote_to_deploy: Decimal,
    /// Hours between rebalances, floored at 1
    #[serde(default = "default_rebalance_interval_hours")]
    pub rebalance_interval_hours: f64,
    #[serde(default)]
    pub selection_mode: SelectionMode,
    /// Instruments the selector may pick
    #[serde(default = "default_allowed_bases")]
    pub allowed_bases: Vec<String>,
    /// Score floor for preferred candidates
    #[serde(default = "default_min_score")]
    pub min_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    /// How long last-known-good rows may be served after a failed fetch
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_telegram_api")]
    pub api_base_url: String,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

// Default value functions
fn default_base_url() -> String {
    "https://api.hyperliquid.xyz".to_string()
}

fn default_request_timeout() -> u64 {
    15
}

fn default_symbol() -> String {
    "ETH".to_string()
}

fn default_leverage() -> Decimal {
    Decimal::ONE
}

fn default_rebalance_interval_hours() -> f64 {
    8.0
}

fn default_allowed_bases() -> Vec<String> {
    DEFAULT_ALLOWED_BASES.iter().map(|b| b.to_string()).collect()
}

fn default_min_score() -> f64 {
    crate::strategy::MIN_STRATEGY_SCORE
}

fn default_cache_ttl() -> u64 {
    600
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}

/// Flat variable names kept for existing deployments, mapped to their keys.
const LEGACY_ENV_OVERRIDES: [(&str, &str); 10] = [
    ("API_KEY", "exchange.api_key"),
    ("API_SECRET", "exchange.api_secret"),
    ("SUBACCOUNT", "exchange.subaccount"),
    ("HYPERLIQUID_BASE_URL", "exchange.base_url"),
    ("TARGET_SYMBOL", "strategy.symbol"),
    ("DEFAULT_LEVERAGE", "strategy.leverage"),
    ("QUOTE_TO_DEPLOY", "strategy.quote_to_deploy"),
    ("REBALANCE_INTERVAL_HOURS", "strategy.rebalance_interval_hours"),
    ("TELEGRAM_BOT_TOKEN", "telegram.bot_token"),
    ("TELEGRAM_CHAT_ID", "telegram.chat_id"),
];

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("CARRY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("strategy.allowed_bases")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV_OVERRIDES {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder
                .set_override_option(key, value)
                .with_context(|| format!("Invalid override for {}", var))?;
        }

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.strategy.leverage > Decimal::ZERO,
            "leverage must be positive"
        );

        anyhow::ensure!(
            self.strategy.quote_to_deploy >= Decimal::ZERO,
            "quote_to_deploy must not be negative"
        );

        anyhow::ensure!(
            !self.strategy.symbol.trim().is_empty(),
            "strategy symbol must not be empty"
        );

        anyhow::ensure!(
            self.strategy.allowed_bases.iter().any(|b| !b.trim().is_empty()),
            "allowed_bases must contain at least one instrument"
        );

        anyhow::ensure!(
            self.exchange.request_timeout_secs > 0,
            "request_timeout_secs must be positive"
        );

        let hours = self.strategy.rebalance_interval_hours;
        anyhow::ensure!(
            hours.is_finite() && hours <= MAX_REBALANCE_INTERVAL_HOURS,
            "rebalance_interval_hours must be finite and at most {} (got {})",
            MAX_REBALANCE_INTERVAL_HOURS,
            hours
        );

        let min_score = self.strategy.min_score;
        anyhow::ensure!(
            min_score.is_finite() && (0.0..=10.0).contains(&min_score),
            "min_score must be within [0, 10] (got {})",
            min_score
        );

        Ok(())
    }
}

impl ExchangeConfig {
    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl StrategyConfig {
    /// Interval between periodic rebalances, clamped to one hour .. one week.
    pub fn rebalance_interval(&self) -> Duration {
        let hours = if self.rebalance_interval_hours.is_finite() {
            self.rebalance_interval_hours
                .clamp(MIN_REBALANCE_INTERVAL_HOURS, MAX_REBALANCE_INTERVAL_HOURS)
        } else {
            default_rebalance_interval_hours()
        };
        Duration::from_secs_f64(hours * 3600.0)
    }

    /// Configured symbol, upper-cased.
    pub fn normalized_symbol(&self) -> String {
        self.symbol.trim().to_uppercase()
    }
}

impl MarketDataConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            api_secret: String::new(),
            subaccount: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            leverage: default_leverage(),
            quote_to_deploy: Decimal::ZERO,
            rebalance_interval_hours: default_rebalance_interval_hours(),
            selection_mode: SelectionMode::default(),
            allowed_bases: default_allowed_bases(),
            min_score: default_min_score(),
        }
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_telegram_api(),
            bot_token: String::new(),
            chat_id: String::new(),
        }
    }
}
