//! Best-effort notifications about hedge placement and failures.
//!
//! Delivery failures are returned to the caller, which logs and drops them:
//! a notification never fails a rebalance cycle.

use crate::config::TelegramConfig;
use crate::strategy::{CycleKind, ExecutionReport, RebalancePlan, Strategy};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Sink for human-readable status messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Posts messages to a Telegram chat through the Bot API.
#[derive(Debug, Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        if self.bot_token.is_empty() || self.chat_id.is_empty() {
            warn!("Telegram credentials missing; skipping notification");
            return Ok(());
        }

        let url = format!("{}/bot{}/sendMessage", self.api_base_url, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: message,
            })
            .send()
            .await
            .context("Failed to send Telegram message")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API {}: {}", status, body);
        }
        Ok(())
    }
}

/// Writes messages to the log. Used when Telegram is not configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        info!(target: "funding_carry::notify", "\n{}", message);
        Ok(())
    }
}

fn format_amount(value: Decimal) -> String {
    value.round_dp(4).normalize().to_string()
}

fn format_usd(value: Decimal) -> String {
    format!("{:.2} $", value.round_dp(2))
}

fn headline(kind: CycleKind) -> &'static str {
    match kind {
        CycleKind::Initial => "🚀 New strategy in place!",
        CycleKind::Rebalance => "🔄 Strategy rebalanced",
    }
}

/// Summary of a completed cycle: target, actions and the selector's pick.
pub fn build_strategy_message(
    kind: CycleKind,
    plan: &RebalancePlan,
    report: &ExecutionReport,
    selected: Option<&Strategy>,
) -> String {
    let symbol = &plan.symbol;
    let mut lines = vec![
        headline(kind).to_string(),
        format!("Pair: {} ({}x)", symbol, plan.leverage.normalize()),
        format!("Reference price: {}", format_usd(plan.price)),
        String::new(),
        "🎯 Target exposure".to_string(),
        format!("• Spot: {} {}", format_amount(plan.target.spot_size), symbol),
        format!("• Perp: short {} {}", format_amount(plan.target.perp_size), symbol),
    ];

    let mut actions = Vec::new();
    if let Some(fill) = &report.spot {
        actions.push(format!("• Spot: {}", fill.describe(symbol)));
    }
    if let Some(fill) = &report.perp {
        actions.push(format!("• Perp: {}", fill.describe(symbol)));
    }
    if !actions.is_empty() {
        lines.push(String::new());
        lines.push("🛠️ Actions".to_string());
        lines.extend(actions);
    }

    if let Some(strategy) = selected {
        lines.push(String::new());
        lines.push(format!(
            "📊 Best carry: {} · {} · APY {:.2}% · score {:.2}",
            strategy.pair, strategy.direction, strategy.apy, strategy.score
        ));
    }

    lines.join("\n")
}

/// Notice that the cycle had nothing to deploy.
pub fn build_no_deploy_message(kind: CycleKind, symbol: &str) -> String {
    format!(
        "{}\nPair: {}\nNothing to deploy: no quote balance or budget available.",
        headline(kind),
        symbol
    )
}

/// Failure notice for a cycle that did not complete.
pub fn build_failure_message(kind: CycleKind, error: &str) -> String {
    let label = match kind {
        CycleKind::Initial => "Initial hedge",
        CycleKind::Rebalance => "Rebalance",
    };
    format!("⚠️ {} failed\n{}", label, error)
}
