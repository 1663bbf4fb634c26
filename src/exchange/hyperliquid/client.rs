//! Hyperliquid REST API client.
//!
//! All calls are JSON `POST`s to `/info` or `/trade`. Account and order
//! requests are authenticated with an HMAC-SHA256 signature of the exact
//! request body.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::types::*;
use crate::config::ExchangeConfig;
use crate::error::EngineError;
use crate::exchange::traits::{ExchangeClient, MarketDataSource};
use crate::exchange::types::{Balance, OrderAck, PerpOrder, Position, SpotOrder, Trade};
use crate::market::MarketSnapshot;

/// Base URL for Hyperliquid mainnet API.
const MAINNET_API_URL: &str = "https://api.hyperliquid.xyz";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Hex-encoded HMAC-SHA256 of `body` keyed with `secret`.
pub fn sign_body(secret: &str, body: &str) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow!("Invalid signing key: {}", e))?;
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Hyperliquid API client for market data, account state and orders.
#[derive(Debug, Clone)]
pub struct HyperliquidClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    subaccount: Option<String>,
}

impl HyperliquidClient {
    /// Create a client from configuration.
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            subaccount: config.subaccount.clone().filter(|s| !s.is_empty()),
        })
    }

    /// Create an unauthenticated client for public market data.
    pub fn public(base_url: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or(MAINNET_API_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: String::new(),
            api_secret: String::new(),
            subaccount: None,
        })
    }

    async fn post<T: Serialize>(&self, path: &str, payload: &T, needs_auth: bool) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let body = serde_json::to_string(payload).context("Failed to encode request body")?;

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json");

        if needs_auth {
            if self.api_key.is_empty() || self.api_secret.is_empty() {
                return Err(EngineError::MissingCredentials.into());
            }
            let signature = sign_body(&self.api_secret, &body)?;
            request = request
                .header("X-API-KEY", &self.api_key)
                .header("X-SIGNATURE", signature);
            if let Some(subaccount) = &self.subaccount {
                request = request.header("X-SUBACCOUNT", subaccount);
            }
        }

        let response = request
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", path))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Hyperliquid API error {}: {}", status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", path))
    }

    async fn info(&self, request: &InfoRequest) -> Result<Value> {
        self.post("/info", request, request.needs_auth()).await
    }

    /// Get metadata and asset contexts for all perpetuals.
    #[instrument(skip(self), name = "hl_meta_and_asset_ctxs")]
    pub async fn get_meta_and_asset_ctxs(&self) -> Result<MetaAndAssetCtxsResponse> {
        let value = self.info(&InfoRequest::MetaAndAssetCtxs).await?;
        let data: MetaAndAssetCtxsResponse =
            serde_json::from_value(value).context("Failed to parse metaAndAssetCtxs response")?;

        debug!("Fetched {} assets from Hyperliquid", data.0.universe.len());
        Ok(data)
    }

    /// Current market snapshot of every perpetual.
    #[instrument(skip(self), name = "hl_get_snapshots")]
    pub async fn get_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
        let (meta, ctxs) = self.get_meta_and_asset_ctxs().await?;
        let rows = snapshots_from_meta(meta, ctxs)?;
        info!("Fetched {} Hyperliquid perpetual snapshots", rows.len());
        Ok(rows)
    }

    async fn place_order(&self, request: TradeRequest) -> Result<OrderAck> {
        let value = self.post("/trade", &request, true).await?;
        parse_order_ack(&value)
    }
}

#[async_trait]
impl ExchangeClient for HyperliquidClient {
    #[instrument(skip(self), name = "hl_get_balances")]
    async fn get_balances(&self) -> Result<Vec<Balance>> {
        let value = self.info(&InfoRequest::WalletBalances).await?;
        parse_balances(value).context("Failed to parse walletBalances response")
    }

    #[instrument(skip(self), name = "hl_get_positions")]
    async fn get_positions(&self) -> Result<Vec<Position>> {
        let value = self.info(&InfoRequest::OpenPositions).await?;
        parse_positions(value).context("Failed to parse openPositions response")
    }

    #[instrument(skip(self), name = "hl_get_recent_trades")]
    async fn get_recent_trades(&self, symbol: &str) -> Result<Vec<Trade>> {
        let request = InfoRequest::Trades {
            coin: symbol.to_string(),
        };
        let value = self.info(&request).await?;
        parse_trades(value).context("Failed to parse trades response")
    }

    #[instrument(skip(self, order), fields(symbol = %order.symbol, side = %order.side, size = %order.size))]
    async fn place_spot_order(&self, order: &SpotOrder) -> Result<OrderAck> {
        self.place_order(TradeRequest::SpotOrder {
            order: WireOrder {
                coin: order.symbol.clone(),
                side: order.side,
                size: order.size,
                price: order.price,
                reduce_only: false,
                tif: TimeInForce::Gtc,
                client_order_id: None,
            },
        })
        .await
    }

    #[instrument(skip(self, order), fields(symbol = %order.symbol, side = %order.side, size = %order.size))]
    async fn place_perp_order(&self, order: &PerpOrder) -> Result<OrderAck> {
        self.place_order(TradeRequest::PerpOrder {
            order: WireOrder {
                coin: order.symbol.clone(),
                side: order.side,
                size: order.size,
                price: order.price,
                reduce_only: order.reduce_only,
                tif: TimeInForce::Gtc,
                client_order_id: None,
            },
        })
        .await
    }
}

#[async_trait]
impl MarketDataSource for HyperliquidClient {
    async fn fetch_snapshots(&self) -> Result<Vec<MarketSnapshot>> {
        self.get_snapshots().await
    }
}
