//! Wire types for the Hyperliquid API.
//!
//! Account endpoints are decoded leniently: field names differ between API
//! revisions and subaccount views, so records are read as JSON objects and the
//! first present alias wins.

use crate::exchange::types::{Balance, OrderAck, OrderSide, Position, PositionKind, Trade};
use crate::market::{FundingInterval, MarketSnapshot};
use crate::utils::decimal::{decimal_to_f64, parse_decimal};
use anyhow::{bail, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Request body for the info endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum InfoRequest {
    /// Metadata and asset contexts (funding rates, prices, OI).
    #[serde(rename = "metaAndAssetCtxs")]
    MetaAndAssetCtxs,

    #[serde(rename = "walletBalances")]
    WalletBalances,

    #[serde(rename = "openPositions")]
    OpenPositions,

    /// Recent public trades for one coin.
    #[serde(rename = "trades")]
    Trades { coin: String },
}

impl InfoRequest {
    /// Whether the request must carry signed credentials.
    pub fn needs_auth(&self) -> bool {
        matches!(self, InfoRequest::WalletBalances | InfoRequest::OpenPositions)
    }
}

/// Time in force for limit orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TimeInForce {
    /// Good till cancel
    Gtc,
}

/// Order payload shared by spot and perp requests.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireOrder {
    pub coin: String,
    pub side: OrderSide,
    pub size: Decimal,
    pub price: Decimal,
    pub reduce_only: bool,
    pub tif: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

/// Request body for the trade endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TradeRequest {
    #[serde(rename = "spotOrder")]
    SpotOrder { order: WireOrder },

    #[serde(rename = "perpOrder")]
    PerpOrder { order: WireOrder },
}

/// Response from metaAndAssetCtxs endpoint.
/// Returns a tuple of (Meta, Vec<AssetCtx>).
pub type MetaAndAssetCtxsResponse = (Meta, Vec<AssetCtx>);

/// Universe metadata for perpetuals.
#[derive(Debug, Clone, Deserialize)]
pub struct Meta {
    pub universe: Vec<AssetMeta>,
}

/// Metadata for a single asset in the universe.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMeta {
    /// Asset name (e.g., "BTC", "ETH")
    pub name: String,
    #[serde(default)]
    pub max_leverage: Option<u32>,
}

/// Real-time context for an asset (prices, funding, volume).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCtx {
    /// Current funding rate (hourly, as decimal string)
    #[serde(default, deserialize_with = "deserialize_decimal_str_option_null")]
    pub funding: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_option_null")]
    pub open_interest: Option<Decimal>,
    /// Daily notional volume
    #[serde(default, deserialize_with = "deserialize_decimal_str_option_null")]
    pub day_ntl_vlm: Option<Decimal>,
    /// Premium over oracle price (null for inactive coins)
    #[serde(default, deserialize_with = "deserialize_decimal_str_option_null")]
    pub premium: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_option_null")]
    pub oracle_px: Option<Decimal>,
    #[serde(default, deserialize_with = "deserialize_decimal_str_option_null")]
    pub mark_px: Option<Decimal>,
}

fn to_f64(value: Option<Decimal>) -> f64 {
    value.map(decimal_to_f64).unwrap_or(0.0)
}

/// Zip universe metadata with asset contexts into hourly snapshots.
pub fn snapshots_from_meta(meta: Meta, ctxs: Vec<AssetCtx>) -> Result<Vec<MarketSnapshot>> {
    if meta.universe.len() != ctxs.len() {
        bail!(
            "Mismatch between universe ({}) and contexts ({})",
            meta.universe.len(),
            ctxs.len()
        );
    }

    Ok(meta
        .universe
        .into_iter()
        .zip(ctxs)
        .map(|(m, c)| {
            let mut snapshot = MarketSnapshot::new(&m.name, to_f64(c.funding), FundingInterval::Hourly)
                .with_prices(to_f64(c.mark_px), c.oracle_px.map(decimal_to_f64))
                .with_liquidity(to_f64(c.day_ntl_vlm), to_f64(c.open_interest))
                .with_premium(to_f64(c.premium));
            snapshot.max_leverage = m.max_leverage.map(f64::from);
            snapshot
        })
        .collect())
}

fn first_field<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| record.get(*k))
        .find(|v| !v.is_null())
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_decimal(value: &Value) -> Option<Decimal> {
    value_as_string(value).and_then(|s| parse_decimal(&s))
}

/// Records of a list response, either a bare array or wrapped under `key`.
fn list_records(value: Value, key: &str) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut obj) => match obj.remove(key) {
            Some(Value::Array(items)) => Ok(items),
            _ => bail!("Unexpected response shape: expected an array or `{}`", key),
        },
        other => bail!("Unexpected response shape: {}", other),
    }
}

/// Decode a walletBalances response.
pub fn parse_balances(value: Value) -> Result<Vec<Balance>> {
    let balances = list_records(value, "balances")?
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| {
            let asset = first_field(record, &["coin", "asset"]).and_then(value_as_string)?;
            let available = first_field(record, &["available", "availableBalance", "spot", "balance", "total"])
                .and_then(value_as_decimal)
                .unwrap_or(Decimal::ZERO);
            Some(Balance::new(&asset, available))
        })
        .collect();
    Ok(balances)
}

/// Decode an openPositions response. Records without a parsable size are dropped.
pub fn parse_positions(value: Value) -> Result<Vec<Position>> {
    let positions = list_records(value, "positions")?
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| {
            let symbol = first_field(record, &["coin", "asset", "symbol", "pair"]).and_then(value_as_string)?;
            let size = match first_field(record, &["sz", "size", "positionSize"]).and_then(value_as_decimal) {
                Some(size) => size,
                None => {
                    debug!(symbol = %symbol, "Skipping position without a parsable size");
                    return None;
                }
            };
            let kind = first_field(record, &["type", "kind", "product"])
                .and_then(Value::as_str)
                .map(PositionKind::from_label)
                .unwrap_or(PositionKind::Spot);
            Some(Position { symbol, size, kind })
        })
        .collect();
    Ok(positions)
}

/// Decode a trades response. Records may be `{price}`, `{px}`, `[px, ...]`,
/// or a bare number or string.
pub fn parse_trades(value: Value) -> Result<Vec<Trade>> {
    let trades = list_records(value, "trades")?
        .iter()
        .map(|record| {
            let raw = match record {
                Value::Object(obj) => first_field(obj, &["price", "px"]).and_then(value_as_string),
                Value::Array(items) => items.first().and_then(value_as_string),
                other => value_as_string(other),
            };
            Trade::new(raw.unwrap_or_default())
        })
        .collect();
    Ok(trades)
}

/// Decode an order acknowledgement. A `status` of `err`/`error` is a rejection.
pub fn parse_order_ack(value: &Value) -> Result<OrderAck> {
    let record = value.as_object();
    let order_id = record
        .and_then(|r| first_field(r, &["orderId", "oid", "id"]))
        .and_then(value_as_string);
    let status = record
        .and_then(|r| first_field(r, &["status"]))
        .and_then(value_as_string)
        .unwrap_or_else(|| "ok".to_string());

    if status.eq_ignore_ascii_case("err") || status.eq_ignore_ascii_case("error") {
        let reason = record
            .and_then(|r| first_field(r, &["error", "message", "response"]))
            .map(|v| value_as_string(v).unwrap_or_else(|| v.to_string()))
            .unwrap_or_else(|| "no reason given".to_string());
        bail!("Order rejected by exchange: {}", reason);
    }

    Ok(OrderAck { order_id, status })
}

/// Deserializer that handles null values, missing fields and empty strings.
fn deserialize_decimal_str_option_null<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<Value> = Option::deserialize(deserializer)?;
    Ok(opt.as_ref().and_then(value_as_decimal))
}
