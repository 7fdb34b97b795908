//! Market Data Port (C1, spec §6 "Market Data Port (consumed)"): the
//! capability interface the rest of the engine is coded against. An HTTP
//! exchange adapter lives outside this repo's scope; only the trait
//! contract and a deterministic in-memory test double are specified here,
//! mirroring how `mqk-broker-paper` stands in for a real broker in the
//! teacher workspace.

use std::collections::HashMap;

use async_trait::async_trait;
use rg_schemas::Money;

use crate::types::{AssetBalance, ExchangeError, IsolatedMarginAccount};

#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn best_bid(&self, symbol: &str) -> Result<Money, ExchangeError>;
    async fn best_ask(&self, symbol: &str) -> Result<Money, ExchangeError>;
    async fn klines(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<rg_schemas::Candle>, ExchangeError>;
    async fn latest_funding_rate(&self, symbol: &str) -> Result<Money, ExchangeError>;
    /// Age, in seconds, of the most recent price update for `symbol`.
    async fn data_age(&self, symbol: &str) -> Result<i64, ExchangeError>;
    async fn account_balances(&self) -> Result<HashMap<String, AssetBalance>, ExchangeError>;
    async fn isolated_margin_account(&self, symbol: &str) -> Result<IsolatedMarginAccount, ExchangeError>;
}
