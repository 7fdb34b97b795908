//! Deterministic in-memory paper adapters for both ports. Grounded in the
//! teacher's `mqk-broker-paper`: idempotent submission keyed by a caller
//! id, immediate synchronous fills, no randomness, no wall-clock in the
//! decision path. `dashmap` replaces the teacher's single-threaded
//! `BTreeMap` because this engine's Stop Monitor and Intent Pipeline submit
//! concurrently from multiple worker tasks against the same adapter
//! instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rg_schemas::{Candle, Money};
use rust_decimal_macros::dec;
use uuid::Uuid;

use crate::execution::ExecutionPort;
use crate::market_data::MarketDataPort;
use crate::types::{
    AssetBalance, ExchangeError, Fill, IsolatedMarginAccount, OrderStatus, OrderType, PlacedOrder,
    Side, SideEffectType, TimeInForce, TransferDirection, TransferResult,
};

#[derive(Clone, Debug)]
struct PriceState {
    bid: Money,
    ask: Money,
    updated_at: DateTime<Utc>,
}

/// In-memory market data double. Prices, funding rates, klines, and
/// balances are all set explicitly by the caller (test setup or the
/// orchestrator wiring in dry-run/demo mode) rather than fetched.
#[derive(Default)]
pub struct PaperMarketData {
    prices: DashMap<String, PriceState>,
    funding_rates: DashMap<String, Money>,
    klines: DashMap<(String, String), Vec<Candle>>,
    balances: DashMap<String, AssetBalance>,
    margin_accounts: DashMap<String, IsolatedMarginAccount>,
}

impl PaperMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, symbol: &str, bid: Money, ask: Money, updated_at: DateTime<Utc>) {
        self.prices.insert(symbol.to_string(), PriceState { bid, ask, updated_at });
    }

    pub fn set_funding_rate(&self, symbol: &str, rate: Money) {
        self.funding_rates.insert(symbol.to_string(), rate);
    }

    pub fn set_klines(&self, symbol: &str, timeframe: &str, candles: Vec<Candle>) {
        self.klines.insert((symbol.to_string(), timeframe.to_string()), candles);
    }

    pub fn set_balance(&self, asset: &str, free: Money, locked: Money) {
        self.balances.insert(asset.to_string(), AssetBalance { free, locked });
    }

    pub fn set_margin_account(&self, symbol: &str, account: IsolatedMarginAccount) {
        self.margin_accounts.insert(symbol.to_string(), account);
    }
}

#[async_trait]
impl MarketDataPort for PaperMarketData {
    async fn best_bid(&self, symbol: &str) -> Result<Money, ExchangeError> {
        self.prices
            .get(symbol)
            .map(|p| p.bid)
            .ok_or_else(|| ExchangeError::Permanent(format!("no price set for {symbol}")))
    }

    async fn best_ask(&self, symbol: &str) -> Result<Money, ExchangeError> {
        self.prices
            .get(symbol)
            .map(|p| p.ask)
            .ok_or_else(|| ExchangeError::Permanent(format!("no price set for {symbol}")))
    }

    async fn klines(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>, ExchangeError> {
        let key = (symbol.to_string(), timeframe.to_string());
        let candles = self.klines.get(&key).map(|c| c.clone()).unwrap_or_default();
        let start = candles.len().saturating_sub(limit);
        Ok(candles[start..].to_vec())
    }

    async fn latest_funding_rate(&self, symbol: &str) -> Result<Money, ExchangeError> {
        Ok(self.funding_rates.get(symbol).map(|r| *r).unwrap_or(dec!(0)))
    }

    async fn data_age(&self, symbol: &str) -> Result<i64, ExchangeError> {
        let state = self
            .prices
            .get(symbol)
            .ok_or_else(|| ExchangeError::Permanent(format!("no price set for {symbol}")))?;
        Ok((Utc::now() - state.updated_at).num_seconds().max(0))
    }

    async fn account_balances(&self) -> Result<HashMap<String, AssetBalance>, ExchangeError> {
        Ok(self.balances.iter().map(|e| (e.key().clone(), *e.value())).collect())
    }

    async fn isolated_margin_account(&self, symbol: &str) -> Result<IsolatedMarginAccount, ExchangeError> {
        self.margin_accounts
            .get(symbol)
            .map(|a| a.clone())
            .ok_or_else(|| ExchangeError::Permanent(format!("no margin account set for {symbol}")))
    }
}

/// In-memory execution double. `fill_prices` is consulted for the price a
/// market order fills at; when unset, the order is rejected the way a real
/// exchange would reject a symbol it doesn't recognize — so tests must be
/// explicit about what fills, rather than silently filling at zero.
pub struct PaperExchange {
    fill_prices: DashMap<String, Money>,
    commission_rate: Money,
    orders: DashMap<String, PlacedOrder>,
    transfers: DashMap<String, TransferResult>,
    /// Count of calls that actually hit the "exchange" (excludes idempotent
    /// replays returning a cached result) — the mechanism behind I4's
    /// "calls the Execution Port exactly once" assertion.
    submit_count: AtomicU64,
}

impl Default for PaperExchange {
    fn default() -> Self {
        PaperExchange {
            fill_prices: DashMap::new(),
            commission_rate: dec!(0.001),
            orders: DashMap::new(),
            transfers: DashMap::new(),
            submit_count: AtomicU64::new(0),
        }
    }
}

impl PaperExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fill_price(&self, symbol: &str, price: Money) {
        self.fill_prices.insert(symbol.to_string(), price);
    }

    pub fn submit_count(&self) -> u64 {
        self.submit_count.load(Ordering::SeqCst)
    }

    fn fill_order(&self, symbol: &str, quantity: Money) -> Result<PlacedOrder, ExchangeError> {
        let price = self
            .fill_prices
            .get(symbol)
            .map(|p| *p)
            .ok_or_else(|| ExchangeError::Permanent(format!("no fill price configured for {symbol}")))?;
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        Ok(PlacedOrder {
            order_id: Uuid::new_v4().to_string(),
            status: OrderStatus::Filled,
            fills: vec![Fill {
                price,
                qty: quantity,
                commission: quantity * price * self.commission_rate,
                commission_asset: "USDT".to_string(),
            }],
        })
    }
}

#[async_trait]
impl ExecutionPort for PaperExchange {
    async fn place_market(
        &self,
        symbol: &str,
        _side: Side,
        quantity: Money,
        idempotency_token: Option<&str>,
    ) -> Result<PlacedOrder, ExchangeError> {
        if let Some(token) = idempotency_token {
            if let Some(existing) = self.orders.get(token) {
                return Ok(existing.clone());
            }
        }

        let placed = self.fill_order(symbol, quantity)?;

        if let Some(token) = idempotency_token {
            self.orders.insert(token.to_string(), placed.clone());
        }

        Ok(placed)
    }

    async fn create_margin_order(
        &self,
        symbol: &str,
        _side: Side,
        _order_type: OrderType,
        quantity: Money,
        _price: Option<Money>,
        _stop_price: Option<Money>,
        _time_in_force: Option<TimeInForce>,
        _isolated: bool,
        _side_effect_type: Option<SideEffectType>,
    ) -> Result<PlacedOrder, ExchangeError> {
        self.fill_order(symbol, quantity)
    }

    async fn cancel(&self, _symbol: &str, order_id: &str) -> Result<(), ExchangeError> {
        match self.orders.get_mut(order_id) {
            Some(mut order) => {
                order.status = OrderStatus::Cancelled;
                Ok(())
            }
            None => Err(ExchangeError::Permanent(format!("unknown order {order_id}"))),
        }
    }

    async fn transfer(
        &self,
        direction: TransferDirection,
        asset: &str,
        amount: Money,
        symbol: &str,
    ) -> Result<TransferResult, ExchangeError> {
        let key = format!("{direction:?}:{asset}:{amount}:{symbol}");
        if let Some(existing) = self.transfers.get(&key) {
            return Ok(existing.clone());
        }
        let result = TransferResult {
            transaction_id: Uuid::new_v4().to_string(),
        };
        self.transfers.insert(key, result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idempotent_submission_calls_exchange_once() {
        let exchange = PaperExchange::new();
        exchange.set_fill_price("BTCUSDT", dec!(95000));

        let token = "intent-1:execute:0";
        let a = exchange
            .place_market("BTCUSDT", Side::Buy, dec!(0.1), Some(token))
            .await
            .unwrap();
        let b = exchange
            .place_market("BTCUSDT", Side::Buy, dec!(0.1), Some(token))
            .await
            .unwrap();

        assert_eq!(a.order_id, b.order_id);
        assert_eq!(exchange.submit_count(), 1);
    }

    #[tokio::test]
    async fn missing_fill_price_is_permanent_error() {
        let exchange = PaperExchange::new();
        let err = exchange.place_market("ETHUSDT", Side::Buy, dec!(1), None).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn data_age_reflects_elapsed_time() {
        let md = PaperMarketData::new();
        md.set_price("BTCUSDT", dec!(94999), dec!(95001), Utc::now() - chrono::Duration::seconds(42));
        let age = md.data_age("BTCUSDT").await.unwrap();
        assert!(age >= 42);
    }
}
