use rg_schemas::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rg_schemas::Side;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    StopLossLimit,
    TakeProfitLimit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SideEffectType {
    NoSideEffect,
    MarginBuy,
    AutoRepay,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    SpotToMargin,
    MarginToSpot,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub price: Money,
    pub qty: Money,
    pub commission: Money,
    pub commission_asset: String,
}

/// The common response shape for both `place_market` and
/// `create_margin_order` (§6): a committed order id plus whatever fills
/// happened synchronously.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlacedOrder {
    pub order_id: String,
    pub status: OrderStatus,
    pub fills: Vec<Fill>,
}

impl PlacedOrder {
    pub fn average_fill_price(&self) -> Option<Money> {
        if self.fills.is_empty() {
            return None;
        }
        let total_qty: Money = self.fills.iter().map(|f| f.qty).sum();
        if total_qty == Money::ZERO {
            return None;
        }
        let notional: Money = self.fills.iter().map(|f| f.price * f.qty).sum();
        Some(notional / total_qty)
    }

    pub fn filled_qty(&self) -> Money {
        self.fills.iter().map(|f| f.qty).sum()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssetBalance {
    pub free: Money,
    pub locked: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IsolatedMarginAccount {
    pub base_asset: String,
    pub quote_asset: String,
    pub base_balance: AssetBalance,
    pub quote_balance: AssetBalance,
    pub margin_level: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferResult {
    pub transaction_id: String,
}

/// Every Market Data Port / Execution Port call can fail and must
/// distinguish transient (retryable) from permanent errors (§6, §7).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("transient exchange error: {0}")]
    Transient(String),
    #[error("permanent exchange error: {0}")]
    Permanent(String),
}

impl ExchangeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}
