//! Order-history source the sweep reads from. Not part of `ExecutionPort`
//! (spec §6's Execution Port never lists a history query) — exchanges that
//! support order placement don't all expose history the same way, so this
//! is its own narrow seam, implemented separately per exchange adapter.

use async_trait::async_trait;

use rg_execution::types::ExchangeError;

use crate::types::ExchangeOrderRecord;

#[async_trait]
pub trait ExchangeHistoryPort: Send + Sync {
    /// Every order the exchange has record of for `symbol`, most recent
    /// first or not — the sweep doesn't depend on ordering, only on set
    /// membership by `exchange_order_id`.
    async fn order_history(&self, symbol: &str) -> Result<Vec<ExchangeOrderRecord>, ExchangeError>;
}
