//! Execution Port (C2, spec §6 "Execution Port (consumed)"): places and
//! cancels spot and isolated-margin orders. Every call returns either a
//! committed order id or a structured [`ExchangeError`] — never a bare
//! exception, matching the teacher's `mqk-execution` decision-by-value
//! style generalized to an async exchange boundary.

use async_trait::async_trait;
use rg_schemas::Money;

use crate::types::{
    ExchangeError, OrderType, PlacedOrder, Side, SideEffectType, TimeInForce, TransferDirection,
    TransferResult,
};

#[async_trait]
pub trait ExecutionPort: Send + Sync {
    async fn place_market(
        &self,
        symbol: &str,
        side: Side,
        quantity: Money,
        idempotency_token: Option<&str>,
    ) -> Result<PlacedOrder, ExchangeError>;

    #[allow(clippy::too_many_arguments)]
    async fn create_margin_order(
        &self,
        symbol: &str,
        side: Side,
        order_type: OrderType,
        quantity: Money,
        price: Option<Money>,
        stop_price: Option<Money>,
        time_in_force: Option<TimeInForce>,
        isolated: bool,
        side_effect_type: Option<SideEffectType>,
    ) -> Result<PlacedOrder, ExchangeError>;

    async fn cancel(&self, symbol: &str, order_id: &str) -> Result<(), ExchangeError>;

    async fn transfer(
        &self,
        direction: TransferDirection,
        asset: &str,
        amount: Money,
        symbol: &str,
    ) -> Result<TransferResult, ExchangeError>;
}
