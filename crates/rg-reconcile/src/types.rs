//! Wire-level shape of one exchange order history entry and the sweep's
//! report, mirroring the teacher's `snapshot_adapter::RawBrokerOrder` /
//! `ReconcileReport` split between what the exchange hands back and what
//! the engine concludes from it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use rg_execution::types::Side;

/// One order as the exchange's order-history endpoint reports it. Distinct
/// from `rg_execution::types::PlacedOrder`: a `PlacedOrder` is this
/// engine's own record of a call it made; an `ExchangeOrderRecord` is
/// whatever the exchange says happened, independent of whether this engine
/// ever heard back from its own submission.
#[derive(Clone, Debug, PartialEq)]
pub struct ExchangeOrderRecord {
    pub exchange_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub asset: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub fee: Decimal,
    pub executed_at: DateTime<Utc>,
}

/// Outcome of sweeping one symbol: what the exchange reported, which of
/// those orders had no matching `AuditTransaction`, which of those gaps
/// were successfully backfilled, and which gaps required recreating a
/// missing Operation (§4.4) rather than only an AuditTransaction.
#[derive(Clone, Debug, PartialEq)]
pub struct SweepReport {
    pub symbol: String,
    pub scanned: usize,
    pub missing: Vec<ExchangeOrderRecord>,
    pub backfilled: Vec<Uuid>,
    pub recreated_operations: Vec<Uuid>,
}

impl SweepReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }
}
