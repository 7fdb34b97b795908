//! Exchange Reconciliation (outbound sweep), spec.md §6: a periodic job
//! reads the exchange's order history for each symbol and, for each order
//! not matched by `exchange_order_id` in `AuditTransaction`, creates the
//! missing record. This is the mechanism that closes spec.md §4.4's PLAN/
//! VALIDATE/EXECUTE gap: "Exchange returns an order id but the local
//! transaction fails ... a reconciliation job reads exchange order ids
//! written outside the transaction and creates the missing Operation."
//!
//! The teacher's `mqk-reconcile` (`ArmStartGate`/`DriftAction`/
//! `SnapshotWatermark`) solves a different problem — halting live trading
//! on local/broker position drift — with no counterpart in this spec, which
//! has no broker-snapshot halt semantics at all; only the "unknown broker
//! order" half of that engine carries over, as `engine::find_missing`.

pub mod engine;
pub mod port;
pub mod sweep;
pub mod types;

pub use engine::find_missing;
pub use port::ExchangeHistoryPort;
pub use sweep::{sweep_all, sweep_symbol};
pub use types::{ExchangeOrderRecord, SweepReport};
