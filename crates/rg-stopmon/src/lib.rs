//! Stop Monitor (C8) and Trailing-Stop Calculator (C9), §4.5-§4.6.
//!
//! [`monitor`] is the event-sourced engine that watches triggered stops and
//! submits exactly one closing order per `(operation_id, execution_token)`.
//! [`trailing`] is the pure step function that advances a stop as a
//! position moves into profit; its output feeds back into `monitor`'s
//! watched stop price through `rg_db::trailing::apply_adjustment`.

pub mod monitor;
pub mod trailing;
pub mod types;

pub use monitor::{evaluate_and_execute, StopOutcome};
pub use trailing::{calculate_adjustment, AdjustmentReason, StopAdjustment, TrailingFeeConfig, TrailingStopState};
pub use types::{execution_token, is_triggered, PositionSide, PriceSource, StopMonitorError, StopWatch};
