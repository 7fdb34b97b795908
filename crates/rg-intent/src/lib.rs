//! Intent Pipeline (C7, spec §4.4): PLAN -> VALIDATE -> EXECUTE. Each phase
//! is a free function rather than a single monolithic `run()`, so the
//! orchestrator can interleave other crates' calls (pattern triggers, rate
//! limiting) between phases and persist/replay state at each boundary.
//! Idempotent-event handling and illegal-transition-as-error are grounded
//! in the teacher's order state machine (`mqk-execution::oms::state_
//! machine::OmsOrder::apply`); idempotency-key derivation reuses
//! `rg_schemas::stable_hash`, grounded the same way the teacher's
//! `mqk-audit::derive_event_id` derives event ids: deterministic from
//! ordered inputs, no RNG.

pub mod execute;
pub mod plan;
pub mod types;
pub mod validate;

pub use execute::execute;
pub use plan::plan;
pub use types::{ExecutionMode, IntentError, PlanInput, Side};
pub use validate::{validate, RiskGuardContext};
