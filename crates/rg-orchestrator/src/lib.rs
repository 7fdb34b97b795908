//! Orchestrator (C12, §6): wires the Intent Pipeline (C7), Entry Gate (C6),
//! Pattern Engine (C10), and Portfolio Projection (C11) behind the Command
//! Interface spec.md §6 names — `submit_intent`, `get_intent`,
//! `cancel_operation`, `list_operations_with_movements`,
//! `evaluate_entry_gate`, `scan_patterns`, `recompute_portfolio` — as plain
//! `pub async fn`s on [`Orchestrator`]. No HTTP/serialization layer is
//! attached; an HTTP crate would adapt these the way the teacher's
//! `mqk-daemon::routes` adapts `mqk-execution`/`mqk-portfolio` calls, but
//! that adaptation is out of scope here (§1 Non-goals).

pub mod registry;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use rg_config::tenant::TenantConfig;
use rg_db::audit::AuditTransactionRow;
use rg_db::intent::TradingIntentRow;
use rg_db::operation::OperationRow;
use rg_execution::{ExecutionPort, MarketDataPort};
use rg_gate::{EntryGateDecision, GateContext};
use rg_intent::types::{ExecutionMode, IntentError, PlanInput};
use rg_intent::validate::RiskGuardContext;
use rg_pattern::{BridgeOutcome, PatternDetector, PatternScanOutcome};
use rg_portfolio::{PortfolioSnapshot, PriceDiscovery, ProfitSummary};
use rg_schemas::Money;

pub use registry::Registry;

/// Outcome of one `scan_patterns` call: every detector outcome from the
/// scan pass, plus the bridge outcome for each instance that reached
/// CONFIRMED during this pass (§4.7).
#[derive(Debug)]
pub struct PatternScanReport {
    pub outcomes: Vec<PatternScanOutcome>,
    pub bridged: Vec<BridgeOutcome>,
}

/// Combined result of `recompute_portfolio`: the BTC-denominated valuation
/// and the profit-since-inception figure, computed from the same
/// [`PriceDiscovery`] pass so both use identical prices (§4.8).
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioReport {
    pub snapshot: PortfolioSnapshot,
    pub profit: ProfitSummary,
}

/// A tenant's active Operations alongside the BTC value of each
/// Operation's movements (§6 `list_operations_with_movements`).
pub type OperationWithMovements = (OperationRow, Vec<(AuditTransactionRow, Money)>);

pub struct Orchestrator {
    pool: PgPool,
    market_data: Arc<dyn MarketDataPort>,
    execution_port: Arc<dyn ExecutionPort>,
    detectors: Vec<Box<dyn PatternDetector>>,
    registry: Registry,
    price_discovery: PriceDiscovery,
}

impl Orchestrator {
    pub fn new(pool: PgPool, market_data: Arc<dyn MarketDataPort>, execution_port: Arc<dyn ExecutionPort>) -> Self {
        Self {
            pool,
            market_data,
            execution_port,
            detectors: rg_pattern::canonical_detectors(),
            registry: Registry::new(),
            price_discovery: PriceDiscovery::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// PLAN -> VALIDATE -> EXECUTE (§4.4). LIVE executions are additionally
    /// subject to the tenant's rate-limit ceiling (§5) before reaching the
    /// exchange; a ceiling breach is reported as a validation failure
    /// rather than a silent drop.
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_intent(
        &self,
        tenant_id: Uuid,
        tenant_capital: Money,
        tenant_cfg: &TenantConfig,
        input: PlanInput,
        mode: ExecutionMode,
        gate_ctx: &GateContext,
        risk_ctx: &RiskGuardContext,
    ) -> Result<TradingIntentRow, IntentError> {
        let planned = rg_intent::plan(&self.pool, self.market_data.as_ref(), tenant_id, tenant_capital, input).await?;

        let validated = rg_intent::validate(&self.pool, gate_ctx, mode, risk_ctx, planned.intent_id).await?;

        if mode == ExecutionMode::Live && !self.registry.try_record_execution(tenant_id, tenant_cfg, Utc::now()) {
            return Err(IntentError::Validation(vec![
                "tenant execution rate limit exceeded".to_string(),
            ]));
        }

        rg_intent::execute(&self.pool, self.execution_port.as_ref(), validated.intent_id, mode, true, 0).await
    }

    pub async fn get_intent(&self, intent_id: Uuid) -> anyhow::Result<TradingIntentRow> {
        rg_db::intent::fetch_intent(&self.pool, intent_id).await
    }

    pub async fn cancel_operation(&self, operation_id: Uuid) -> anyhow::Result<()> {
        rg_db::operation::cancel_operation(&self.pool, operation_id).await
    }

    /// §6: a tenant's active Operations, each paired with its Audit Log
    /// movements valued in BTC.
    pub async fn list_operations_with_movements(&self, tenant_id: Uuid) -> anyhow::Result<Vec<OperationWithMovements>> {
        let operations = rg_db::operation::list_active_operations_for_tenant(&self.pool, tenant_id).await?;
        let mut out = Vec::with_capacity(operations.len());
        for op in operations {
            let movements =
                rg_portfolio::operation_movements_btc(&self.pool, self.market_data.as_ref(), &self.price_discovery, op.operation_id)
                    .await?;
            out.push((op, movements));
        }
        Ok(out)
    }

    pub async fn evaluate_entry_gate(&self, ctx: &GateContext) -> anyhow::Result<EntryGateDecision> {
        rg_gate::evaluate_and_persist(&self.pool, ctx).await
    }

    /// §4.7: one scan pass over `symbol`/`timeframe`, bridging every
    /// instance that reached CONFIRMED during this pass into the Intent
    /// Pipeline against the tenant's standing subscriptions (`self.registry`).
    #[allow(clippy::too_many_arguments)]
    pub async fn scan_patterns(
        &self,
        tenant_id: Uuid,
        tenant_capital: Money,
        symbol: &str,
        timeframe: &str,
        gate_ctx: &GateContext,
        risk_ctx: &RiskGuardContext,
    ) -> anyhow::Result<PatternScanReport> {
        let outcomes = rg_pattern::scan(
            &self.pool,
            self.market_data.as_ref(),
            tenant_id,
            symbol,
            timeframe,
            &self.detectors,
        )
        .await?;

        let configs = self.registry.pattern_configs_for(tenant_id);
        let mut bridged = Vec::new();
        for outcome in &outcomes {
            if let PatternScanOutcome::Confirmed(instance) = outcome {
                let result = rg_pattern::bridge_confirmed_instance(
                    &self.pool,
                    self.market_data.as_ref(),
                    self.execution_port.as_ref(),
                    tenant_id,
                    tenant_capital,
                    &configs,
                    instance,
                    gate_ctx,
                    risk_ctx,
                )
                .await?;
                bridged.push(result);
            }
        }

        Ok(PatternScanReport { outcomes, bridged })
    }

    /// §4.8: fold account balances and the Audit Log into a BTC-denominated
    /// valuation and a profit-since-`since` figure, using one
    /// [`PriceDiscovery`] pass so both numbers price every asset the same
    /// way.
    pub async fn recompute_portfolio(
        &self,
        tenant_id: Uuid,
        margin_symbols: &[String],
        since: Option<DateTime<Utc>>,
    ) -> anyhow::Result<PortfolioReport> {
        let snapshot =
            rg_portfolio::total_portfolio_btc(self.market_data.as_ref(), &self.price_discovery, tenant_id, margin_symbols)
                .await?;
        let profit = rg_portfolio::calculate_profit_btc(
            &self.pool,
            self.market_data.as_ref(),
            &self.price_discovery,
            tenant_id,
            margin_symbols,
            since,
        )
        .await?;

        Ok(PortfolioReport { snapshot, profit })
    }
}
