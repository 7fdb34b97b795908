//! Process-wide mutable singleton state (§5): per-tenant execution rate
//! limiting and each tenant's standing pattern-engine subscriptions.
//! Per-symbol circuit breaker state is deliberately NOT duplicated here —
//! `rg-stopmon`/`rg-db::tenant` already persist it in Postgres
//! (`fetch_or_init_circuit_breaker`, `record_circuit_breaker_failure`,
//! `reopen_circuit_breaker`), so the Orchestrator reads that directly
//! rather than keeping a second, driftable copy in memory. Grounded on
//! `mqk-daemon::state::AppState`'s single cloneable process-state struct,
//! with its `Arc<RwLock<T>>` fields replaced by `dashmap::DashMap` for the
//! concurrent insert-if-absent access pattern a per-tenant/per-symbol map
//! needs (enrichment from `barter-rs`'s dependency list, per SPEC_FULL.md
//! §5 — not a teacher pattern).

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use rg_config::tenant::TenantConfig;
use rg_pattern::StrategyPatternConfig;

/// Sliding-window execution timestamps for one tenant, checked against
/// `TenantConfig::max_executions_per_minute`/`max_executions_per_hour`
/// before a LIVE execute is allowed to proceed.
#[derive(Default)]
struct ExecutionWindow {
    timestamps: VecDeque<DateTime<Utc>>,
}

impl ExecutionWindow {
    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(&front) = self.timestamps.front() {
            if (now - front).num_seconds() > 3600 {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn count_within(&self, now: DateTime<Utc>, seconds: i64) -> usize {
        self.timestamps.iter().filter(|ts| (now - **ts).num_seconds() <= seconds).count()
    }
}

#[derive(Default)]
pub struct Registry {
    executions: DashMap<Uuid, ExecutionWindow>,
    pattern_configs: DashMap<Uuid, Vec<StrategyPatternConfig>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the attempt if `tenant_id` is still under
    /// both its per-minute and per-hour execution ceilings; `false` and
    /// records nothing if either ceiling is already met.
    pub fn try_record_execution(&self, tenant_id: Uuid, cfg: &TenantConfig, now: DateTime<Utc>) -> bool {
        let mut window = self.executions.entry(tenant_id).or_default();
        window.prune(now);

        let per_minute = window.count_within(now, 60);
        let per_hour = window.count_within(now, 3600);
        if per_minute >= cfg.max_executions_per_minute as usize || per_hour >= cfg.max_executions_per_hour as usize {
            return false;
        }

        window.timestamps.push_back(now);
        true
    }

    pub fn set_pattern_configs(&self, tenant_id: Uuid, configs: Vec<StrategyPatternConfig>) {
        self.pattern_configs.insert(tenant_id, configs);
    }

    pub fn pattern_configs_for(&self, tenant_id: Uuid) -> Vec<StrategyPatternConfig> {
        self.pattern_configs.get(&tenant_id).map(|c| c.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cfg(tenant_id: Uuid) -> TenantConfig {
        TenantConfig {
            max_executions_per_minute: 2,
            max_executions_per_hour: 100,
            ..TenantConfig::defaults(tenant_id)
        }
    }

    #[test]
    fn blocks_once_per_minute_ceiling_is_reached() {
        let registry = Registry::new();
        let tenant_id = Uuid::new_v4();
        let c = cfg(tenant_id);
        let now = Utc::now();

        assert!(registry.try_record_execution(tenant_id, &c, now));
        assert!(registry.try_record_execution(tenant_id, &c, now));
        assert!(!registry.try_record_execution(tenant_id, &c, now));
    }

    #[test]
    fn old_timestamps_age_out_of_the_window() {
        let registry = Registry::new();
        let tenant_id = Uuid::new_v4();
        let c = cfg(tenant_id);
        let earlier = Utc::now() - Duration::minutes(90);

        assert!(registry.try_record_execution(tenant_id, &c, earlier));
        assert!(registry.try_record_execution(tenant_id, &c, earlier));

        let now = Utc::now();
        assert!(registry.try_record_execution(tenant_id, &c, now));
    }

    #[test]
    fn pattern_configs_are_tenant_scoped() {
        let registry = Registry::new();
        let tenant_a = Uuid::new_v4();
        let tenant_b = Uuid::new_v4();
        registry.set_pattern_configs(
            tenant_a,
            vec![StrategyPatternConfig {
                strategy: "hammer-reversal".to_string(),
                pattern_code: "HAMMER".to_string(),
                timeframe: "1h".to_string(),
                auto_entry_enabled: true,
                entry_mode: rg_pattern::EntryMode::DryRun,
                min_confidence: None,
            }],
        );
        assert_eq!(registry.pattern_configs_for(tenant_a).len(), 1);
        assert_eq!(registry.pattern_configs_for(tenant_b).len(), 0);
    }
}
