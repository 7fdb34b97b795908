//! Entry Gate (C6, spec §4.3): the ordered, non-short-circuiting battery of
//! risk checks that decides whether a new position may open at all. Every
//! check always runs so a denial carries every contributing reason, and the
//! decision is persisted append-only regardless of outcome — grounded in
//! `mqk-risk::engine::evaluate`'s "run everything, aggregate" shape.

pub mod checks;
pub mod engine;
pub mod types;

pub use engine::{evaluate, evaluate_and_persist};
pub use types::{EntryGateDecision, GateCheckResult, GateContext};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn base_ctx() -> GateContext {
        GateContext {
            tenant_id: Uuid::new_v4(),
            symbol: "BTCUSDT".to_string(),
            now: Utc::now(),
            monthly_pnl: dec!(0),
            capital: dec!(10000),
            active_position_count: 0,
            cooldown_enabled: false,
            stop_out_cooldown_secs: 900,
            latest_stop_out: None,
            funding_enabled: false,
            funding_rate: None,
            funding_rate_threshold: dec!(0.0001),
            data_freshness_enabled: false,
            data_age_secs: None,
            max_data_age_secs: 300,
        }
    }

    /// spec.md §8 scenario 3: monthly_pnl=-$200, capital=$10,000, active=2.
    /// available = 4 + (-200/10000)*100 = 2.0%, max_concurrent = 2, denies.
    #[test]
    fn scenario_budget_at_minus_two_pct_monthly_denies_at_two_active() {
        let mut ctx = base_ctx();
        ctx.monthly_pnl = dec!(-200);
        ctx.active_position_count = 2;

        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
        let dpl = decision.checks.iter().find(|c| c.gate_name == "DynamicPositionLimit").unwrap();
        assert!(!dpl.passed);
        assert!(dpl.message.contains("2/2"));
        assert!(dpl.message.contains("2.0%"));
    }

    /// spec.md §8 scenario 4: cooldown=900s. At T+800s denies with
    /// remaining=100s; at T+900s passes.
    #[test]
    fn scenario_cooldown_denies_then_passes() {
        let mut ctx = base_ctx();
        ctx.cooldown_enabled = true;
        ctx.stop_out_cooldown_secs = 900;
        let t0 = Utc::now() - Duration::seconds(800);
        ctx.latest_stop_out = Some(t0);
        ctx.now = t0 + Duration::seconds(800);

        let decision = evaluate(&ctx);
        let cooldown = decision.checks.iter().find(|c| c.gate_name == "StopOutCooldown").unwrap();
        assert!(!cooldown.passed);
        assert!(cooldown.message.contains("remaining=100s"));

        ctx.now = t0 + Duration::seconds(900);
        let decision = evaluate(&ctx);
        let cooldown = decision.checks.iter().find(|c| c.gate_name == "StopOutCooldown").unwrap();
        assert!(cooldown.passed);
    }

    /// I8: a single failing check makes allowed=false regardless of others.
    #[test]
    fn denial_is_total_across_all_checks() {
        let mut ctx = base_ctx();
        ctx.funding_enabled = true;
        ctx.funding_rate = None; // missing -> fail-safe
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
        // every other check still ran and reported.
        assert_eq!(decision.checks.len(), 4);
    }

    #[test]
    fn missing_data_freshness_fails_safe() {
        let mut ctx = base_ctx();
        ctx.data_freshness_enabled = true;
        ctx.data_age_secs = None;
        let decision = evaluate(&ctx);
        assert!(!decision.allowed);
    }

    #[test]
    fn fresh_data_within_bounds_passes() {
        let mut ctx = base_ctx();
        ctx.data_freshness_enabled = true;
        ctx.data_age_secs = Some(10);
        ctx.max_data_age_secs = 300;
        let decision = evaluate(&ctx);
        assert!(decision.allowed);
    }
}
