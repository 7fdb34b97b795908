//! Exchange credential resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** (e.g. `"EXCHANGE_API_KEY"`), never
//!   values.
//! - Callers invoke [`resolve_secrets_for_mode`] once at startup and pass the
//!   resulting [`ResolvedSecrets`] into constructors; never scatter
//!   `std::env::var` calls across the codebase.
//! - `Debug` on every secret-bearing struct redacts the value.
//! - Error messages reference the env var NAME, never the value.
//!
//! # Mode-aware enforcement
//! - `LIVE`:     exchange api_key + api_secret are **required**.
//! - `DRY_RUN`:  no keys required — a dry-run never calls the Execution Port.

use anyhow::{bail, Result};
use serde_json::Value;

/// All runtime-resolved secrets for one engine instantiation.
///
/// Built once at startup via [`resolve_secrets_for_mode`]. **Values are
/// redacted in `Debug` output.**
#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Exchange API key. `None` if the named env var was absent or empty.
    pub exchange_api_key: Option<String>,
    /// Exchange API secret. `None` if the named env var was absent or empty.
    pub exchange_api_secret: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "exchange_api_key",
                &self.exchange_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field(
                "exchange_api_secret",
                &self.exchange_api_secret.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Execution mode that governs secret enforcement. Distinct from the
/// per-intent `dry-run`/`live` execution mode in the Intent Pipeline: this is
/// the mode the whole engine instance was started in, and it bounds which
/// per-intent modes are reachable (a `DryRun` instance never holds
/// credentials, so `live` execution is unreachable regardless of per-intent
/// requests).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineMode {
    DryRun,
    Live,
}

impl EngineMode {
    fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIVE" => Ok(EngineMode::Live),
            "DRY_RUN" | "DRY-RUN" | "DRYRUN" => Ok(EngineMode::DryRun),
            other => bail!(
                "SECRETS_UNKNOWN_MODE: unrecognised mode '{}'; expected one of: LIVE | DRY_RUN",
                other
            ),
        }
    }
}

struct SecretEnvNames {
    exchange_api_key_var: String,
    exchange_api_secret_var: String,
}

/// Read a non-empty string value at `pointer` from a JSON config. Returns
/// `None` if the pointer is absent, the value is not a string, or it is blank
/// after trimming.
fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolve a named environment variable. Returns `None` if the variable is
/// unset or blank. Never surfaces the value on an error path — callers report
/// the NAME only.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        exchange_api_key_var: read_str_at(config_json, "/exchange/keys_env/api_key")
            .unwrap_or_else(|| "RG_EXCHANGE_API_KEY".to_string()),
        exchange_api_secret_var: read_str_at(config_json, "/exchange/keys_env/api_secret")
            .unwrap_or_else(|| "RG_EXCHANGE_API_SECRET".to_string()),
    }
}

/// Resolve exchange secrets from the environment for the given `mode` string.
///
/// `mode` is case-insensitive: `"LIVE"` or `"DRY_RUN"`.
///
/// | Mode    | Required                          |
/// |---------|------------------------------------|
/// | LIVE    | exchange api_key, exchange api_secret |
/// | DRY_RUN | nothing (both optional)            |
///
/// # Errors
/// Returns `Err` naming the env var of the first missing required variable.
/// The value itself is never mentioned.
pub fn resolve_secrets_for_mode(config_json: &Value, mode: &str) -> Result<ResolvedSecrets> {
    let mode = EngineMode::parse(mode)?;
    let names = parse_env_names(config_json);

    let exchange_api_key = resolve_env(&names.exchange_api_key_var);
    let exchange_api_secret = resolve_env(&names.exchange_api_secret_var);

    if mode == EngineMode::Live {
        if exchange_api_key.is_none() {
            bail!(
                "SECRETS_MISSING mode=LIVE: required env var '{}' (exchange api_key) is not set or empty",
                names.exchange_api_key_var,
            );
        }
        if exchange_api_secret.is_none() {
            bail!(
                "SECRETS_MISSING mode=LIVE: required env var '{}' (exchange api_secret) is not set or empty",
                names.exchange_api_secret_var,
            );
        }
    }

    Ok(ResolvedSecrets {
        exchange_api_key,
        exchange_api_secret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Value {
        serde_json::json!({
            "exchange": {
                "keys_env": {
                    "api_key": "TEST_EXCHANGE_KEY",
                    "api_secret": "TEST_EXCHANGE_SECRET",
                }
            }
        })
    }

    #[test]
    fn dry_run_requires_nothing() {
        let resolved = resolve_secrets_for_mode(&cfg(), "dry_run").unwrap();
        assert!(resolved.exchange_api_key.is_none());
        assert!(resolved.exchange_api_secret.is_none());
    }

    #[test]
    fn live_fails_closed_without_env_vars() {
        std::env::remove_var("TEST_EXCHANGE_KEY");
        std::env::remove_var("TEST_EXCHANGE_SECRET");
        let err = resolve_secrets_for_mode(&cfg(), "LIVE").unwrap_err();
        assert!(err.to_string().contains("TEST_EXCHANGE_KEY"));
    }

    #[test]
    fn debug_redacts_values() {
        let resolved = ResolvedSecrets {
            exchange_api_key: Some("super-secret".to_string()),
            exchange_api_secret: Some("also-secret".to_string()),
        };
        let dbg = format!("{:?}", resolved);
        assert!(!dbg.contains("super-secret"));
        assert!(!dbg.contains("also-secret"));
    }

    #[test]
    fn unknown_mode_rejected() {
        assert!(resolve_secrets_for_mode(&cfg(), "PAPER").is_err());
    }
}
