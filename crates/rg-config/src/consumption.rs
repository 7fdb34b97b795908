//! Declares which config JSON pointers each engine mode actually reads, so
//! startup can warn about dead keys left over in layered YAML instead of
//! silently ignoring them.

use crate::secrets::EngineMode;

pub fn consumed_pointers(mode: EngineMode) -> &'static [&'static str] {
    match mode {
        EngineMode::DryRun => DRY_RUN,
        EngineMode::Live => LIVE,
    }
}

static DRY_RUN: &[&str] = &[
    "/runtime/mode",
    "/tenant",
    "/gate",
    "/sizing",
    "/stopmon",
    "/pattern",
];

static LIVE: &[&str] = &[
    "/runtime/mode",
    "/exchange",
    "/tenant",
    "/gate",
    "/sizing",
    "/stopmon",
    "/pattern",
    "/reconcile",
];
