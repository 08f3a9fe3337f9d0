//! Small shared helpers for opaque, prefixed entity ids (`ent_{hash}`,
//! `run_{uuid}`) so ids are self-describing in logs and exports without a
//! lookup.

use uuid::Uuid;

/// Generates an opaque id of the form `{prefix}_{24 hex chars}`.
pub fn new_prefixed_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..24])
}
