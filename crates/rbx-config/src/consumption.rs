//! Config consumption map and unused-key guard.
//!
//! "Consumed" entries are JSON-pointer prefixes: `/reconcile` consumes
//! `/reconcile/limit` but not `/reconciled`. Any leaf not under a consumed
//! prefix is reported. Callers pick whether that is a warning or an error.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sections read by [`crate::Settings`]. Keep in step with settings.rs.
pub const CONSUMED_PREFIXES: &[&str] = &[
    "/daemon/addr",
    "/daemon/schedule_secs",
    "/database/max_connections",
    "/database/url_env",
    "/logging/filter",
    "/reconcile/concurrency",
    "/reconcile/deadline_secs",
    "/reconcile/limit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumed_prefixes: Vec<String>,
    /// Sorted, unique.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    let consumed_prefixes: Vec<String> = CONSUMED_PREFIXES.iter().map(|p| p.to_string()).collect();

    let mut leaves: Vec<String> = Vec::new();
    collect_leaf_pointers(config_json, "", &mut leaves);

    let mut unused: Vec<String> = leaves
        .into_iter()
        .filter(|lp| !consumed_prefixes.iter().any(|cp| is_prefix_pointer(cp, lp)))
        .collect();
    unused.sort();
    unused.dedup();

    let report = UnusedKeyReport {
        consumed_prefixes,
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s) detected. First few: {:?}",
            report.unused_leaf_pointers.len(),
            report.unused_leaf_pointers.iter().take(12).collect::<Vec<_>>()
        );
    }

    Ok(report)
}

/// "/a/b" consumes "/a/b" and "/a/b/c" but NOT "/a/bc".
fn is_prefix_pointer(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" || leaf == prefix {
        return true;
    }
    leaf.strip_prefix(prefix)
        .map(|rest| rest.starts_with('/'))
        .unwrap_or(false)
}

fn collect_leaf_pointers(v: &Value, prefix: &str, out: &mut Vec<String>) {
    match v {
        Value::Object(map) if !map.is_empty() => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                collect_leaf_pointers(vv, &next, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, vv) in arr.iter().enumerate() {
                collect_leaf_pointers(vv, &format!("{}/{}", prefix, i), out);
            }
        }
        Value::Object(_) if prefix.is_empty() => {}
        _ => out.push(if prefix.is_empty() { "/".to_string() } else { prefix.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_requires_segment_boundary() {
        assert!(is_prefix_pointer("/reconcile", "/reconcile/limit"));
        assert!(is_prefix_pointer("/reconcile/limit", "/reconcile/limit"));
        assert!(!is_prefix_pointer("/reconcile", "/reconciled"));
    }

    #[test]
    fn empty_config_has_no_leaves() {
        let mut out = Vec::new();
        collect_leaf_pointers(&serde_json::json!({}), "", &mut out);
        assert!(out.is_empty());
    }
}
