//! Literal-secret guard.
//!
//! Config YAML names the env var that holds a credential (`url_env:
//! RBX_DATABASE_URL`); it never holds the credential itself. Any leaf string
//! that looks like a token or a credential-bearing URL aborts the load with
//! `CONFIG_SECRET_DETECTED`. The offending value is never echoed.

use anyhow::{bail, Result};
use serde_json::Value;

/// Token prefixes issued by common providers.
const SECRET_PREFIXES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "gho_",
    "glpat-",
    "xoxb-",
    "xoxp-",
];

pub fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut found: Option<String> = None;
    walk_strings(v, "", &mut |ptr, s| {
        if found.is_none() && looks_like_secret(s) {
            found = Some(ptr.to_string());
        }
    });
    if let Some(ptr) = found {
        bail!("CONFIG_SECRET_DETECTED leaf={} value=REDACTED", ptr);
    }
    Ok(())
}

/// `true` for token-like literals and URLs carrying `user:password@`.
pub fn looks_like_secret(s: &str) -> bool {
    let t = s.trim();
    if url_has_password(t) {
        return true;
    }
    if t.len() < 8 {
        return false;
    }
    SECRET_PREFIXES.iter().any(|p| t.starts_with(p))
}

fn url_has_password(s: &str) -> bool {
    let Some((_, rest)) = s.split_once("://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or("");
    match authority.rsplit_once('@') {
        Some((userinfo, _)) => userinfo
            .split_once(':')
            .map(|(_, pass)| !pass.is_empty())
            .unwrap_or(false),
        None => false,
    }
}

fn walk_strings(v: &Value, prefix: &str, f: &mut dyn FnMut(&str, &str)) {
    match v {
        Value::Object(map) => {
            for (k, vv) in map {
                let next = format!("{}/{}", prefix, k.replace('~', "~0").replace('/', "~1"));
                walk_strings(vv, &next, f);
            }
        }
        Value::Array(arr) => {
            for (i, vv) in arr.iter().enumerate() {
                walk_strings(vv, &format!("{}/{}", prefix, i), f);
            }
        }
        Value::String(s) => f(if prefix.is_empty() { "/" } else { prefix }, s),
        _ => {}
    }
}
