use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use rbx_reconcile::{next_due_date, CycleUnit};

pub fn run(from: &str, unit: &str, value: u32, anchor: Option<u32>, count: u32) -> Result<()> {
    let from: DateTime<Utc> = from
        .parse()
        .with_context(|| format!("invalid --from '{from}': expected RFC 3339"))?;
    let Some(unit) = CycleUnit::parse(unit) else {
        bail!("invalid --unit '{unit}'. expected one of: minutes | hours | days | weeks | months");
    };
    if value == 0 {
        bail!("invalid --value 0: a cycle must be at least one unit");
    }
    let anchor = match unit {
        CycleUnit::Months => anchor,
        _ => None,
    };

    let mut due = from;
    for _ in 0..count {
        due = next_due_date(due, unit, value, anchor).context("due date out of range")?;
        println!("next_due={}", due.to_rfc3339_opts(SecondsFormat::Secs, true));
    }
    Ok(())
}
