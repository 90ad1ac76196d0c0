use anyhow::Result;
use chrono::Utc;
use tracing::warn;

use rbx_reconcile::{reminder_for, GuestBillingState, GuestKey, Reminder};

use super::CliConfig;

/// One line per guest that should be reminded now.
pub async fn run(cfg: &CliConfig, owner: &str) -> Result<()> {
    let pool = super::connect(&cfg.settings).await?;
    let now = Utc::now();

    for guest_id in rbx_db::list_active_guest_ids(&pool, owner).await? {
        let key = GuestKey::new(owner, &guest_id);
        let Some(row) = rbx_db::fetch_guest(&pool, &key).await? else {
            continue;
        };
        let state = match GuestBillingState::try_from(row) {
            Ok(s) => s,
            Err(e) => {
                warn!(guest = %key, error = %e, "skipping malformed guest");
                continue;
            }
        };
        if state.total_due().is_none() {
            warn!(guest = %key, "skipping guest: amount owed overflows");
            continue;
        }
        match reminder_for(&state, now) {
            Reminder::None => {}
            Reminder::Overdue {
                elapsed,
                unit,
                total_due,
            } => println!(
                "guest={key} kind=overdue elapsed={elapsed} unit={} total_due={total_due}",
                unit.as_str()
            ),
            Reminder::Upcoming {
                remaining,
                unit,
                total_due,
            } => println!(
                "guest={key} kind=upcoming remaining={remaining} unit={} total_due={total_due}",
                unit.as_str()
            ),
        }
    }
    Ok(())
}
