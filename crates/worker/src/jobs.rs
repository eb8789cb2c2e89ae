//! Scheduled job bodies, kept apart from the scheduler wiring

use relaybase_billing::{InvariantCheckSummary, InvariantChecker};
use relaybase_shared::{RecordStore, StoreError};
use time::{Duration, OffsetDateTime};
use tracing::{error, info, warn};

/// Stored OAuth2 codes older than this are removed
pub const CODE_EXCHANGE_TTL: Duration = Duration::minutes(15);

/// Run every invariant check and log each violation
pub async fn run_invariant_checks(checker: &InvariantChecker) -> Option<InvariantCheckSummary> {
    let summary = match checker.run_all_checks().await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Invariant check run failed");
            return None;
        }
    };

    for violation in &summary.violations {
        warn!(
            invariant = %violation.invariant,
            severity = %violation.severity,
            relay_ids = ?violation.relay_ids,
            "{}",
            violation.description
        );
    }

    info!(
        checks_run = summary.checks_run,
        checks_failed = summary.checks_failed,
        healthy = summary.healthy,
        "Invariant check cycle complete"
    );

    Some(summary)
}

/// Delete code-exchange records created before `now - CODE_EXCHANGE_TTL`
pub async fn expire_code_exchanges(
    store: &dyn RecordStore,
    now: OffsetDateTime,
) -> Result<u64, StoreError> {
    let removed = store
        .delete_code_exchanges_before(now - CODE_EXCHANGE_TTL)
        .await?;
    if removed > 0 {
        info!(removed = removed, "Expired stale code exchange records");
    }
    Ok(removed)
}
