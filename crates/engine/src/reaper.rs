use tokio::task::JoinHandle;
use tracing::{debug, info};

use gridbase_core::TempRowId;

use crate::config::ReapConfig;
use crate::ledger::PendingLedger;
use crate::registry::SpeculativeRegistry;
use crate::session::TableSession;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Confirmed temp rows handed back to their server rows.
    pub retired: Vec<TempRowId>,
    pub expired_pending: usize,
}

impl ReapReport {
    pub fn is_empty(&self) -> bool {
        self.retired.is_empty() && self.expired_pending == 0
    }
}

/// One sweep over the local stores.
///
/// Mapped temp rows are retired only once the table has seen no local edit
/// for `inactivity_timeout_ms` and every value typed into them is stored on
/// the server. Unmapped temp rows are never touched. Ledger entries older than
/// `pending_ttl_ms` are dropped regardless of activity.
pub fn reap(
    mut registry: SpeculativeRegistry,
    mut ledger: PendingLedger,
    last_local_change_ms: u64,
    now_ms: u64,
    config: &ReapConfig,
) -> (SpeculativeRegistry, PendingLedger, ReapReport) {
    let idle_for = now_ms.saturating_sub(last_local_change_ms);
    let mut retired = Vec::new();
    if idle_for >= config.inactivity_timeout_ms {
        for temp_id in registry.settled_temp_rows() {
            if registry.retire(&temp_id) {
                retired.push(temp_id);
            }
        }
        retired.sort();
    }

    let cutoff = now_ms.saturating_sub(config.pending_ttl_ms);
    let expired_pending = if cutoff > 0 {
        ledger.expire_older_than(cutoff)
    } else {
        0
    };

    (
        registry,
        ledger,
        ReapReport {
            retired,
            expired_pending,
        },
    )
}

/// Background task running [`reap`] against a session on its configured
/// interval. Aborted when dropped.
#[derive(Debug)]
pub struct ReaperHandle {
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Abort the task now rather than at drop.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ReaperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn spawn_reaper(session: TableSession) -> ReaperHandle {
    let period = session.config().reap_interval;
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let report = session.reap_now();
            if !report.is_empty() {
                info!(
                    target: "gridbase.engine",
                    retired = report.retired.len(),
                    expired_pending = report.expired_pending,
                    "reaped stale local state"
                );
            }
        }
    });
    debug!(target: "gridbase.engine", ?period, "reaper started");
    ReaperHandle { task }
}
