use std::sync::Arc;
use std::time::Instant;

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub expired_offers: usize,
    pub reconciled: usize,
}

/// Periodic offer expiry and retry of failed lifecycle side effects.
pub async fn run_maintenance(state: Arc<AppState>, every: Duration) {
    info!(interval_secs = every.as_secs(), "maintenance loop started");

    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let start = Instant::now();
        let report = run_once(&state);
        debug!(
            expired_offers = report.expired_offers,
            reconciled = report.reconciled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "maintenance pass finished"
        );
    }
}

pub fn run_once(state: &AppState) -> MaintenanceReport {
    MaintenanceReport {
        expired_offers: state.negotiation.expire_stale(),
        reconciled: state.lifecycle.reconcile(),
    }
}
