//! Background maintenance loops
//!
//! Independent timers, off the request path:
//! - reputation sweep + quarantine expiry (default every 5 min)
//! - retrain + snapshot persistence (default hourly)
//!
//! Both jobs touch locks or disk, so each tick runs on the blocking pool.

use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::task::JoinHandle;

use crate::constants;
use crate::logic::engine::ShieldEngine;
use crate::logic::feedback::RetrainOutcome;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaintenanceIntervals {
    pub sweep: Duration,
    pub retrain: Duration,
}

impl Default for MaintenanceIntervals {
    fn default() -> Self {
        Self {
            sweep: Duration::from_secs(constants::DEFAULT_SWEEP_INTERVAL),
            retrain: Duration::from_secs(constants::DEFAULT_RETRAIN_INTERVAL),
        }
    }
}

impl MaintenanceIntervals {
    pub fn from_env() -> Self {
        Self {
            sweep: Duration::from_secs(constants::get_sweep_interval()),
            retrain: Duration::from_secs(constants::get_retrain_interval()),
        }
    }
}

/// Start both loops. Dropping the handles does not stop them; abort to stop.
pub fn spawn(engine: Arc<ShieldEngine>, intervals: MaintenanceIntervals) -> Vec<JoinHandle<()>> {
    log::info!(
        "Maintenance started (sweep every {}s, retrain every {}s)",
        intervals.sweep.as_secs(),
        intervals.retrain.as_secs()
    );
    vec![
        every(Arc::clone(&engine), intervals.sweep, run_sweep),
        every(engine, intervals.retrain, run_retrain),
    ]
}

fn every(engine: Arc<ShieldEngine>, period: Duration, job: fn(&ShieldEngine)) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let engine = Arc::clone(&engine);
            if let Err(e) = tokio::task::spawn_blocking(move || job(&engine)).await {
                log::error!("Maintenance job panicked: {}", e);
            }
        }
    })
}

/// Evict idle IP records and expire unreviewed quarantine records
pub fn run_sweep(engine: &ShieldEngine) {
    let now = Utc::now();
    let evicted = engine.sweep_reputation(now);
    match engine.expire_quarantine(now) {
        Ok(expired) => log::debug!("Sweep: {} IP records evicted, {} quarantine records expired", evicted, expired),
        Err(e) => log::error!("Quarantine expiry failed: {}", e),
    }
}

/// Retrain and persist whatever changed
pub fn run_retrain(engine: &ShieldEngine) {
    match engine.retrain(Utc::now()) {
        RetrainOutcome::Completed(report) if report.changed() => {
            if let Err(e) = engine.persist_snapshots() {
                log::error!("Failed to persist snapshots: {}", e);
            }
        }
        RetrainOutcome::Completed(_) => {}
        RetrainOutcome::AlreadyRunning => log::debug!("Scheduled retrain skipped, one is already running"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::events::LogNotifier;
    use crate::logic::policy::{Policy, PolicyStore};
    use crate::logic::quarantine::MemoryQuarantineStore;

    fn engine() -> Arc<ShieldEngine> {
        let store = Arc::new(PolicyStore::new(Policy::default()).unwrap());
        Arc::new(ShieldEngine::new(store, Arc::new(MemoryQuarantineStore::new(10)), Arc::new(LogNotifier)))
    }

    #[tokio::test]
    async fn test_loops_tick() {
        let engine = engine();
        let handles = spawn(
            Arc::clone(&engine),
            MaintenanceIntervals { sweep: Duration::from_millis(10), retrain: Duration::from_millis(10) },
        );
        tokio::time::sleep(Duration::from_millis(200)).await;
        for handle in handles {
            handle.abort();
        }
        assert!(engine.feedback().stats().retrains >= 1);
    }

    #[test]
    fn test_sweep_evicts_idle_ip() {
        let engine = engine();
        let policy = engine.current_policy().policy.reputation;
        engine.reputation().get("192.0.2.1", Utc::now() - chrono::Duration::days(3), &policy);
        run_sweep(&engine);
        assert!(engine.reputation().is_empty());
    }

    #[test]
    fn test_retrain_without_data_dir_does_not_persist() {
        let engine = engine();
        run_retrain(&engine);
        assert!(engine.classifier().is_none());
        assert_eq!(engine.feedback().stats().retrains, 1);
    }
}
