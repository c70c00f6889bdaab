use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use crate::{core::unix_now_secs, cycle::CycleReport};

/// Mutable bookkeeping of the poll scheduler.
#[derive(Default)]
pub(crate) struct RuntimeState {
    pub(crate) stop_tx: Option<watch::Sender<bool>>,
    pub(crate) epoch: u64,
    pub(crate) should_run: bool,
    pub(crate) started_at: Option<u64>,
    pub(crate) cycles_started: u64,
    pub(crate) cycles_finished: u64,
    pub(crate) last_cycle_started_at: Option<u64>,
    pub(crate) last_cycle_finished_at: Option<u64>,
    pub(crate) last_outcome: Option<&'static str>,
    pub(crate) last_report: Option<CycleReport>,
    pub(crate) rate_limited_cycles: u64,
    pub(crate) last_stop_reason: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub(crate) struct RuntimeDiagnostics {
    pub(crate) should_run: bool,
    pub(crate) epoch: u64,
    pub(crate) running_for_seconds: Option<u64>,
    pub(crate) cycles_started: u64,
    pub(crate) cycles_finished: u64,
    pub(crate) cycles_in_flight: u64,
    pub(crate) last_cycle_started_at: Option<u64>,
    pub(crate) last_cycle_finished_at: Option<u64>,
    pub(crate) last_outcome: Option<&'static str>,
    pub(crate) last_report: Option<CycleReport>,
    pub(crate) rate_limited_cycles: u64,
    pub(crate) last_stop_reason: Option<String>,
}

pub(crate) fn snapshot_runtime(runtime: &Mutex<RuntimeState>) -> Result<RuntimeDiagnostics, String> {
    let runtime = runtime
        .lock()
        .map_err(|_| "Runtime lock poisoned".to_string())?;

    let now = unix_now_secs();
    let running_for_seconds = runtime
        .started_at
        .filter(|_| runtime.should_run)
        .map(|started| now.saturating_sub(started));

    Ok(RuntimeDiagnostics {
        should_run: runtime.should_run,
        epoch: runtime.epoch,
        running_for_seconds,
        cycles_started: runtime.cycles_started,
        cycles_finished: runtime.cycles_finished,
        cycles_in_flight: runtime
            .cycles_started
            .saturating_sub(runtime.cycles_finished),
        last_cycle_started_at: runtime.last_cycle_started_at,
        last_cycle_finished_at: runtime.last_cycle_finished_at,
        last_outcome: runtime.last_outcome,
        last_report: runtime.last_report.clone(),
        rate_limited_cycles: runtime.rate_limited_cycles,
        last_stop_reason: runtime.last_stop_reason.clone(),
    })
}

pub(crate) fn log_runtime_diagnostics(runtime: &Mutex<RuntimeState>) {
    match snapshot_runtime(runtime) {
        Ok(diag) => match serde_json::to_string(&diag) {
            Ok(json) => debug!(target: "discord_notifier::runtime", "{json}"),
            Err(error) => debug!(%error, "failed to serialize runtime diagnostics"),
        },
        Err(error) => debug!(%error, "failed to snapshot runtime"),
    }
}
