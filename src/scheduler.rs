use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    core::unix_now_secs,
    cycle::{run_cycle, CycleOutcome, PollContext},
    diagnostics::{log_runtime_diagnostics, snapshot_runtime, RuntimeDiagnostics, RuntimeState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Error)]
pub(crate) enum StartRefused {
    #[error("notifications are disabled")]
    NotificationsDisabled,
    #[error("no credential stored; run `login` first")]
    MissingCredential,
    #[error("runtime lock poisoned")]
    Poisoned,
}

/// Drives poll cycles on a fixed period.
///
/// Each tick spawns its cycle as a separate task, so stopping only prevents
/// future cycles. A cycle that finds notifications disabled stops the
/// scheduler that spawned it, unless it has been restarted since.
#[derive(Clone)]
pub(crate) struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: Arc<PollContext>,
    runtime: Mutex<RuntimeState>,
    state_tx: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub(crate) fn new(ctx: Arc<PollContext>) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Stopped);
        Self {
            inner: Arc::new(Inner {
                ctx,
                runtime: Mutex::new(RuntimeState::default()),
                state_tx,
            }),
        }
    }

    pub(crate) fn state(&self) -> SchedulerState {
        *self.inner.state_tx.borrow()
    }

    pub(crate) fn diagnostics(&self) -> Result<RuntimeDiagnostics, String> {
        snapshot_runtime(&self.inner.runtime)
    }

    /// Starts polling if notifications are enabled and a credential exists.
    /// Starting an already running scheduler is a no-op.
    pub(crate) fn start(&self) -> Result<(), StartRefused> {
        let settings = self.inner.ctx.settings();
        if !settings.notifications_enabled() {
            return Err(StartRefused::NotificationsDisabled);
        }
        if settings.token().is_none() {
            return Err(StartRefused::MissingCredential);
        }

        let mut runtime = self
            .inner
            .runtime
            .lock()
            .map_err(|_| StartRefused::Poisoned)?;
        if runtime.stop_tx.is_some() {
            return Ok(());
        }

        let (tx, rx) = watch::channel(false);
        runtime.stop_tx = Some(tx);
        runtime.epoch = runtime.epoch.wrapping_add(1);
        let task_epoch = runtime.epoch;
        runtime.should_run = true;
        runtime.started_at = Some(unix_now_secs());
        runtime.last_stop_reason = None;
        drop(runtime);

        self.inner.state_tx.send_replace(SchedulerState::Running);
        info!(
            epoch = task_epoch,
            period_secs = self.inner.ctx.config.poll_interval.as_secs(),
            "poll scheduler started"
        );

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run_timer(rx, task_epoch).await });
        Ok(())
    }

    /// Cancels future cycles. Returns false when nothing was running.
    pub(crate) fn stop(&self, reason: &str) -> bool {
        let Ok(mut runtime) = self.inner.runtime.lock() else {
            warn!("runtime lock poisoned, cannot stop scheduler");
            return false;
        };
        self.stop_locked(&mut runtime, reason)
    }

    pub(crate) async fn wait_until_stopped(&self) {
        let mut state_rx = self.inner.state_tx.subscribe();
        let _ = state_rx
            .wait_for(|state| *state == SchedulerState::Stopped)
            .await;
    }

    fn stop_locked(&self, runtime: &mut RuntimeState, reason: &str) -> bool {
        let Some(stop_tx) = runtime.stop_tx.take() else {
            return false;
        };
        let _ = stop_tx.send(true);
        runtime.should_run = false;
        runtime.last_stop_reason = Some(reason.to_string());
        self.inner.state_tx.send_replace(SchedulerState::Stopped);
        info!(epoch = runtime.epoch, reason, "poll scheduler stopped");
        true
    }

    fn stop_epoch(&self, task_epoch: u64, reason: &str) {
        let Ok(mut runtime) = self.inner.runtime.lock() else {
            return;
        };
        if runtime.epoch != task_epoch {
            debug!(task_epoch, current = runtime.epoch, "stale cycle, not stopping");
            return;
        }
        self.stop_locked(&mut runtime, reason);
    }

    async fn run_timer(self, mut stop_rx: watch::Receiver<bool>, task_epoch: u64) {
        let mut ticker = interval(self.inner.ctx.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                    continue;
                }
            }
            if *stop_rx.borrow() {
                break;
            }

            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.run_tracked_cycle(task_epoch).await });
        }
        debug!(epoch = task_epoch, "poll timer exited");
    }

    async fn run_tracked_cycle(&self, task_epoch: u64) {
        if let Ok(mut runtime) = self.inner.runtime.lock() {
            runtime.cycles_started += 1;
            runtime.last_cycle_started_at = Some(unix_now_secs());
        }

        let outcome = run_cycle(&self.inner.ctx, false).await;

        if let Ok(mut runtime) = self.inner.runtime.lock() {
            runtime.cycles_finished += 1;
            runtime.last_cycle_finished_at = Some(unix_now_secs());
            runtime.last_outcome = Some(outcome.label());
            if let Some(report) = outcome.report() {
                if report.dispatch.rate_limited {
                    runtime.rate_limited_cycles += 1;
                }
                runtime.last_report = Some(report.clone());
            }
        }

        match outcome {
            CycleOutcome::Disabled => self.stop_epoch(task_epoch, "notifications disabled"),
            CycleOutcome::Failed(error) => warn!(%error, "poll cycle failed"),
            _ => {}
        }
        log_runtime_diagnostics(&self.inner.runtime);
    }
}
