use std::{sync::Arc, time::Duration};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    api::ApiConnector,
    checkpoint::CheckpointStore,
    consts::{
        ENUMERATION_CALL_SPACING_MS, MESSAGE_FETCH_SPACING_MS, NOTIFICATION_LOG_LIMIT,
        POLL_INTERVAL_SECS, REQUEST_TIMEOUT_SECS,
    },
    detector::detect_changes,
    dispatcher::{dispatch_changes, DispatchContext, DispatchReport},
    enumerator::enumerate_channels,
    notification_log::NotificationLog,
    notifications::AlertSink,
    settings::Settings,
    store::KvStore,
};

/// Timing and sizing knobs for the poller.
#[derive(Debug, Clone)]
pub(crate) struct PollerConfig {
    pub(crate) poll_interval: Duration,
    pub(crate) enumeration_spacing: Duration,
    pub(crate) fetch_spacing: Duration,
    pub(crate) request_timeout: Duration,
    pub(crate) log_limit: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            enumeration_spacing: Duration::from_millis(ENUMERATION_CALL_SPACING_MS),
            fetch_spacing: Duration::from_millis(MESSAGE_FETCH_SPACING_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            log_limit: NOTIFICATION_LOG_LIMIT,
        }
    }
}

/// Everything a cycle needs; shared by the scheduler and one-shot runs.
pub(crate) struct PollContext {
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) connector: Arc<dyn ApiConnector>,
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) config: PollerConfig,
}

impl PollContext {
    pub(crate) fn settings(&self) -> Settings {
        Settings::new(self.store.clone())
    }

    pub(crate) fn notification_log(&self) -> NotificationLog {
        NotificationLog::new(self.store.clone(), self.config.log_limit)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub(crate) struct CycleReport {
    pub(crate) channels: usize,
    pub(crate) failed_enumeration_calls: usize,
    pub(crate) changed: usize,
    pub(crate) unchanged: usize,
    pub(crate) initialized: usize,
    pub(crate) baselined: usize,
    pub(crate) checkpoint_write_failures: usize,
    pub(crate) dispatch: DispatchReport,
}

#[derive(Debug, Clone)]
pub(crate) enum CycleOutcome {
    Completed(CycleReport),
    /// Checkpoints were synced and nothing was dispatched.
    Baseline(CycleReport),
    NoCredential,
    /// Notifications were off when the cycle started; the caller should stop polling.
    Disabled,
    Failed(String),
}

impl CycleOutcome {
    pub(crate) fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) | CycleOutcome::Baseline(report) => Some(report),
            _ => None,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            CycleOutcome::Completed(_) => "completed",
            CycleOutcome::Baseline(_) => "baseline",
            CycleOutcome::NoCredential => "no-credential",
            CycleOutcome::Disabled => "disabled",
            CycleOutcome::Failed(_) => "failed",
        }
    }
}

/// Runs one enumerate, detect and dispatch pass.
///
/// `force_baseline` treats the cycle as a baseline cycle even when the
/// persisted flag is not set. The persisted flag is cleared once a baseline
/// cycle has synced its checkpoints, whatever errors happened along the way.
pub(crate) async fn run_cycle(ctx: &PollContext, force_baseline: bool) -> CycleOutcome {
    let settings = ctx.settings();
    let snapshot = settings.snapshot();

    if !snapshot.policy.enabled() {
        debug!("notifications disabled, skipping cycle");
        return CycleOutcome::Disabled;
    }
    let Some(token) = snapshot.token.as_deref() else {
        debug!("no credential stored, skipping cycle");
        return CycleOutcome::NoCredential;
    };

    let api = match ctx.connector.connect(&snapshot.api_base_url, token) {
        Ok(api) => api,
        Err(error) => {
            warn!(%error, "failed to build API client");
            return CycleOutcome::Failed(error.to_string());
        }
    };

    let baseline = force_baseline || snapshot.baseline_pending;
    let mut local_user_id = snapshot.user_id.clone();
    if local_user_id.is_none() && !baseline {
        match api.current_user().await {
            Ok(user) if !user.id.is_empty() => {
                if let Err(error) = settings.save_user_id(&user.id) {
                    warn!(%error, "failed to store local user id");
                }
                debug!(user_id = %user.id, "resolved local user id");
                local_user_id = Some(user.id);
            }
            Ok(_) => warn!("current user has no id"),
            Err(error) => warn!(%error, "failed to resolve local user id"),
        }
    }

    let enumeration = enumerate_channels(api.as_ref(), ctx.config.enumeration_spacing).await;
    let checkpoints = CheckpointStore::new(ctx.store.clone());
    let detection = detect_changes(&enumeration.channels, &checkpoints, baseline);

    let mut report = CycleReport {
        channels: enumeration.channels.len(),
        failed_enumeration_calls: enumeration.failed_calls,
        changed: detection.changed.len(),
        unchanged: detection.unchanged,
        initialized: detection.initialized,
        baselined: detection.baselined,
        checkpoint_write_failures: detection.write_failures,
        dispatch: DispatchReport::default(),
    };

    if baseline {
        if snapshot.baseline_pending {
            if let Err(error) = settings.clear_baseline() {
                warn!(%error, "failed to clear baseline flag");
            }
        }
        info!(
            channels = report.channels,
            synced = report.baselined,
            "baseline cycle finished"
        );
        return CycleOutcome::Baseline(report);
    }

    let log = ctx.notification_log();
    let dispatch_ctx = DispatchContext {
        api: api.as_ref(),
        checkpoints: &checkpoints,
        log: &log,
        alerts: ctx.alerts.as_ref(),
        policy: &snapshot.policy,
        local_user_id: local_user_id.as_deref(),
        fetch_spacing: ctx.config.fetch_spacing,
    };
    report.dispatch = dispatch_changes(&dispatch_ctx, &detection.changed).await;

    debug!(
        channels = report.channels,
        changed = report.changed,
        initialized = report.initialized,
        alerted = report.dispatch.alerted,
        rate_limited = report.dispatch.rate_limited,
        "cycle finished"
    );
    CycleOutcome::Completed(report)
}
