use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    api::ChatApi,
    checkpoint::CheckpointStore,
    detector::ChangedChannel,
    model::NotificationRecord,
    mute::MutePolicy,
    notification_log::NotificationLog,
    notifications::{Alert, AlertSink},
    throttle::Throttle,
};

pub(crate) struct DispatchContext<'a> {
    pub(crate) api: &'a dyn ChatApi,
    pub(crate) checkpoints: &'a CheckpointStore,
    pub(crate) log: &'a NotificationLog,
    pub(crate) alerts: &'a dyn AlertSink,
    pub(crate) policy: &'a MutePolicy,
    pub(crate) local_user_id: Option<&'a str>,
    pub(crate) fetch_spacing: Duration,
}

#[derive(Debug, Default, Clone, Serialize)]
pub(crate) struct DispatchReport {
    pub(crate) fetched: usize,
    pub(crate) logged: usize,
    pub(crate) alerted: usize,
    pub(crate) own_messages: usize,
    pub(crate) failures: usize,
    pub(crate) rate_limited: bool,
}

/// Fetches the newest message of each changed channel and notifies about it.
///
/// Every fetch, the first included, waits `fetch_spacing`. The checkpoint
/// moves to the fetched message regardless of mute state. Messages by the
/// local account are neither logged nor alerted. A rate limit response ends
/// the loop; checkpoints already written stay.
pub(crate) async fn dispatch_changes(
    ctx: &DispatchContext<'_>,
    changed: &[ChangedChannel],
) -> DispatchReport {
    let mut report = DispatchReport::default();
    // Enumeration calls precede the first fetch, so it waits too.
    let mut throttle = Throttle::primed(ctx.fetch_spacing);

    for channel in changed {
        throttle.ready().await;
        debug!(
            channel_id = %channel.id,
            from = %channel.checkpoint,
            to = %channel.reported,
            "fetching newest message"
        );
        let messages = match ctx.api.latest_messages(&channel.id, 1).await {
            Ok(messages) => messages,
            Err(error) if error.is_rate_limited() => {
                warn!(channel_id = %channel.id, %error, "rate limited, ending this cycle's dispatch");
                report.rate_limited = true;
                break;
            }
            Err(error) => {
                warn!(channel_id = %channel.id, %error, "failed to fetch newest message");
                report.failures += 1;
                continue;
            }
        };

        let Some(message) = messages.into_iter().next() else {
            debug!(channel_id = %channel.id, "channel reported a change but returned no message");
            continue;
        };
        report.fetched += 1;

        if let Err(error) = ctx.checkpoints.set(&channel.id, &message.id) {
            warn!(channel_id = %channel.id, %error, "failed to update checkpoint");
            report.failures += 1;
        }

        if ctx.local_user_id == Some(message.author.id.as_str()) {
            debug!(channel_id = %channel.id, "own message, no notification");
            report.own_messages += 1;
            continue;
        }

        let record = NotificationRecord::capture(&message, &channel.id, &channel.name);
        match ctx.log.append(record) {
            Ok(_) => report.logged += 1,
            Err(error) => {
                warn!(channel_id = %channel.id, %error, "failed to append notification log");
                report.failures += 1;
            }
        }

        if !ctx.policy.allows_alert(&channel.id) {
            debug!(
                channel_id = %channel.id,
                muted = ctx.policy.is_muted(&channel.id),
                "alert suppressed"
            );
            continue;
        }

        let alert = Alert::for_message(&channel.id, &channel.name, &message);
        match ctx.alerts.post(&alert) {
            Ok(()) => {
                info!(channel = %channel.name, sender = %alert.title, "notification shown");
                report.alerted += 1;
            }
            Err(error) => {
                warn!(channel_id = %channel.id, %error, "failed to post alert");
                report.failures += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        consts::NOTIFICATION_LOG_LIMIT,
        store::{KvStore, MemoryStore},
        testing::{message, FakeChatApi, RecordingAlertSink, Reply},
    };

    struct Harness {
        api: FakeChatApi,
        checkpoints: CheckpointStore,
        log: NotificationLog,
        alerts: RecordingAlertSink,
    }

    impl Harness {
        fn new() -> Self {
            let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
            Self {
                api: FakeChatApi::new(),
                checkpoints: CheckpointStore::new(store.clone()),
                log: NotificationLog::new(store, NOTIFICATION_LOG_LIMIT),
                alerts: RecordingAlertSink::default(),
            }
        }

        async fn run(&self, policy: &MutePolicy, changed: &[ChangedChannel]) -> DispatchReport {
            let ctx = DispatchContext {
                api: &self.api,
                checkpoints: &self.checkpoints,
                log: &self.log,
                alerts: &self.alerts,
                policy,
                local_user_id: Some("alice"),
                fetch_spacing: Duration::ZERO,
            };
            dispatch_changes(&ctx, changed).await
        }
    }

    fn changed(id: &str, name: &str) -> ChangedChannel {
        ChangedChannel {
            id: id.to_string(),
            name: name.to_string(),
            checkpoint: "100".to_string(),
            reported: "105".to_string(),
        }
    }

    fn enabled() -> MutePolicy {
        MutePolicy::new(Vec::new(), true)
    }

    #[tokio::test]
    async fn new_message_is_logged_and_alerted() {
        let h = Harness::new();
        h.api
            .set_messages("c1", Reply::Ok(vec![message("105", "bob", "bob", "hi")]));

        let report = h.run(&enabled(), &[changed("c1", "general")]).await;

        assert_eq!(report.fetched, 1);
        assert_eq!(report.alerted, 1);
        assert_eq!(h.api.message_fetches(), vec!["messages:c1:1"]);
        assert_eq!(h.checkpoints.get("c1").as_deref(), Some("105"));
        let records = h.log.load();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sender, "bob");
        assert_eq!(records[0].content, "hi");
        assert_eq!(records[0].channel_name, "general");
        assert_eq!(h.alerts.alerts()[0].tag, "discord-notifier.channel.c1");
    }

    #[tokio::test]
    async fn muted_channel_is_logged_but_not_alerted() {
        let h = Harness::new();
        h.api
            .set_messages("c1", Reply::Ok(vec![message("105", "bob", "bob", "hi")]));
        let policy = MutePolicy::new(vec!["c1".to_string()], true);

        let report = h.run(&policy, &[changed("c1", "general")]).await;

        assert_eq!(report.logged, 1);
        assert_eq!(report.alerted, 0);
        assert_eq!(h.log.load().len(), 1);
        assert!(h.alerts.alerts().is_empty());
        assert_eq!(h.checkpoints.get("c1").as_deref(), Some("105"));
    }

    #[tokio::test]
    async fn own_message_only_moves_checkpoint() {
        let h = Harness::new();
        h.api
            .set_messages("c1", Reply::Ok(vec![message("105", "alice", "alice", "echo")]));

        let report = h.run(&enabled(), &[changed("c1", "general")]).await;

        assert_eq!(report.own_messages, 1);
        assert_eq!(h.checkpoints.get("c1").as_deref(), Some("105"));
        assert!(h.log.load().is_empty());
        assert_eq!(h.log.unread_count(), 0);
        assert!(h.alerts.alerts().is_empty());
    }

    #[tokio::test]
    async fn rate_limit_stops_remaining_fetches() {
        let h = Harness::new();
        h.api
            .set_messages("c1", Reply::Ok(vec![message("105", "bob", "bob", "one")]));
        h.api.set_messages("c2", Reply::RateLimited);
        h.api
            .set_messages("c3", Reply::Ok(vec![message("300", "bob", "bob", "three")]));

        let report = h
            .run(
                &enabled(),
                &[changed("c1", "a"), changed("c2", "b"), changed("c3", "c")],
            )
            .await;

        assert!(report.rate_limited);
        assert_eq!(h.api.message_fetches(), vec!["messages:c1:1", "messages:c2:1"]);
        assert_eq!(h.checkpoints.get("c1").as_deref(), Some("105"));
        assert_eq!(h.checkpoints.get("c3"), None);
    }

    #[tokio::test]
    async fn other_errors_skip_only_that_channel() {
        let h = Harness::new();
        h.api.set_messages("c1", Reply::ServerError);
        h.api
            .set_messages("c2", Reply::Ok(vec![message("205", "bob", "bob", "two")]));

        let report = h.run(&enabled(), &[changed("c1", "a"), changed("c2", "b")]).await;

        assert_eq!(report.failures, 1);
        assert_eq!(report.alerted, 1);
        assert_eq!(h.checkpoints.get("c1"), None);
        assert_eq!(h.checkpoints.get("c2").as_deref(), Some("205"));
    }

    #[tokio::test]
    async fn empty_fetch_keeps_old_checkpoint() {
        let h = Harness::new();
        h.checkpoints.set("c1", "100").unwrap();
        h.api.set_messages("c1", Reply::Ok(Vec::new()));

        let report = h.run(&enabled(), &[changed("c1", "a")]).await;

        assert_eq!(report.fetched, 0);
        assert_eq!(h.checkpoints.get("c1").as_deref(), Some("100"));
    }

    #[tokio::test]
    async fn checkpoint_follows_fetched_id_not_reported_id() {
        let h = Harness::new();
        h.api
            .set_messages("c1", Reply::Ok(vec![message("107", "bob", "bob", "later")]));

        h.run(&enabled(), &[changed("c1", "a")]).await;
        assert_eq!(h.checkpoints.get("c1").as_deref(), Some("107"));
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_are_spaced() {
        let h = Harness::new();
        let policy = enabled();
        let ctx = DispatchContext {
            api: &h.api,
            checkpoints: &h.checkpoints,
            log: &h.log,
            alerts: &h.alerts,
            policy: &policy,
            local_user_id: None,
            fetch_spacing: Duration::from_millis(500),
        };

        let start = tokio::time::Instant::now();
        dispatch_changes(&ctx, &[changed("c1", "a"), changed("c2", "b"), changed("c3", "c")])
            .await;
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }
}
