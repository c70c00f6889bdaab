use std::collections::HashSet;

use tracing::{debug, warn};

use crate::{checkpoint::CheckpointStore, model::PolledChannel};

/// A channel whose reported last message differs from its checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChangedChannel {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) checkpoint: String,
    pub(crate) reported: String,
}

#[derive(Debug, Default)]
pub(crate) struct Detection {
    pub(crate) changed: Vec<ChangedChannel>,
    /// First observations whose checkpoint was seeded without an alert.
    pub(crate) initialized: usize,
    /// Checkpoints force-synced in baseline mode.
    pub(crate) baselined: usize,
    pub(crate) unchanged: usize,
    pub(crate) write_failures: usize,
}

/// Compares every channel's reported last message id with its checkpoint.
///
/// First observations seed the checkpoint and are never reported as changed.
/// With `baseline` set every non-empty reported id is written and nothing is
/// reported as changed.
pub(crate) fn detect_changes(
    channels: &[PolledChannel],
    checkpoints: &CheckpointStore,
    baseline: bool,
) -> Detection {
    let mut detection = Detection::default();
    let mut seen = HashSet::new();

    for channel in channels {
        if !seen.insert(channel.id.as_str()) {
            continue;
        }
        let Some(reported) = channel.reported_last_message() else {
            detection.unchanged += 1;
            continue;
        };

        if baseline {
            match checkpoints.set(&channel.id, reported) {
                Ok(()) => detection.baselined += 1,
                Err(error) => {
                    warn!(channel_id = %channel.id, %error, "failed to write baseline checkpoint");
                    detection.write_failures += 1;
                }
            }
            continue;
        }

        match checkpoints.get(&channel.id) {
            None => match checkpoints.set(&channel.id, reported) {
                Ok(()) => {
                    debug!(channel_id = %channel.id, kind = ?channel.kind, reported, "checkpoint seeded");
                    detection.initialized += 1;
                }
                Err(error) => {
                    warn!(channel_id = %channel.id, %error, "failed to seed checkpoint");
                    detection.write_failures += 1;
                }
            },
            Some(checkpoint) if checkpoint == reported => detection.unchanged += 1,
            Some(checkpoint) => detection.changed.push(ChangedChannel {
                id: channel.id.clone(),
                name: channel.name.clone(),
                checkpoint,
                reported: reported.to_string(),
            }),
        }
    }

    detection
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        model::ChannelKind,
        store::{KvStore, MemoryStore},
    };

    fn channel(id: &str, last: Option<&str>) -> PolledChannel {
        PolledChannel {
            id: id.to_string(),
            name: format!("name-{id}"),
            kind: ChannelKind::GuildText,
            last_message_id: last.map(str::to_string),
        }
    }

    fn checkpoints() -> CheckpointStore {
        CheckpointStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn first_observation_seeds_checkpoint_without_change() {
        let checkpoints = checkpoints();
        let detection = detect_changes(&[channel("1", Some("100"))], &checkpoints, false);

        assert!(detection.changed.is_empty());
        assert_eq!(detection.initialized, 1);
        assert_eq!(checkpoints.get("1").as_deref(), Some("100"));
    }

    #[test]
    fn equal_ids_are_unchanged() {
        let checkpoints = checkpoints();
        checkpoints.set("1", "100").unwrap();
        let detection = detect_changes(&[channel("1", Some("100"))], &checkpoints, false);
        assert!(detection.changed.is_empty());
        assert_eq!(detection.unchanged, 1);
    }

    #[test]
    fn differing_id_is_changed_and_checkpoint_left_alone() {
        let checkpoints = checkpoints();
        checkpoints.set("1", "100").unwrap();
        let detection = detect_changes(&[channel("1", Some("105"))], &checkpoints, false);

        assert_eq!(
            detection.changed,
            vec![ChangedChannel {
                id: "1".to_string(),
                name: "name-1".to_string(),
                checkpoint: "100".to_string(),
                reported: "105".to_string(),
            }]
        );
        assert_eq!(checkpoints.get("1").as_deref(), Some("100"));
    }

    #[test]
    fn channels_without_messages_create_no_checkpoint() {
        let checkpoints = checkpoints();
        let detection = detect_changes(
            &[channel("1", None), channel("2", Some(""))],
            &checkpoints,
            false,
        );
        assert_eq!(detection.unchanged, 2);
        assert_eq!(checkpoints.tracked_count(), 0);
    }

    #[test]
    fn baseline_syncs_everything_and_reports_nothing() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let checkpoints = CheckpointStore::new(store);
        checkpoints.set("1", "100").unwrap();

        let detection = detect_changes(
            &[channel("1", Some("105")), channel("2", Some("7")), channel("3", None)],
            &checkpoints,
            true,
        );

        assert!(detection.changed.is_empty());
        assert_eq!(detection.baselined, 2);
        assert_eq!(checkpoints.get("1").as_deref(), Some("105"));
        assert_eq!(checkpoints.get("2").as_deref(), Some("7"));
        assert_eq!(checkpoints.get("3"), None);
    }

    #[test]
    fn duplicate_channels_are_considered_once() {
        let checkpoints = checkpoints();
        checkpoints.set("1", "100").unwrap();
        let detection = detect_changes(
            &[channel("1", Some("105")), channel("1", Some("105"))],
            &checkpoints,
            false,
        );
        assert_eq!(detection.changed.len(), 1);
    }
}
