use std::sync::Arc;

use crate::{consts::CHECKPOINT_KEY_PREFIX, error::StoreError, store::KvStore};

/// Last-seen message id per channel, stored as `last_msg_<channelId>`.
///
/// Entries are never deleted; stale ones for left channels are harmless.
#[derive(Clone)]
pub(crate) struct CheckpointStore {
    store: Arc<dyn KvStore>,
}

impl CheckpointStore {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub(crate) fn get(&self, channel_id: &str) -> Option<String> {
        self.store
            .get_string(&checkpoint_key(channel_id))
            .filter(|id| !id.trim().is_empty())
    }

    pub(crate) fn set(&self, channel_id: &str, message_id: &str) -> Result<(), StoreError> {
        self.store
            .put_string(&checkpoint_key(channel_id), message_id)
    }

    pub(crate) fn tracked_count(&self) -> usize {
        self.store.keys_with_prefix(CHECKPOINT_KEY_PREFIX).len()
    }
}

fn checkpoint_key(channel_id: &str) -> String {
    format!("{CHECKPOINT_KEY_PREFIX}{channel_id}")
}
