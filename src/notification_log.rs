use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    consts::{KEY_PENDING_NOTIFICATIONS, KEY_UNREAD_NOTIF_COUNT},
    core::truncate_message,
    error::StoreError,
    model::NotificationRecord,
    store::KvStore,
};

/// Bounded notification history backing the in-app notification center.
///
/// Stored oldest-first as a JSON array string. Appending past `limit` drops
/// the oldest entries; the unread counter keeps counting regardless.
#[derive(Clone)]
pub(crate) struct NotificationLog {
    store: Arc<dyn KvStore>,
    limit: usize,
}

impl NotificationLog {
    pub(crate) fn new(store: Arc<dyn KvStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Oldest first. A missing or unreadable log is an empty log.
    pub(crate) fn load(&self) -> Vec<NotificationRecord> {
        let Some(raw) = self.store.get_string(KEY_PENDING_NOTIFICATIONS) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<NotificationRecord>>(&raw) {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    %error,
                    payload = %truncate_message(&raw, 140),
                    "notification log unreadable, treating as empty"
                );
                Vec::new()
            }
        }
    }

    pub(crate) fn recent_first(&self) -> Vec<NotificationRecord> {
        let mut records = self.load();
        records.reverse();
        records
    }

    pub(crate) fn unread_count(&self) -> i64 {
        self.store.get_i64(KEY_UNREAD_NOTIF_COUNT).unwrap_or(0)
    }

    /// Appends one record and bumps the unread counter. Returns the new log length.
    pub(crate) fn append(&self, record: NotificationRecord) -> Result<usize, StoreError> {
        let mut records = self.load();
        records.push(record);
        if records.len() > self.limit {
            let overflow = records.len() - self.limit;
            records.drain(..overflow);
            debug!(overflow, "notification log trimmed");
        }

        let unread = self.unread_count().saturating_add(1);
        let len = records.len();
        self.store.put_all(vec![
            (
                KEY_PENDING_NOTIFICATIONS.to_string(),
                serde_json::to_string(&records)?.into(),
            ),
            (KEY_UNREAD_NOTIF_COUNT.to_string(), unread.into()),
        ])?;
        Ok(len)
    }

    pub(crate) fn mark_read(&self) -> Result<(), StoreError> {
        self.store.put_i64(KEY_UNREAD_NOTIF_COUNT, 0)
    }

    pub(crate) fn clear(&self) -> Result<(), StoreError> {
        self.store.put_all(vec![
            (KEY_PENDING_NOTIFICATIONS.to_string(), "[]".into()),
            (KEY_UNREAD_NOTIF_COUNT.to_string(), 0.into()),
        ])
    }
}
