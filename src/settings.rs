use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::{
    checkpoint::CheckpointStore,
    consts::{
        DEFAULT_API_BASE_URL, KEY_API_BASE_URL, KEY_BASELINE_ON_NEXT_START,
        KEY_NOTIFICATIONS_ENABLED, KEY_TOKEN, KEY_USER_ID, LEGACY_KEY_NOTIFICATIONS_MUTED,
    },
    error::StoreError,
    mute::MutePolicy,
    notification_log::NotificationLog,
    store::KvStore,
};

/// Typed view over the persisted settings keys.
#[derive(Clone)]
pub(crate) struct Settings {
    store: Arc<dyn KvStore>,
}

/// Settings read once at the start of a poll cycle.
#[derive(Debug, Clone)]
pub(crate) struct SettingsSnapshot {
    pub(crate) token: Option<String>,
    pub(crate) user_id: Option<String>,
    pub(crate) api_base_url: String,
    pub(crate) baseline_pending: bool,
    pub(crate) policy: MutePolicy,
}

#[derive(Debug, Serialize)]
pub(crate) struct StatusReport {
    pub(crate) api_base_url: String,
    pub(crate) has_token: bool,
    pub(crate) has_user_id: bool,
    pub(crate) notifications_enabled: bool,
    pub(crate) baseline_pending: bool,
    pub(crate) muted_channels: Vec<String>,
    pub(crate) tracked_channels: usize,
    pub(crate) notification_log_len: usize,
    pub(crate) unread_notifications: i64,
}

impl Settings {
    pub(crate) fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub(crate) fn token(&self) -> Option<String> {
        non_empty(self.store.get_string(KEY_TOKEN))
    }

    pub(crate) fn user_id(&self) -> Option<String> {
        non_empty(self.store.get_string(KEY_USER_ID))
    }

    pub(crate) fn save_user_id(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.put_string(KEY_USER_ID, user_id.trim())
    }

    pub(crate) fn save_credentials(&self, token: &str, user_id: &str) -> Result<(), StoreError> {
        debug!(token_len = token.trim().len(), "saving credentials");
        self.store.put_all(vec![
            (KEY_TOKEN.to_string(), token.trim().into()),
            (KEY_USER_ID.to_string(), user_id.trim().into()),
        ])
    }

    pub(crate) fn logout(&self) -> Result<(), StoreError> {
        self.store.remove(KEY_TOKEN)?;
        self.store.remove(KEY_USER_ID)
    }

    pub(crate) fn api_base_url(&self) -> String {
        non_empty(self.store.get_string(KEY_API_BASE_URL))
            .and_then(|url| normalize_base_url(&url).ok())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }

    pub(crate) fn set_api_base_url(&self, base_url: &str) -> Result<String, String> {
        let normalized = normalize_base_url(base_url)?;
        self.store
            .put_string(KEY_API_BASE_URL, &normalized)
            .map_err(|error| format!("Failed to save API base URL: {error}"))?;
        Ok(normalized)
    }

    pub(crate) fn notifications_enabled(&self) -> bool {
        if let Some(enabled) = self.store.get_bool(KEY_NOTIFICATIONS_ENABLED) {
            return enabled;
        }
        // Older settings files only carry the mute flag.
        !self
            .store
            .get_bool(LEGACY_KEY_NOTIFICATIONS_MUTED)
            .unwrap_or(false)
    }

    pub(crate) fn set_notifications_enabled(&self, enabled: bool) -> Result<(), StoreError> {
        self.store.put_all(vec![
            (KEY_NOTIFICATIONS_ENABLED.to_string(), enabled.into()),
            (LEGACY_KEY_NOTIFICATIONS_MUTED.to_string(), (!enabled).into()),
        ])
    }

    /// Turns notifications back on; the next cycle only seeds checkpoints.
    pub(crate) fn enable_notifications(&self) -> Result<(), StoreError> {
        self.set_notifications_enabled(true)?;
        self.mark_baseline_on_next_start()
    }

    pub(crate) fn disable_notifications(&self) -> Result<(), StoreError> {
        self.set_notifications_enabled(false)
    }

    pub(crate) fn baseline_pending(&self) -> bool {
        self.store
            .get_bool(KEY_BASELINE_ON_NEXT_START)
            .unwrap_or(false)
    }

    pub(crate) fn mark_baseline_on_next_start(&self) -> Result<(), StoreError> {
        self.store.put_bool(KEY_BASELINE_ON_NEXT_START, true)
    }

    pub(crate) fn clear_baseline(&self) -> Result<(), StoreError> {
        self.store.put_bool(KEY_BASELINE_ON_NEXT_START, false)
    }

    pub(crate) fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            token: self.token(),
            user_id: self.user_id(),
            api_base_url: self.api_base_url(),
            baseline_pending: self.baseline_pending(),
            policy: MutePolicy::load(self),
        }
    }

    pub(crate) fn status_report(&self, log: &NotificationLog) -> StatusReport {
        let policy = MutePolicy::load(self);
        StatusReport {
            api_base_url: self.api_base_url(),
            has_token: self.token().is_some(),
            has_user_id: self.user_id().is_some(),
            notifications_enabled: policy.enabled(),
            baseline_pending: self.baseline_pending(),
            muted_channels: policy.muted_channels().cloned().collect(),
            tracked_channels: CheckpointStore::new(self.store.clone()).tracked_count(),
            notification_log_len: log.load().len(),
            unread_notifications: log.unread_count(),
        }
    }
}

pub(crate) fn normalize_base_url(input: &str) -> Result<String, String> {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err("API base URL is required".to_string());
    }

    let url =
        reqwest::Url::parse(trimmed).map_err(|error| format!("Invalid API base URL: {error}"))?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err("API base URL must start with http:// or https://".to_string());
    }

    Ok(trimmed.to_string())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
