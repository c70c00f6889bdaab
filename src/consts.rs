pub(crate) const APP_ID: &str = "discord-notifier";
pub(crate) const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

pub(crate) const POLL_INTERVAL_SECS: u64 = 30;
pub(crate) const ENUMERATION_CALL_SPACING_MS: u64 = 300;
pub(crate) const MESSAGE_FETCH_SPACING_MS: u64 = 500;
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 10;

pub(crate) const NOTIFICATION_LOG_LIMIT: usize = 50;
pub(crate) const ALERT_BODY_MAX_CHARS: usize = 220;
pub(crate) const ERROR_BODY_MAX_CHARS: usize = 200;

pub(crate) const KEY_TOKEN: &str = "DISCORD_TOKEN";
pub(crate) const KEY_USER_ID: &str = "MY_USER_ID";
pub(crate) const KEY_API_BASE_URL: &str = "API_BASE_URL";
pub(crate) const KEY_NOTIFICATIONS_ENABLED: &str = "NOTIFICATIONS_ENABLED";
pub(crate) const LEGACY_KEY_NOTIFICATIONS_MUTED: &str = "NOTIFICATIONS_MUTED";
pub(crate) const KEY_BASELINE_ON_NEXT_START: &str = "BASELINE_ON_NEXT_START";
pub(crate) const KEY_MUTED_CHANNELS: &str = "MUTED_CHANNELS";
pub(crate) const KEY_PENDING_NOTIFICATIONS: &str = "PENDING_NOTIFICATIONS";
pub(crate) const KEY_UNREAD_NOTIF_COUNT: &str = "UNREAD_NOTIF_COUNT";
pub(crate) const CHECKPOINT_KEY_PREFIX: &str = "last_msg_";

pub(crate) const MUTED_CHANNELS_DELIMITER: char = ',';
