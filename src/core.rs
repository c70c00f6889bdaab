use std::{
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::debug;

use crate::consts::APP_ID;

/// Monotonic counter for generating unique temp/backup file suffixes.
static FILE_SUFFIX_COUNTER: AtomicU64 = AtomicU64::new(0);

pub(crate) fn default_settings_file() -> Result<PathBuf, String> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| "Failed to resolve user config dir".to_string())?
        .join(APP_ID);

    fs::create_dir_all(&config_dir)
        .map_err(|error| format!("Failed to create config directory: {error}"))?;

    Ok(config_dir.join("settings.json"))
}

#[cfg(unix)]
pub(crate) fn restrict_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt as _;

    if path.exists() {
        if let Err(error) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            debug!(?path, %error, "restrict_file_permissions failed");
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn restrict_file_permissions(path: &Path) {
    debug!(?path, "restrict_file_permissions: not supported on this platform");
}

pub(crate) fn truncate_message(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Unique across processes sharing a directory: time, pid and a counter.
pub(crate) fn unique_time_suffix() -> String {
    let counter = FILE_SUFFIX_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{counter}", unix_now_secs(), std::process::id())
}
