use std::collections::BTreeSet;

use crate::{
    consts::{KEY_MUTED_CHANNELS, MUTED_CHANNELS_DELIMITER},
    error::StoreError,
    settings::Settings,
};

/// Per-channel mute set plus the global enabled flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MutePolicy {
    muted: BTreeSet<String>,
    enabled: bool,
}

impl MutePolicy {
    #[cfg(test)]
    pub(crate) fn new(muted: impl IntoIterator<Item = String>, enabled: bool) -> Self {
        Self {
            muted: muted.into_iter().collect(),
            enabled,
        }
    }

    pub(crate) fn load(settings: &Settings) -> Self {
        let raw = settings
            .store()
            .get_string(KEY_MUTED_CHANNELS)
            .unwrap_or_default();
        Self {
            muted: parse_muted_channels(&raw),
            enabled: settings.notifications_enabled(),
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn is_muted(&self, channel_id: &str) -> bool {
        self.muted.contains(channel_id)
    }

    /// Whether a new message in `channel_id` may raise an OS alert.
    pub(crate) fn allows_alert(&self, channel_id: &str) -> bool {
        self.enabled && !self.is_muted(channel_id)
    }

    pub(crate) fn muted_channels(&self) -> impl Iterator<Item = &String> {
        self.muted.iter()
    }
}

/// Mutes or unmutes one channel. Returns whether the stored set changed.
pub(crate) fn set_channel_muted(
    settings: &Settings,
    channel_id: &str,
    muted: bool,
) -> Result<bool, StoreError> {
    let channel_id = channel_id.trim();
    let raw = settings
        .store()
        .get_string(KEY_MUTED_CHANNELS)
        .unwrap_or_default();
    let mut channels = parse_muted_channels(&raw);
    let changed = if muted {
        channels.insert(channel_id.to_string())
    } else {
        channels.remove(channel_id)
    };
    if changed {
        settings
            .store()
            .put_string(KEY_MUTED_CHANNELS, &join_muted_channels(&channels))?;
    }
    Ok(changed)
}

fn parse_muted_channels(raw: &str) -> BTreeSet<String> {
    raw.split(MUTED_CHANNELS_DELIMITER)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn join_muted_channels(channels: &BTreeSet<String>) -> String {
    channels
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(&MUTED_CHANNELS_DELIMITER.to_string())
}
