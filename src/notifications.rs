use crate::{
    consts::{ALERT_BODY_MAX_CHARS, APP_ID},
    core::truncate_message,
    model::MessageWire,
};

/// One OS-level alert for a new message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Alert {
    /// Stable per channel so a newer alert replaces an older one.
    pub(crate) tag: String,
    pub(crate) title: String,
    pub(crate) subtitle: String,
    pub(crate) body: String,
}

impl Alert {
    pub(crate) fn for_message(channel_id: &str, channel_name: &str, message: &MessageWire) -> Self {
        Self {
            tag: notification_tag(channel_id),
            title: message.author.username.clone(),
            subtitle: channel_name.to_string(),
            body: truncate_message(&display_content(message), ALERT_BODY_MAX_CHARS),
        }
    }
}

pub(crate) trait AlertSink: Send + Sync {
    fn post(&self, alert: &Alert) -> anyhow::Result<()>;
}

pub(crate) fn notification_tag(channel_id: &str) -> String {
    format!("{APP_ID}.channel.{channel_id}")
}

/// Message text for an alert; attachment-only messages get a placeholder.
pub(crate) fn display_content(message: &MessageWire) -> String {
    if !message.content.trim().is_empty() {
        return message.content.clone();
    }
    match message
        .attachments
        .as_deref()
        .and_then(|attachments| attachments.first())
    {
        Some(attachment) if !attachment.filename.trim().is_empty() => {
            format!("📎 {}", attachment.filename)
        }
        _ => "[attachment]".to_string(),
    }
}

/// FNV-1a over the tag; stable across runs, unlike `DefaultHasher`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn stable_notification_id(tag: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in tag.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Posts alerts through the desktop notification service.
///
/// Only Linux replaces an earlier alert for the same channel: the tag hashes
/// to a stable notification id there. `mac-notification-sys` and the Windows
/// toast backend of `notify-rust` expose no replacement id, so on those
/// platforms alerts for one channel stack and the tag only shows in logs.
pub(crate) struct DesktopAlertSink;

impl DesktopAlertSink {
    pub(crate) fn new() -> Self {
        #[cfg(target_os = "macos")]
        ensure_macos_notification_application();
        Self
    }
}

impl AlertSink for DesktopAlertSink {
    #[cfg(target_os = "macos")]
    fn post(&self, alert: &Alert) -> anyhow::Result<()> {
        let alert = alert.clone();
        // The macOS call blocks until the banner is delivered.
        std::thread::spawn(move || {
            let mut notification = mac_notification_sys::Notification::new();
            notification
                .title(&alert.title)
                .subtitle(&alert.subtitle)
                .message(&alert.body)
                .default_sound()
                .asynchronous(true);
            if let Err(error) = notification.send() {
                tracing::warn!(%error, tag = %alert.tag, "failed to show macOS notification");
            }
        });
        Ok(())
    }

    #[cfg(any(target_os = "linux", target_os = "windows"))]
    fn post(&self, alert: &Alert) -> anyhow::Result<()> {
        let mut notification = notify_rust::Notification::new();
        notification
            .appname(APP_ID)
            .summary(&format!("{} · {}", alert.title, alert.subtitle))
            .body(&alert.body);
        #[cfg(target_os = "linux")]
        notification.id(stable_notification_id(&alert.tag));

        let tag = alert.tag.clone();
        // `show` is a blocking D-Bus / WinRT call; keep it off the runtime.
        std::thread::Builder::new()
            .name("desktop-alert".to_string())
            .spawn(move || {
                if let Err(error) = notification.show() {
                    tracing::warn!(%error, %tag, "failed to show desktop notification");
                }
            })?;
        Ok(())
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    fn post(&self, alert: &Alert) -> anyhow::Result<()> {
        tracing::info!(tag = %alert.tag, title = %alert.title, "new message (no desktop notifications on this platform)");
        Ok(())
    }
}

#[cfg(target_os = "macos")]
fn ensure_macos_notification_application() {
    static INIT_NOTIFICATION_APP: std::sync::Once = std::sync::Once::new();
    INIT_NOTIFICATION_APP.call_once(|| {
        for bundle_id in ["com.apple.Terminal", "com.apple.Finder"] {
            match mac_notification_sys::set_application(bundle_id) {
                Ok(_) => return,
                Err(error) => {
                    tracing::debug!(%error, bundle_id, "failed to set macOS notification bundle id");
                }
            }
        }
    });
}
