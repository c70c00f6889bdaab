use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct UserWire {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) username: String,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct ChannelWire {
    pub(crate) id: String,
    #[serde(rename = "type")]
    pub(crate) kind: i64,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) recipients: Option<Vec<UserWire>>,
    #[serde(default)]
    pub(crate) last_message_id: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct GuildWire {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct AttachmentWire {
    #[serde(default)]
    pub(crate) filename: String,
}

#[derive(Debug, Deserialize, Clone)]
pub(crate) struct MessageWire {
    pub(crate) id: String,
    #[serde(default)]
    pub(crate) content: String,
    pub(crate) author: UserWire,
    #[serde(default)]
    pub(crate) attachments: Option<Vec<AttachmentWire>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChannelKind {
    DirectMessage,
    Group,
    GuildText,
    GuildVoice,
    Other(i64),
}

impl ChannelKind {
    pub(crate) fn from_wire(kind: i64) -> Self {
        match kind {
            0 => Self::GuildText,
            1 => Self::DirectMessage,
            2 => Self::GuildVoice,
            3 => Self::Group,
            other => Self::Other(other),
        }
    }

    pub(crate) fn is_private(self) -> bool {
        matches!(self, Self::DirectMessage | Self::Group)
    }
}

/// A channel the poller checks each cycle, as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PolledChannel {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) kind: ChannelKind,
    pub(crate) last_message_id: Option<String>,
}

impl PolledChannel {
    /// Reported last message id, `None` when the service sent nothing or an empty string.
    pub(crate) fn reported_last_message(&self) -> Option<&str> {
        self.last_message_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NotificationRecord {
    #[serde(default)]
    pub(crate) sender: String,
    #[serde(default)]
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) channel_id: String,
    #[serde(default)]
    pub(crate) channel_name: String,
    #[serde(default)]
    pub(crate) time: String,
}

impl NotificationRecord {
    pub(crate) fn capture(message: &MessageWire, channel_id: &str, channel_name: &str) -> Self {
        Self {
            sender: message.author.username.clone(),
            content: message.content.clone(),
            channel_id: channel_id.to_string(),
            channel_name: channel_name.to_string(),
            time: chrono::Local::now().format("%H:%M").to_string(),
        }
    }
}
