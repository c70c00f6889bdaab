use std::time::Duration;

use tracing::{debug, warn};

use crate::{
    api::ChatApi,
    model::{ChannelKind, ChannelWire, PolledChannel},
    throttle::Throttle,
};

const DM_FALLBACK_NAME: &str = "Direct message";
const CHANNEL_FALLBACK_NAME: &str = "channel";

/// Channels discovered in one cycle plus how many discovery calls failed.
#[derive(Debug, Default)]
pub(crate) struct Enumeration {
    pub(crate) channels: Vec<PolledChannel>,
    pub(crate) failed_calls: usize,
}

/// Lists DM/group channels and the text channels of every guild.
///
/// Calls are spaced by `call_spacing`. A failing call contributes zero
/// channels and never stops the rest of the enumeration.
pub(crate) async fn enumerate_channels(api: &dyn ChatApi, call_spacing: Duration) -> Enumeration {
    let mut throttle = Throttle::new(call_spacing);
    let mut enumeration = Enumeration::default();

    throttle.ready().await;
    match api.dm_channels().await {
        Ok(channels) => {
            let before = enumeration.channels.len();
            enumeration.channels.extend(
                channels
                    .into_iter()
                    .filter(|channel| ChannelKind::from_wire(channel.kind).is_private())
                    .map(private_channel),
            );
            debug!(count = enumeration.channels.len() - before, "private channels");
        }
        Err(error) => {
            warn!(%error, "failed to list private channels");
            enumeration.failed_calls += 1;
        }
    }

    throttle.ready().await;
    let guilds = match api.guilds().await {
        Ok(guilds) => guilds,
        Err(error) => {
            warn!(%error, "failed to list guilds");
            enumeration.failed_calls += 1;
            return enumeration;
        }
    };
    debug!(count = guilds.len(), "guilds");

    for guild in guilds {
        let Some(guild_id) = guild.id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };
        let guild_name = guild.name.as_deref().unwrap_or(guild_id);

        throttle.ready().await;
        match api.guild_channels(guild_id).await {
            Ok(channels) => {
                let mut skipped = 0usize;
                for channel in channels {
                    match ChannelKind::from_wire(channel.kind) {
                        ChannelKind::GuildText => {
                            enumeration.channels.push(guild_text_channel(channel))
                        }
                        _ => skipped += 1,
                    }
                }
                debug!(guild = %guild_name, skipped, "guild channels listed");
            }
            Err(error) => {
                warn!(guild = %guild_name, %error, "failed to list guild channels");
                enumeration.failed_calls += 1;
            }
        }
    }

    enumeration
}

fn private_channel(channel: ChannelWire) -> PolledChannel {
    let name = channel
        .recipients
        .as_ref()
        .and_then(|recipients| recipients.first())
        .map(|user| user.username.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| channel.name.clone().filter(|name| !name.is_empty()))
        .unwrap_or_else(|| DM_FALLBACK_NAME.to_string());
    PolledChannel {
        kind: ChannelKind::from_wire(channel.kind),
        id: channel.id,
        name,
        last_message_id: channel.last_message_id,
    }
}

fn guild_text_channel(channel: ChannelWire) -> PolledChannel {
    PolledChannel {
        kind: ChannelKind::GuildText,
        name: channel
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| CHANNEL_FALLBACK_NAME.to_string()),
        id: channel.id,
        last_message_id: channel.last_message_id,
    }
}
