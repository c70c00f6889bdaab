//! Scripted collaborators for poller tests.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use futures_util::future::{BoxFuture, FutureExt as _};

use crate::{
    api::{ApiConnector, ChatApi},
    error::ApiError,
    model::{ChannelWire, GuildWire, MessageWire, UserWire},
    notifications::{Alert, AlertSink},
};

#[derive(Debug, Clone)]
pub(crate) enum Reply<T> {
    Ok(T),
    RateLimited,
    ServerError,
}

impl<T: Clone> Reply<T> {
    fn resolve(&self) -> Result<T, ApiError> {
        match self {
            Reply::Ok(value) => Ok(value.clone()),
            Reply::RateLimited => Err(ApiError::RateLimited { retry_after: None }),
            Reply::ServerError => Err(ApiError::Status {
                status: 500,
                body: "internal error".to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct FakeState {
    me: Option<UserWire>,
    dm_channels: Option<Reply<Vec<ChannelWire>>>,
    guilds: Option<Reply<Vec<GuildWire>>>,
    guild_channels: HashMap<String, Reply<Vec<ChannelWire>>>,
    messages: HashMap<String, Reply<Vec<MessageWire>>>,
    message_delay: Duration,
    calls: Vec<String>,
}

/// In-memory remote API. Unscripted endpoints answer with empty lists.
#[derive(Default, Clone)]
pub(crate) struct FakeChatApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeChatApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_me(&self, id: &str) {
        self.state.lock().unwrap().me = Some(user(id, id));
    }

    pub(crate) fn set_dm_channels(&self, reply: Reply<Vec<ChannelWire>>) {
        self.state.lock().unwrap().dm_channels = Some(reply);
    }

    pub(crate) fn set_guilds(&self, reply: Reply<Vec<GuildWire>>) {
        self.state.lock().unwrap().guilds = Some(reply);
    }

    pub(crate) fn set_guild_channels(&self, guild_id: &str, reply: Reply<Vec<ChannelWire>>) {
        self.state
            .lock()
            .unwrap()
            .guild_channels
            .insert(guild_id.to_string(), reply);
    }

    pub(crate) fn set_messages(&self, channel_id: &str, reply: Reply<Vec<MessageWire>>) {
        self.state
            .lock()
            .unwrap()
            .messages
            .insert(channel_id.to_string(), reply);
    }

    /// Makes every message fetch take `delay` before answering.
    pub(crate) fn set_message_delay(&self, delay: Duration) {
        self.state.lock().unwrap().message_delay = delay;
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn message_fetches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with("messages:"))
            .collect()
    }

    pub(crate) fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    fn record(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl ChatApi for FakeChatApi {
    fn current_user(&self) -> BoxFuture<'_, Result<UserWire, ApiError>> {
        self.record("me".to_string());
        let me = self.state.lock().unwrap().me.clone();
        async move {
            me.ok_or(ApiError::Status {
                status: 401,
                body: "unauthorized".to_string(),
            })
        }
        .boxed()
    }

    fn dm_channels(&self) -> BoxFuture<'_, Result<Vec<ChannelWire>, ApiError>> {
        self.record("dm_channels".to_string());
        let reply = self.state.lock().unwrap().dm_channels.clone();
        async move { reply.map_or(Ok(Vec::new()), |reply| reply.resolve()) }.boxed()
    }

    fn guilds(&self) -> BoxFuture<'_, Result<Vec<GuildWire>, ApiError>> {
        self.record("guilds".to_string());
        let reply = self.state.lock().unwrap().guilds.clone();
        async move { reply.map_or(Ok(Vec::new()), |reply| reply.resolve()) }.boxed()
    }

    fn guild_channels<'a>(
        &'a self,
        guild_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ChannelWire>, ApiError>> {
        self.record(format!("guild_channels:{guild_id}"));
        let reply = self
            .state
            .lock()
            .unwrap()
            .guild_channels
            .get(guild_id)
            .cloned();
        async move { reply.map_or(Ok(Vec::new()), |reply| reply.resolve()) }.boxed()
    }

    fn latest_messages<'a>(
        &'a self,
        channel_id: &'a str,
        limit: u8,
    ) -> BoxFuture<'a, Result<Vec<MessageWire>, ApiError>> {
        self.record(format!("messages:{channel_id}:{limit}"));
        let (reply, delay) = {
            let state = self.state.lock().unwrap();
            (state.messages.get(channel_id).cloned(), state.message_delay)
        };
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            reply
                .map_or(Ok(Vec::new()), |reply| reply.resolve())
                .map(|messages| messages.into_iter().take(usize::from(limit)).collect())
        }
        .boxed()
    }
}

/// Hands out the same fake API regardless of credential.
pub(crate) struct FakeConnector {
    pub(crate) api: FakeChatApi,
}

impl ApiConnector for FakeConnector {
    fn connect(&self, _base_url: &str, _token: &str) -> Result<Arc<dyn ChatApi>, ApiError> {
        Ok(Arc::new(self.api.clone()))
    }
}

#[derive(Default)]
pub(crate) struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub(crate) fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }
}

impl AlertSink for RecordingAlertSink {
    fn post(&self, alert: &Alert) -> anyhow::Result<()> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub(crate) fn user(id: &str, username: &str) -> UserWire {
    UserWire {
        id: id.to_string(),
        username: username.to_string(),
    }
}

pub(crate) fn guild_text(id: &str, name: &str, last_message_id: Option<&str>) -> ChannelWire {
    ChannelWire {
        id: id.to_string(),
        kind: 0,
        name: Some(name.to_string()),
        recipients: None,
        last_message_id: last_message_id.map(str::to_string),
    }
}

pub(crate) fn guild_voice(id: &str, name: &str) -> ChannelWire {
    ChannelWire {
        id: id.to_string(),
        kind: 2,
        name: Some(name.to_string()),
        recipients: None,
        last_message_id: None,
    }
}

pub(crate) fn direct_message(id: &str, peer: &str, last_message_id: Option<&str>) -> ChannelWire {
    ChannelWire {
        id: id.to_string(),
        kind: 1,
        name: None,
        recipients: Some(vec![user(&format!("{peer}-id"), peer)]),
        last_message_id: last_message_id.map(str::to_string),
    }
}

pub(crate) fn guild(id: &str, name: &str) -> GuildWire {
    GuildWire {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
    }
}

pub(crate) fn message(id: &str, author_id: &str, author: &str, content: &str) -> MessageWire {
    MessageWire {
        id: id.to_string(),
        content: content.to_string(),
        author: user(author_id, author),
        attachments: None,
    }
}
