use std::{sync::Arc, time::Duration};

use futures_util::future::{BoxFuture, FutureExt as _};
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    consts::ERROR_BODY_MAX_CHARS,
    core::truncate_message,
    error::ApiError,
    model::{ChannelWire, GuildWire, MessageWire, UserWire},
    settings::normalize_base_url,
};

/// The slice of the remote chat REST API the poller consumes.
pub(crate) trait ChatApi: Send + Sync {
    /// `GET /users/@me`
    fn current_user(&self) -> BoxFuture<'_, Result<UserWire, ApiError>>;

    /// `GET /users/@me/channels`
    fn dm_channels(&self) -> BoxFuture<'_, Result<Vec<ChannelWire>, ApiError>>;

    /// `GET /users/@me/guilds`
    fn guilds(&self) -> BoxFuture<'_, Result<Vec<GuildWire>, ApiError>>;

    /// `GET /guilds/{id}/channels`
    fn guild_channels<'a>(
        &'a self,
        guild_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ChannelWire>, ApiError>>;

    /// `GET /channels/{id}/messages?limit=N`, newest first.
    fn latest_messages<'a>(
        &'a self,
        channel_id: &'a str,
        limit: u8,
    ) -> BoxFuture<'a, Result<Vec<MessageWire>, ApiError>>;
}

/// Builds an API client for the credential read at cycle start.
pub(crate) trait ApiConnector: Send + Sync {
    fn connect(&self, base_url: &str, token: &str) -> Result<Arc<dyn ChatApi>, ApiError>;
}

pub(crate) struct HttpConnector {
    timeout: Duration,
}

impl HttpConnector {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ApiConnector for HttpConnector {
    fn connect(&self, base_url: &str, token: &str) -> Result<Arc<dyn ChatApi>, ApiError> {
        Ok(Arc::new(HttpChatApi::new(base_url, token, self.timeout)?))
    }
}

pub(crate) struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub(crate) fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self, ApiError> {
        let base_url = normalize_base_url(base_url).map_err(ApiError::InvalidBaseUrl)?;
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("discord-notifier/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: token.trim().to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let endpoint = format!("{}/{path}", self.base_url);
        debug!(%endpoint, "GET");
        let response = self
            .client
            .get(&endpoint)
            .header(header::AUTHORIZATION, &self.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<f64>().ok());
            return Err(ApiError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: truncate_message(&body, ERROR_BODY_MAX_CHARS),
            });
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(ApiError::Decode)
    }
}

impl ChatApi for HttpChatApi {
    fn current_user(&self) -> BoxFuture<'_, Result<UserWire, ApiError>> {
        self.get_json("users/@me").boxed()
    }

    fn dm_channels(&self) -> BoxFuture<'_, Result<Vec<ChannelWire>, ApiError>> {
        self.get_json("users/@me/channels").boxed()
    }

    fn guilds(&self) -> BoxFuture<'_, Result<Vec<GuildWire>, ApiError>> {
        self.get_json("users/@me/guilds").boxed()
    }

    fn guild_channels<'a>(
        &'a self,
        guild_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ChannelWire>, ApiError>> {
        async move { self.get_json(&format!("guilds/{guild_id}/channels")).await }.boxed()
    }

    fn latest_messages<'a>(
        &'a self,
        channel_id: &'a str,
        limit: u8,
    ) -> BoxFuture<'a, Result<Vec<MessageWire>, ApiError>> {
        async move {
            self.get_json(&format!("channels/{channel_id}/messages?limit={limit}"))
                .await
        }
        .boxed()
    }
}
