//! Outbound REST client for the Discord API.
//!
//! Everything the engine needs from the platform after the synchronous
//! response slot is consumed (follow-ups, edits, deletes, fetching the
//! original response) plus the bot-authenticated lookups handlers use, goes
//! through the [`DiscordRest`] trait. [`DiscordHttpClient`] is the reqwest
//! implementation; tests swap in a recording fake.
//!
//! No retry or back-off happens here: a non-success status is returned to the
//! caller as [`HttpError::Api`] unchanged.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT as USER_AGENT_HEADER};
use reqwest::Method;
use thiserror::Error;
use tracing::debug;

use crate::types::*;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://discord.com/api/v10";
const USER_AGENT: &str = "DiscordBot (https://github.com/hello-interactions, 0.1)";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HttpError {
    /// Non-success status from Discord.
    #[error("Discord API error {status} on {route}: {body}")]
    Api {
        status: u16,
        body: String,
        route: String,
    },
    /// Transport / network error.
    #[error("HTTP transport error: {0}")]
    Transport(String),
    /// Serialisation error.
    #[error("Serialisation error: {0}")]
    Serde(String),
}

// ---------------------------------------------------------------------------
// The REST surface the engine depends on
// ---------------------------------------------------------------------------

/// REST operations consumed by interaction contexts and the client.
///
/// Webhook message operations are scoped by the interaction token and carry
/// no bot authorization; everything else is bot-authenticated.
#[async_trait]
pub trait DiscordRest: Send + Sync {
    async fn get_guild(&self, guild_id: &str) -> Result<Guild, HttpError>;

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError>;

    /// `GET /webhooks/{app}/{token}/messages/{id}`; `id` may be `@original`.
    async fn get_webhook_message(&self, token: &str, message_id: &str)
        -> Result<Message, HttpError>;

    /// `POST /webhooks/{app}/{token}`: create a follow-up message.
    async fn create_followup(&self, token: &str, body: &MessageBody) -> Result<Message, HttpError>;

    /// `PATCH /webhooks/{app}/{token}/messages/{id}`.
    async fn edit_webhook_message(
        &self,
        token: &str,
        message_id: &str,
        body: &MessageBody,
    ) -> Result<Message, HttpError>;

    /// `DELETE /webhooks/{app}/{token}/messages/{id}`.
    async fn delete_webhook_message(&self, token: &str, message_id: &str) -> Result<(), HttpError>;

    /// Replace the global command set, or a guild's when `guild_id` is given.
    async fn bulk_overwrite_commands(
        &self,
        guild_id: Option<&str>,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError>;
}

// ---------------------------------------------------------------------------
// DiscordHttpClient
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bot,
    Webhook,
}

/// reqwest-backed [`DiscordRest`].
///
/// Cheap to clone (reqwest's client is an `Arc` internally).
#[derive(Clone)]
pub struct DiscordHttpClient {
    token: String,
    application_id: Snowflake,
    http: reqwest::Client,
}

impl DiscordHttpClient {
    /// Create a new client with the given bot token and application id.
    pub fn new(token: impl Into<String>, application_id: impl Into<Snowflake>) -> Self {
        Self {
            token: token.into(),
            application_id: application_id.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    // ------------------------------------------------------------------
    // Low-level: the single request method everything funnels through
    // ------------------------------------------------------------------

    /// Send a request to `{BASE_URL}/{path}`.
    ///
    /// `route` is a template like `PATCH /webhooks/{application_id}/{token}`
    /// used for logging and error reporting; it must never contain the
    /// interaction token itself.
    async fn request(
        &self,
        method: Method,
        path: &str,
        route: &str,
        auth: Auth,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, HttpError> {
        let url = endpoint(path);
        debug!(route, "discord request");

        let mut req = self
            .http
            .request(method, &url)
            .header(USER_AGENT_HEADER, USER_AGENT);
        if auth == Auth::Bot {
            req = req.header(AUTHORIZATION, format!("Bot {}", self.token));
        }
        if let Some(json) = body {
            req = req.json(json);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        Err(HttpError::Api {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&bytes).to_string(),
            route: route.to_string(),
        })
    }

    /// Like [`Self::request`] but deserialises the response body as JSON.
    async fn request_json<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        route: &str,
        auth: Auth,
        body: Option<&serde_json::Value>,
    ) -> Result<T, HttpError> {
        let bytes = self.request(method, path, route, auth, body).await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let raw: String = String::from_utf8_lossy(&bytes).chars().take(200).collect();
            HttpError::Serde(format!("{}: {}", e, raw))
        })
    }

    fn webhook_path(&self, token: &str, message_id: Option<&str>) -> String {
        match message_id {
            Some(id) => format!("webhooks/{}/{}/messages/{}", self.application_id, token, id),
            None => format!("webhooks/{}/{}", self.application_id, token),
        }
    }

    fn commands_path(&self, guild_id: Option<&str>) -> String {
        match guild_id {
            Some(guild) => format!("applications/{}/guilds/{}/commands", self.application_id, guild),
            None => format!("applications/{}/commands", self.application_id),
        }
    }
}

fn endpoint(path: &str) -> String {
    format!("{}/{}", BASE_URL, path.trim_start_matches('/'))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, HttpError> {
    serde_json::to_value(value).map_err(|e| HttpError::Serde(e.to_string()))
}

#[async_trait]
impl DiscordRest for DiscordHttpClient {
    async fn get_guild(&self, guild_id: &str) -> Result<Guild, HttpError> {
        let path = format!("guilds/{}?with_counts=true", guild_id);
        self.request_json(Method::GET, &path, "GET /guilds/{guild_id}", Auth::Bot, None)
            .await
    }

    async fn get_channel(&self, channel_id: &str) -> Result<Channel, HttpError> {
        let path = format!("channels/{}", channel_id);
        self.request_json(Method::GET, &path, "GET /channels/{channel_id}", Auth::Bot, None)
            .await
    }

    async fn get_webhook_message(
        &self,
        token: &str,
        message_id: &str,
    ) -> Result<Message, HttpError> {
        let path = self.webhook_path(token, Some(message_id));
        self.request_json(
            Method::GET,
            &path,
            "GET /webhooks/{application_id}/{token}/messages/{message_id}",
            Auth::Webhook,
            None,
        )
        .await
    }

    async fn create_followup(&self, token: &str, body: &MessageBody) -> Result<Message, HttpError> {
        let path = self.webhook_path(token, None);
        let json = to_json(body)?;
        self.request_json(
            Method::POST,
            &path,
            "POST /webhooks/{application_id}/{token}",
            Auth::Webhook,
            Some(&json),
        )
        .await
    }

    async fn edit_webhook_message(
        &self,
        token: &str,
        message_id: &str,
        body: &MessageBody,
    ) -> Result<Message, HttpError> {
        let path = self.webhook_path(token, Some(message_id));
        let json = to_json(body)?;
        self.request_json(
            Method::PATCH,
            &path,
            "PATCH /webhooks/{application_id}/{token}/messages/{message_id}",
            Auth::Webhook,
            Some(&json),
        )
        .await
    }

    async fn delete_webhook_message(&self, token: &str, message_id: &str) -> Result<(), HttpError> {
        let path = self.webhook_path(token, Some(message_id));
        // 204 No Content on success; nothing to parse.
        self.request(
            Method::DELETE,
            &path,
            "DELETE /webhooks/{application_id}/{token}/messages/{message_id}",
            Auth::Webhook,
            None,
        )
        .await?;
        Ok(())
    }

    async fn bulk_overwrite_commands(
        &self,
        guild_id: Option<&str>,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let path = self.commands_path(guild_id);
        let route = if guild_id.is_some() {
            "PUT /applications/{application_id}/guilds/{guild_id}/commands"
        } else {
            "PUT /applications/{application_id}/commands"
        };
        let json = to_json(&commands)?;
        self.request_json(Method::PUT, &path, route, Auth::Bot, Some(&json))
            .await
    }
}

impl std::fmt::Debug for DiscordHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordHttpClient")
            .field("application_id", &self.application_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Recording fake for tests
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
