//! Per-interaction response state machine.
//!
//! An interaction gets exactly one synchronous response, written back on the
//! webhook's HTTP reply. Everything after that goes through REST using the
//! interaction token, until the token expires 15 minutes after invocation.
//! [`InteractionContext`] tracks which of those two channels is still open
//! and routes each handler call accordingly:
//!
//! ```text
//! Fresh ──defer──▶ Deferred ──send/edit(@original)──▶ Responded
//!   └─────send───────────────────────────────────────▶ Responded ──send──▶ FollowedUp*
//! ```
//!
//! Every operation except `defer` (and a component's `ack`) checks expiry
//! first and fails with [`InteractionError::Expired`] without touching the
//! network.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_channel::Sender;
use axum::http::Extensions;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::clock::{Clock, INTERACTION_LIFETIME};
use crate::components::{ComponentHandler, ComponentRegistry, OnExpire};
use crate::error::InteractionError;
use crate::events::{CommandInteraction, ComponentInteraction, InteractionMeta};
use crate::http::DiscordRest;
use crate::options::ResolvedOptions;
use crate::types::*;

// ---------------------------------------------------------------------------
// Shared services
// ---------------------------------------------------------------------------

/// Everything a context borrows from the router that built it.
#[derive(Clone)]
pub struct Services {
    pub rest: Arc<dyn DiscordRest>,
    pub components: ComponentRegistry,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    pub fn new(rest: Arc<dyn DiscordRest>, clock: Arc<dyn Clock>) -> Self {
        Self {
            rest,
            components: ComponentRegistry::new(Arc::clone(&clock)),
            clock,
        }
    }
}

// ---------------------------------------------------------------------------
// Response state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseState {
    /// The synchronous response has been emitted.
    pub sent: bool,
    /// That response was a deferral with no content yet. Implies `sent`.
    pub deferred: bool,
    pub invoked_at: DateTime<Utc>,
    /// Id of the original response once it is known.
    pub message_id: Option<Snowflake>,
}

/// Optional settings for [`InteractionContext::register_component_with`].
#[derive(Default)]
pub struct ComponentOptions {
    expiration: Option<Duration>,
    on_expire: Option<OnExpire>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lifetime measured from the interaction's invocation. Defaults to
    /// 15 minutes.
    pub fn expires_after(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn on_expire(mut self, f: impl FnOnce() + Send + Sync + 'static) -> Self {
        self.on_expire = Some(Box::new(f));
        self
    }
}

// ---------------------------------------------------------------------------
// InteractionContext
// ---------------------------------------------------------------------------

pub struct InteractionContext {
    meta: InteractionMeta,
    services: Services,
    reply: Option<Sender<InteractionResponse>>,
    state: ResponseState,
}

impl InteractionContext {
    pub(crate) fn new(
        meta: InteractionMeta,
        services: Services,
        reply: Sender<InteractionResponse>,
    ) -> Self {
        let invoked_at = services.clock.now();
        Self {
            meta,
            services,
            reply: Some(reply),
            state: ResponseState {
                sent: false,
                deferred: false,
                invoked_at,
                message_id: None,
            },
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn meta(&self) -> &InteractionMeta {
        &self.meta
    }

    pub fn state(&self) -> &ResponseState {
        &self.state
    }

    pub fn user(&self) -> &User {
        &self.meta.user
    }

    pub fn member(&self) -> Option<&GuildMember> {
        self.meta.member.as_ref()
    }

    pub fn guild_id(&self) -> Option<&str> {
        self.meta.guild_id.as_deref()
    }

    pub fn channel_id(&self) -> &str {
        &self.meta.channel_id
    }

    /// The guild's locale inside a guild, otherwise the user's.
    pub fn locale(&self) -> Option<&str> {
        self.meta
            .guild_locale
            .as_deref()
            .or(self.meta.locale.as_deref())
    }

    pub fn rest(&self) -> &Arc<dyn DiscordRest> {
        &self.services.rest
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.state.invoked_at + INTERACTION_LIFETIME
    }

    pub fn is_expired(&self) -> bool {
        self.services.clock.now() > self.expires_at()
    }

    fn ensure_live(&self) -> Result<(), InteractionError> {
        if self.is_expired() {
            return Err(InteractionError::Expired);
        }
        Ok(())
    }

    fn ensure_sent(&self, what: &'static str) -> Result<(), InteractionError> {
        if !self.state.sent {
            return Err(InteractionError::InvalidState(what));
        }
        Ok(())
    }

    fn is_original(&self, message_id: &str) -> bool {
        message_id == ORIGINAL_MESSAGE || self.state.message_id.as_deref() == Some(message_id)
    }

    /// Emit the synchronous response. Only ever succeeds once.
    async fn respond(&mut self, response: InteractionResponse) -> Result<(), InteractionError> {
        let reply = self
            .reply
            .take()
            .ok_or(InteractionError::InvalidState("initial response already emitted"))?;
        debug!(interaction_id = %self.meta.id, kind = ?response.kind, "initial response");
        reply
            .send(response)
            .await
            .map_err(|_| InteractionError::ResponseClosed)?;
        self.state.sent = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Response operations
    // ------------------------------------------------------------------

    /// Acknowledge now and fill in the content later. No-op once anything
    /// has been sent.
    pub async fn defer(&mut self, ephemeral: bool) -> Result<(), InteractionError> {
        if self.state.sent {
            return Ok(());
        }
        let data = ephemeral.then(|| MessageBody::new().with_ephemeral(true));
        self.respond(InteractionResponse {
            kind: InteractionCallbackType::DeferredChannelMessageWithSource,
            data,
        })
        .await?;
        self.state.deferred = true;
        Ok(())
    }

    /// Send a message, picking the right channel for the current state:
    /// the synchronous response when fresh, an edit of the deferred
    /// original, or a follow-up after that.
    ///
    /// Returns the created or edited message when it went over REST.
    pub async fn send(
        &mut self,
        body: impl Into<MessageBody>,
        ephemeral: bool,
    ) -> Result<Option<Message>, InteractionError> {
        self.ensure_live()?;
        let body = body.into();
        if !self.state.sent {
            self.respond(InteractionResponse {
                kind: InteractionCallbackType::ChannelMessageWithSource,
                data: Some(body.with_ephemeral(ephemeral)),
            })
            .await?;
            Ok(None)
        } else if self.state.deferred {
            self.edit(body, None).await.map(Some)
        } else {
            self.send_follow_up(body, ephemeral).await.map(Some)
        }
    }

    /// Create an additional message after the initial response.
    pub async fn send_follow_up(
        &mut self,
        body: impl Into<MessageBody>,
        ephemeral: bool,
    ) -> Result<Message, InteractionError> {
        self.ensure_live()?;
        self.ensure_sent("follow-up before the initial response")?;
        let body = body.into().with_ephemeral(ephemeral);
        let message = self
            .services
            .rest
            .create_followup(&self.meta.token, &body)
            .await?;
        Ok(message)
    }

    /// Edit a message created by this interaction; `None` means the
    /// original response.
    pub async fn edit(
        &mut self,
        body: impl Into<MessageBody>,
        message_id: Option<&str>,
    ) -> Result<Message, InteractionError> {
        self.ensure_live()?;
        self.ensure_sent("edit before any response")?;
        let target = message_id.unwrap_or(ORIGINAL_MESSAGE);
        let original = self.is_original(target);
        let message = self
            .services
            .rest
            .edit_webhook_message(&self.meta.token, target, &body.into())
            .await?;
        if original {
            self.state.deferred = false;
            self.state.message_id = Some(message.id.clone());
        }
        Ok(message)
    }

    /// Delete a message created by this interaction; `None` means the
    /// original response.
    pub async fn delete(&mut self, message_id: Option<&str>) -> Result<(), InteractionError> {
        self.ensure_live()?;
        self.ensure_sent("delete before any response")?;
        let target = message_id.unwrap_or(ORIGINAL_MESSAGE);
        let original = self.is_original(target);
        self.services
            .rest
            .delete_webhook_message(&self.meta.token, target)
            .await?;
        if original {
            self.state.message_id = None;
        }
        Ok(())
    }

    /// Fetch a message created by this interaction; fetching the original
    /// records its id.
    pub async fn fetch_message(&mut self, message_id: Option<&str>) -> Result<Message, InteractionError> {
        self.ensure_live()?;
        let target = message_id.unwrap_or(ORIGINAL_MESSAGE);
        let original = self.is_original(target);
        let message = self
            .services
            .rest
            .get_webhook_message(&self.meta.token, target)
            .await?;
        if original {
            self.state.message_id = Some(message.id.clone());
        }
        Ok(message)
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach a handler to `custom_id` on the original response, live for
    /// the default 15 minutes from invocation.
    pub async fn register_component(
        &mut self,
        custom_id: impl Into<String>,
        handler: ComponentHandler,
    ) -> Result<(), InteractionError> {
        self.register_component_with(custom_id, handler, ComponentOptions::new())
            .await
    }

    /// [`Self::register_component`] with a custom lifetime or expiry
    /// callback.
    ///
    /// The original response must carry content; if its id is not known
    /// yet it is fetched first.
    pub async fn register_component_with(
        &mut self,
        custom_id: impl Into<String>,
        handler: ComponentHandler,
        options: ComponentOptions,
    ) -> Result<(), InteractionError> {
        self.ensure_live()?;
        if !self.state.sent {
            return Err(InteractionError::InvalidState(
                "a message must be sent before registering a component",
            ));
        }
        if self.state.deferred {
            return Err(InteractionError::InvalidState(
                "cannot register a component on a deferred response",
            ));
        }

        let message_id = match self.state.message_id.clone() {
            Some(id) => id,
            None => self.fetch_message(None).await?.id,
        };
        let expires_at =
            self.state.invoked_at + options.expiration.unwrap_or(INTERACTION_LIFETIME);
        self.services.components.register(
            message_id,
            custom_id,
            handler,
            expires_at,
            options.on_expire,
        );
        Ok(())
    }

    /// Remove a component handler. Defaults to the original response's
    /// message. Returns whether a registration existed.
    pub fn unregister_component(
        &self,
        custom_id: &str,
        message_id: Option<&str>,
    ) -> Result<bool, InteractionError> {
        self.ensure_live()?;
        let message_id = message_id
            .or(self.state.message_id.as_deref())
            .ok_or(InteractionError::InvalidState(
                "no message id known to unregister from",
            ))?;
        Ok(self.services.components.unregister(message_id, custom_id))
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// The guild the interaction came from, if any.
    pub async fn guild(&self) -> Result<Option<Guild>, InteractionError> {
        let Some(guild_id) = self.meta.guild_id.as_deref() else {
            return Ok(None);
        };
        Ok(Some(self.services.rest.get_guild(guild_id).await?))
    }

    pub async fn channel(&self) -> Result<Channel, InteractionError> {
        Ok(self.services.rest.get_channel(&self.meta.channel_id).await?)
    }
}

impl std::fmt::Debug for InteractionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionContext")
            .field("id", &self.meta.id)
            .field("token", &"<redacted>")
            .field("state", &self.state)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Command context
// ---------------------------------------------------------------------------

/// Context handed to command middleware and handlers.
///
/// Derefs to [`InteractionContext`]. Middleware can attach typed values
/// through [`Self::extensions_mut`] for later middleware and the handler.
#[derive(Debug)]
pub struct CommandContext {
    base: InteractionContext,
    pub name: String,
    pub command_id: Option<Snowflake>,
    pub options: ResolvedOptions,
    extensions: Extensions,
}

impl CommandContext {
    pub(crate) fn new(
        command: CommandInteraction,
        options: ResolvedOptions,
        services: Services,
        reply: Sender<InteractionResponse>,
    ) -> Self {
        Self {
            base: InteractionContext::new(command.meta, services, reply),
            name: command.name,
            command_id: command.command_id,
            options,
            extensions: Extensions::new(),
        }
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Shorthand for `extensions().get::<T>()`.
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }
}

impl Deref for CommandContext {
    type Target = InteractionContext;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for CommandContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

// ---------------------------------------------------------------------------
// Component context
// ---------------------------------------------------------------------------

/// Context handed to component handlers.
///
/// Unlike a command, the natural first response to a component is updating
/// the message it sits on, so [`Self::ack`] and [`Self::edit_parent`] use the
/// update-in-place response types.
#[derive(Debug)]
pub struct ComponentContext {
    base: InteractionContext,
    pub custom_id: String,
    pub component_type: ComponentType,
    pub values: Vec<String>,
    /// The message carrying the component.
    pub message: Message,
}

impl ComponentContext {
    pub(crate) fn new(
        component: ComponentInteraction,
        services: Services,
        reply: Sender<InteractionResponse>,
    ) -> Self {
        Self {
            base: InteractionContext::new(component.meta, services, reply),
            custom_id: component.custom_id,
            component_type: component.component_type,
            values: component.values,
            message: component.message,
        }
    }

    /// Acknowledge without changing the message. No-op once anything has
    /// been sent.
    pub async fn ack(&mut self) -> Result<(), InteractionError> {
        if self.base.state.sent {
            return Ok(());
        }
        self.base
            .respond(InteractionResponse {
                kind: InteractionCallbackType::DeferredUpdateMessage,
                data: None,
            })
            .await
    }

    /// Replace the parent message's content: in place as the synchronous
    /// response when fresh, otherwise by editing it over REST.
    pub async fn edit_parent(
        &mut self,
        body: impl Into<MessageBody>,
    ) -> Result<Option<Message>, InteractionError> {
        self.base.ensure_live()?;
        if !self.base.state.sent {
            self.base
                .respond(InteractionResponse {
                    kind: InteractionCallbackType::UpdateMessage,
                    data: Some(body.into()),
                })
                .await?;
            self.base.state.message_id = Some(self.message.id.clone());
            return Ok(None);
        }
        let parent = self.message.id.clone();
        self.base.edit(body, Some(&parent)).await.map(Some)
    }
}

impl Deref for ComponentContext {
    type Target = InteractionContext;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for ComponentContext {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

// ---------------------------------------------------------------------------
// Test harness
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod testing {
    use async_channel::Receiver;

    use super::*;
    use crate::clock::ManualClock;
    use crate::http::fake::{message, RecordingRest};

    pub fn meta() -> InteractionMeta {
        InteractionMeta {
            id: "interaction-1".to_string(),
            application_id: "app".to_string(),
            token: "tok".to_string(),
            channel_id: "channel-1".to_string(),
            guild_id: Some("guild-1".to_string()),
            user: User {
                id: "user-1".to_string(),
                username: "alice".to_string(),
                discriminator: None,
                avatar: None,
                bot: false,
                global_name: None,
            },
            member: None,
            locale: Some("en-US".to_string()),
            guild_locale: None,
        }
    }

    /// Recording REST fake, manual clock and the services wired to them.
    pub struct Harness {
        pub rest: Arc<RecordingRest>,
        pub clock: Arc<ManualClock>,
        pub services: Services,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_rest(RecordingRest::default())
        }

        pub fn with_rest(rest: RecordingRest) -> Self {
            let rest = Arc::new(rest);
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let services = Services::new(rest.clone(), clock.clone());
            Self {
                rest,
                clock,
                services,
            }
        }

        pub fn context(&self) -> (InteractionContext, Receiver<InteractionResponse>) {
            let (tx, rx) = async_channel::bounded(1);
            (InteractionContext::new(meta(), self.services.clone(), tx), rx)
        }

        pub fn command(&self, name: &str) -> (CommandContext, Receiver<InteractionResponse>) {
            let (tx, rx) = async_channel::bounded(1);
            let command = CommandInteraction {
                meta: meta(),
                command_id: None,
                name: name.to_string(),
                kind: ApplicationCommandType::ChatInput,
                options: Vec::new(),
                resolved: None,
                target_id: None,
            };
            let ctx = CommandContext::new(command, ResolvedOptions::default(), self.services.clone(), tx);
            (ctx, rx)
        }

        pub fn component(
            &self,
            message_id: &str,
            custom_id: &str,
        ) -> (ComponentContext, Receiver<InteractionResponse>) {
            let (tx, rx) = async_channel::bounded(1);
            let component = ComponentInteraction {
                meta: meta(),
                custom_id: custom_id.to_string(),
                component_type: ComponentType::Button,
                values: Vec::new(),
                message: message(message_id, None),
            };
            (ComponentContext::new(component, self.services.clone(), tx), rx)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
