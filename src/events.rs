//! Typed interaction events.
//!
//! Instead of matching on a raw [`Interaction`] and its grab-bag `data` field
//! everywhere, the router decodes each verified body into this closed enum so
//! the rest of the crate can pattern-match on strongly-typed payloads whose
//! required fields are already known to be present.

use serde::Deserialize;
use thiserror::Error;

use crate::types::*;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid interaction JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown interaction type {0}")]
    UnknownType(u8),

    #[error("unsupported interaction type {0:?}")]
    Unsupported(InteractionType),

    #[error("interaction is missing `{0}`")]
    MissingField(&'static str),
}

// ---------------------------------------------------------------------------
// The top-level event enum
// ---------------------------------------------------------------------------

/// A fully-parsed interaction coming off the webhook.
#[derive(Debug, Clone)]
pub enum InteractionEvent {
    /// Endpoint liveness check; answered with a pong.
    Ping,

    /// A slash, user or message command was invoked.
    Command(CommandInteraction),

    /// A button or select menu on a message was used.
    Component(ComponentInteraction),

    /// The user is typing into an autocomplete-enabled option.
    Autocomplete(CommandInteraction),
}

/// Fields shared by every non-ping interaction.
#[derive(Debug, Clone)]
pub struct InteractionMeta {
    pub id: Snowflake,
    pub application_id: Snowflake,
    pub token: String,
    pub channel_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    /// The invoking user, taken from `member.user` inside guilds.
    pub user: User,
    pub member: Option<GuildMember>,
    pub locale: Option<String>,
    pub guild_locale: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandInteraction {
    pub meta: InteractionMeta,
    pub command_id: Option<Snowflake>,
    pub name: String,
    pub kind: ApplicationCommandType,
    pub options: Vec<CommandDataOption>,
    pub resolved: Option<ResolvedData>,
    /// Target user or message for context-menu commands.
    pub target_id: Option<Snowflake>,
}

#[derive(Debug, Clone)]
pub struct ComponentInteraction {
    pub meta: InteractionMeta,
    pub custom_id: String,
    pub component_type: ComponentType,
    /// Selected values for select menus; empty for buttons.
    pub values: Vec<String>,
    /// The message the component is attached to.
    pub message: Message,
}

impl ComponentInteraction {
    /// Registry key this interaction dispatches on.
    pub fn key(&self) -> (&str, &str) {
        (&self.message.id, &self.custom_id)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Just enough of the body to pick a variant before committing to the full
/// schema; pings carry almost nothing else.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: u8,
}

impl InteractionEvent {
    /// Parse a verified request body.
    pub fn decode(body: &[u8]) -> Result<Self, DecodeError> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        match envelope.kind {
            1 => return Ok(InteractionEvent::Ping),
            2..=5 => {}
            other => return Err(DecodeError::UnknownType(other)),
        }

        let raw: Interaction = serde_json::from_slice(body)?;
        match raw.kind {
            InteractionType::Ping => Ok(InteractionEvent::Ping),
            InteractionType::ApplicationCommand => {
                CommandInteraction::from_raw(raw).map(InteractionEvent::Command)
            }
            InteractionType::ApplicationCommandAutocomplete => {
                CommandInteraction::from_raw(raw).map(InteractionEvent::Autocomplete)
            }
            InteractionType::MessageComponent => {
                ComponentInteraction::from_raw(raw).map(InteractionEvent::Component)
            }
            kind @ InteractionType::ModalSubmit => Err(DecodeError::Unsupported(kind)),
        }
    }

    /// Short name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            InteractionEvent::Ping => "ping",
            InteractionEvent::Command(_) => "command",
            InteractionEvent::Component(_) => "component",
            InteractionEvent::Autocomplete(_) => "autocomplete",
        }
    }
}

impl InteractionMeta {
    fn from_raw(raw: &mut Interaction) -> Result<Self, DecodeError> {
        let user = raw
            .member
            .as_ref()
            .and_then(|m| m.user.clone())
            .or_else(|| raw.user.take())
            .ok_or(DecodeError::MissingField("user"))?;
        let channel_id = raw
            .channel_id
            .take()
            .ok_or(DecodeError::MissingField("channel_id"))?;

        Ok(Self {
            id: std::mem::take(&mut raw.id),
            application_id: std::mem::take(&mut raw.application_id),
            token: std::mem::take(&mut raw.token),
            channel_id,
            guild_id: raw.guild_id.take(),
            user,
            member: raw.member.take(),
            locale: raw.locale.take(),
            guild_locale: raw.guild_locale.take(),
        })
    }
}

impl CommandInteraction {
    fn from_raw(mut raw: Interaction) -> Result<Self, DecodeError> {
        let data = raw.data.take().ok_or(DecodeError::MissingField("data"))?;
        let name = data.name.ok_or(DecodeError::MissingField("data.name"))?;
        let meta = InteractionMeta::from_raw(&mut raw)?;

        Ok(Self {
            meta,
            command_id: data.id,
            name,
            kind: data.kind.unwrap_or(ApplicationCommandType::ChatInput),
            options: data.options,
            resolved: data.resolved,
            target_id: data.target_id,
        })
    }

    /// The option currently being typed, for autocomplete requests.
    pub fn focused_option(&self) -> Option<&CommandDataOption> {
        fn find(options: &[CommandDataOption]) -> Option<&CommandDataOption> {
            options
                .iter()
                .find_map(|o| if o.focused { Some(o) } else { find(&o.options) })
        }
        find(&self.options)
    }
}

impl ComponentInteraction {
    fn from_raw(mut raw: Interaction) -> Result<Self, DecodeError> {
        let data = raw.data.take().ok_or(DecodeError::MissingField("data"))?;
        let custom_id = data
            .custom_id
            .ok_or(DecodeError::MissingField("data.custom_id"))?;
        let component_type = data
            .component_type
            .ok_or(DecodeError::MissingField("data.component_type"))?;
        let message = raw
            .message
            .take()
            .ok_or(DecodeError::MissingField("message"))?;
        let meta = InteractionMeta::from_raw(&mut raw)?;

        Ok(Self {
            meta,
            custom_id,
            component_type,
            values: data.values,
            message,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
