//! Webhook runtime for Discord interactions.
//!
//! Requests flow through [`router::InteractionRouter`]: signature check,
//! decode, then either a slash command (option validation, middleware,
//! handler) or a message component looked up in the router's
//! [`components::ComponentRegistry`]. Handlers drive the reply through a
//! [`context::InteractionContext`], which enforces the
//! respond/defer/edit/follow-up rules and the 15-minute token lifetime.
//!
//! [`bot::Client`] is the setup surface; [`server`] mounts a router as an
//! axum service.

pub mod bot;
pub mod clock;
pub mod commands;
pub mod components;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handlers;
pub mod http;
pub mod middleware;
pub mod options;
pub mod router;
pub mod server;
pub mod types;
pub mod verify;

pub use bot::Client;
pub use commands::{CommandDefinition, CommandRegistry};
pub use components::component_handler;
pub use config::Config;
pub use context::{CommandContext, ComponentContext, ComponentOptions, InteractionContext};
pub use error::{HandlerError, HandlerResult, InteractionError};
pub use middleware::Next;
pub use options::OptionSchema;
pub use router::InteractionRouter;
