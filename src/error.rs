//! Errors surfaced by the interaction engine.
//!
//! Transport-level failures live next to their producers (`HttpError` in
//! [`crate::http`], `DecodeError` in [`crate::events`], ...). This module
//! holds the two taxonomies everything else funnels into: what a handler sees
//! when it drives an [`InteractionContext`](crate::context::InteractionContext),
//! and what the router turns into an HTTP status.

use axum::http::StatusCode;
use thiserror::Error;

use crate::events::DecodeError;
use crate::http::HttpError;
use crate::options::OptionError;

/// Error type returned by command, component and middleware handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias for handler functions.
pub type HandlerResult = Result<(), HandlerError>;

/// Failure of an operation on an interaction context.
#[derive(Debug, Error)]
pub enum InteractionError {
    /// The 15-minute response window has passed; nothing was sent.
    #[error("interaction already expired")]
    Expired,

    /// The operation is not valid in the current response state. These are
    /// programmer errors in handler code.
    #[error("invalid interaction state: {0}")]
    InvalidState(&'static str),

    /// The platform rejected an outbound REST call.
    #[error(transparent)]
    Rest(#[from] HttpError),

    /// The synchronous response slot was already torn down by the router.
    #[error("initial response channel closed")]
    ResponseClosed,
}

/// Reasons the router refuses a request before any handler runs.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid request signature")]
    Unauthorized,

    #[error("malformed interaction: {0}")]
    Decode(#[from] DecodeError),

    #[error("unknown command: /{0}")]
    UnknownCommand(String),

    #[error("invalid options for /{command}: {source}")]
    InvalidOptions {
        command: String,
        #[source]
        source: OptionError,
    },
}

impl RouteError {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteError::Unauthorized => StatusCode::UNAUTHORIZED,
            RouteError::Decode(_)
            | RouteError::UnknownCommand(_)
            | RouteError::InvalidOptions { .. } => StatusCode::BAD_REQUEST,
        }
    }
}
