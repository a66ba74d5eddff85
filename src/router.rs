//! Per-request interaction pipeline.
//!
//! verify → decode → branch on the event → (command) lookup, validate,
//! middleware, handler / (component) registry dispatch.
//!
//! Handlers run on their own task. The HTTP reply is whatever the handler
//! emits first on the synchronous response slot; if the slot is dropped
//! without a response the request completes with no interaction response
//! at all.

use std::sync::Arc;

use async_channel::Receiver;
use axum::http::{HeaderMap, StatusCode};
use tracing::{debug, error, trace, warn};

use crate::commands::CommandRegistry;
use crate::components::{ComponentRegistry, DispatchOutcome};
use crate::context::{CommandContext, ComponentContext, Services};
use crate::error::RouteError;
use crate::events::{CommandInteraction, ComponentInteraction, InteractionEvent};
use crate::middleware::MiddlewareChain;
use crate::types::*;
use crate::verify::SignatureVerifier;

/// How a request was answered.
#[derive(Debug)]
pub enum RouterReply {
    /// `200` with this body.
    Respond(InteractionResponse),
    /// Accepted, but nothing was emitted for it.
    NoResponse,
    Reject(RouteError),
}

impl RouterReply {
    pub fn status(&self) -> StatusCode {
        match self {
            RouterReply::Respond(_) => StatusCode::OK,
            RouterReply::NoResponse => StatusCode::NO_CONTENT,
            RouterReply::Reject(e) => e.status(),
        }
    }
}

struct Inner {
    verifier: SignatureVerifier,
    commands: CommandRegistry,
    middleware: MiddlewareChain,
    services: Services,
}

/// Frozen routing tables plus the services every context shares. Cheap to
/// clone.
#[derive(Clone)]
pub struct InteractionRouter {
    inner: Arc<Inner>,
}

impl InteractionRouter {
    pub fn new(
        verifier: SignatureVerifier,
        commands: CommandRegistry,
        middleware: MiddlewareChain,
        services: Services,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                verifier,
                commands,
                middleware,
                services,
            }),
        }
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.inner.commands
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.inner.services.components
    }

    pub fn services(&self) -> &Services {
        &self.inner.services
    }

    /// Handle one webhook request from its raw headers and body.
    pub async fn handle(&self, headers: &HeaderMap, body: &[u8]) -> RouterReply {
        match self.route(headers, body).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, status = %e.status(), "rejected interaction");
                RouterReply::Reject(e)
            }
        }
    }

    async fn route(&self, headers: &HeaderMap, body: &[u8]) -> Result<RouterReply, RouteError> {
        if !self.inner.verifier.verify_headers(headers, body) {
            return Err(RouteError::Unauthorized);
        }

        let event = InteractionEvent::decode(body)?;
        trace!(kind = event.kind_name(), "verified interaction");
        match event {
            InteractionEvent::Ping => Ok(RouterReply::Respond(InteractionResponse::pong())),
            InteractionEvent::Command(command) => self.route_command(command).await,
            InteractionEvent::Component(component) => Ok(self.route_component(component).await),
            InteractionEvent::Autocomplete(command) => {
                debug!(command = %command.name, "autocomplete is not handled");
                Ok(RouterReply::NoResponse)
            }
        }
    }

    async fn route_command(&self, command: CommandInteraction) -> Result<RouterReply, RouteError> {
        if command.kind != ApplicationCommandType::ChatInput {
            debug!(command = %command.name, kind = ?command.kind, "ignoring non chat-input command");
            return Ok(RouterReply::NoResponse);
        }

        let definition = self
            .inner
            .commands
            .lookup(&command.name)
            .ok_or_else(|| RouteError::UnknownCommand(command.name.clone()))?;
        let options = definition
            .validate(&command.options, command.resolved.as_ref())
            .map_err(|source| RouteError::InvalidOptions {
                command: command.name.clone(),
                source,
            })?;
        let handler = definition.handler();

        let (reply, slot) = async_channel::bounded(1);
        let ctx = CommandContext::new(command, options, self.inner.services.clone(), reply);
        let interaction_id = ctx.meta().id.clone();
        let name = ctx.name.clone();
        debug!(%interaction_id, command = %name, "dispatching command");

        let this = self.clone();
        tokio::spawn(async move {
            let Some(ctx) = this.inner.middleware.run(ctx).await else {
                return;
            };
            if let Err(e) = handler(ctx).await {
                error!(%interaction_id, command = %name, error = %e, "command handler failed");
            }
        });

        Ok(first_response(slot).await)
    }

    async fn route_component(&self, component: ComponentInteraction) -> RouterReply {
        let (message_id, custom_id) = component.key();
        debug!(%message_id, %custom_id, "dispatching component");
        let (reply, slot) = async_channel::bounded(1);
        let ctx = ComponentContext::new(component, self.inner.services.clone(), reply);
        let interaction_id = ctx.meta().id.clone();
        let custom_id = ctx.custom_id.clone();
        let registry = self.inner.services.components.clone();

        tokio::spawn(async move {
            match registry.dispatch(ctx).await {
                DispatchOutcome::Handled(Err(e)) => {
                    error!(%interaction_id, %custom_id, error = %e, "component handler failed");
                }
                DispatchOutcome::Expired => {
                    debug!(%interaction_id, %custom_id, "component activation after expiry");
                }
                DispatchOutcome::Handled(Ok(())) | DispatchOutcome::Missing => {}
            }
        });

        first_response(slot).await
    }
}

/// Wait for the handler's synchronous response, or for it to give up the
/// slot without one.
async fn first_response(slot: Receiver<InteractionResponse>) -> RouterReply {
    match slot.recv().await {
        Ok(response) => RouterReply::Respond(response),
        Err(_) => RouterReply::NoResponse,
    }
}

impl std::fmt::Debug for InteractionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionRouter")
            .field("commands", &self.inner.commands.len())
            .field("middleware", &self.inner.middleware)
            .field("components", &self.inner.services.components)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
