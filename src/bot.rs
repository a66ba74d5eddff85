//! Setup surface: collect commands and middleware, then build a router or
//! serve it.
//!
//! [`Client`] owns everything that is mutable during setup. Building the
//! router freezes the command table and middleware chain behind an `Arc`;
//! the component registry is created fresh for each router.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::commands::{CommandDefinition, CommandRegistry, RegistryError};
use crate::config::{Config, ConfigError};
use crate::context::{CommandContext, Services};
use crate::http::{DiscordHttpClient, DiscordRest, HttpError};
use crate::middleware::{MiddlewareChain, Next};
use crate::router::InteractionRouter;
use crate::server;
use crate::types::*;
use crate::verify::SignatureVerifier;

/// How often `listen` evicts component registrations nobody activated.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct Client {
    config: Config,
    rest: Arc<dyn DiscordRest>,
    clock: Arc<dyn Clock>,
    commands: CommandRegistry,
    middleware: MiddlewareChain,
    sweep_interval: Option<Duration>,
}

impl Client {
    /// A client talking to the real REST API with the configured token.
    pub fn new(config: Config) -> Self {
        let rest = Arc::new(DiscordHttpClient::new(
            config.token.clone(),
            config.application_id.clone(),
        ));
        Self::with_rest(config, rest, Arc::new(SystemClock))
    }

    /// A client over any REST implementation and clock.
    pub fn with_rest(config: Config, rest: Arc<dyn DiscordRest>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            rest,
            clock,
            commands: CommandRegistry::new(),
            middleware: MiddlewareChain::new(),
            sweep_interval: Some(DEFAULT_SWEEP_INTERVAL),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    /// Register a command definition. Fails on a duplicate or invalid name.
    pub fn command(&mut self, definition: CommandDefinition) -> Result<&mut Self, RegistryError> {
        self.commands.register(definition)?;
        Ok(self)
    }

    /// Append a middleware step. Steps run in the order they were added.
    pub fn middleware<F, Fut>(&mut self, step: F) -> &mut Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Next> + Send + 'static,
    {
        self.middleware.push(step);
        self
    }

    /// Background sweep interval for expired components; `None` relies on
    /// lazy expiry alone.
    pub fn sweep_interval(&mut self, every: Option<Duration>) -> &mut Self {
        self.sweep_interval = every;
        self
    }

    /// Freeze the current commands and middleware into a router.
    pub fn router(&self) -> Result<InteractionRouter, ConfigError> {
        let verifier = SignatureVerifier::from_hex(&self.config.public_key)?;
        let services = Services::new(Arc::clone(&self.rest), Arc::clone(&self.clock));
        Ok(InteractionRouter::new(
            verifier,
            self.commands.clone(),
            self.middleware.clone(),
            services,
        ))
    }

    /// Replace the platform's command set (global, or one guild's) with
    /// the registered definitions.
    pub async fn overwrite_commands(
        &self,
        guild_id: Option<&str>,
    ) -> Result<Vec<ApplicationCommand>, HttpError> {
        let payload = self.commands.application_commands();
        let registered = self.rest.bulk_overwrite_commands(guild_id, &payload).await?;
        info!(
            count = registered.len(),
            guild_id = guild_id.unwrap_or("global"),
            "overwrote application commands"
        );
        Ok(registered)
    }

    /// Remove every command (global, or one guild's).
    pub async fn clear_commands(&self, guild_id: Option<&str>) -> Result<(), HttpError> {
        self.rest.bulk_overwrite_commands(guild_id, &[]).await?;
        info!(guild_id = guild_id.unwrap_or("global"), "cleared application commands");
        Ok(())
    }

    /// Overwrite global commands when configured to, then serve until
    /// ctrl-c.
    pub async fn listen(self) -> Result<(), ClientError> {
        let addr = self.config.socket_addr()?;
        let router = self.router()?;

        if self.config.clear_on_start {
            self.overwrite_commands(None).await?;
        } else if self.commands.is_empty() {
            warn!("no commands registered");
        }

        let sweeper = self
            .sweep_interval
            .map(|every| router.components().spawn_sweeper(every));

        let served = server::serve(router, addr).await;
        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        Ok(served?)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("commands", &self.commands.len())
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
