//! Slash command definitions and the registry the router looks them up in.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_lite::future::Boxed;
use futures_lite::FutureExt;
use thiserror::Error;

use crate::context::CommandContext;
use crate::error::HandlerResult;
use crate::options::{self, OptionError, OptionSchema, ResolvedOptions};
use crate::types::*;

pub type CommandHandler = Arc<dyn Fn(CommandContext) -> Boxed<HandlerResult> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command /{0} is already registered")]
    DuplicateCommand(String),

    #[error("invalid command name {0:?}: expected 1-32 lowercase letters, digits, '-' or '_'")]
    InvalidName(String),
}

// ---------------------------------------------------------------------------
// CommandDefinition
// ---------------------------------------------------------------------------

/// A chat-input command: its registration metadata, option schema and
/// handler.
///
/// ```ignore
/// CommandDefinition::new("roll", "Roll a dice", |mut ctx| async move {
///     ctx.send("4", false).await?;
///     Ok(())
/// })
/// .option(OptionSchema::integer("sides", "Number of sides"))
/// ```
#[derive(Clone)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    pub options: Vec<OptionSchema>,
    pub name_localizations: LocalizationMap,
    pub description_localizations: LocalizationMap,
    pub dm_permission: bool,
    pub default_member_permissions: Option<String>,
    handler: CommandHandler,
}

impl CommandDefinition {
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            options: Vec::new(),
            name_localizations: LocalizationMap::new(),
            description_localizations: LocalizationMap::new(),
            dm_permission: true,
            default_member_permissions: None,
            handler: Arc::new(move |ctx: CommandContext| handler(ctx).boxed()),
        }
    }

    pub fn option(mut self, option: OptionSchema) -> Self {
        self.options.push(option);
        self
    }

    pub fn localize(
        mut self,
        locale: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let locale = locale.into();
        self.name_localizations.insert(locale.clone(), name.into());
        self.description_localizations
            .insert(locale, description.into());
        self
    }

    pub fn dm_permission(mut self, allowed: bool) -> Self {
        self.dm_permission = allowed;
        self
    }

    /// Permission bit set, as a decimal string, required to see the command.
    pub fn default_member_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.default_member_permissions = Some(permissions.into());
        self
    }

    /// Validate an invocation's options against this command's schema.
    pub fn validate(
        &self,
        provided: &[CommandDataOption],
        resolved: Option<&ResolvedData>,
    ) -> Result<ResolvedOptions, OptionError> {
        options::validate(&self.options, provided, resolved)
    }

    pub(crate) fn handler(&self) -> CommandHandler {
        Arc::clone(&self.handler)
    }

    /// Registration payload for the bulk-overwrite endpoint.
    pub fn to_registration(&self) -> ApplicationCommand {
        let non_empty = |map: &LocalizationMap| (!map.is_empty()).then(|| map.clone());
        ApplicationCommand {
            id: None,
            name: self.name.clone(),
            name_localizations: non_empty(&self.name_localizations),
            description: self.description.clone(),
            description_localizations: non_empty(&self.description_localizations),
            options: self.options.iter().map(OptionSchema::to_registration).collect(),
            dm_permission: self.dm_permission,
            default_member_permissions: self.default_member_permissions.clone(),
            kind: ApplicationCommandType::ChatInput,
        }
    }
}

impl std::fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("name", &self.name)
            .field("options", &self.options.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// CommandRegistry
// ---------------------------------------------------------------------------

/// Name → definition, in registration order.
#[derive(Debug, Default, Clone)]
pub struct CommandRegistry {
    commands: Vec<CommandDefinition>,
    by_name: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. Names must be unique and valid for the platform.
    pub fn register(&mut self, command: CommandDefinition) -> Result<(), RegistryError> {
        if !is_valid_name(&command.name) {
            return Err(RegistryError::InvalidName(command.name));
        }
        if self.by_name.contains_key(&command.name) {
            return Err(RegistryError::DuplicateCommand(command.name));
        }
        self.by_name.insert(command.name.clone(), self.commands.len());
        self.commands.push(command);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&CommandDefinition> {
        self.by_name.get(name).map(|&i| &self.commands[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDefinition> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Registration payloads for every command, in registration order.
    pub fn application_commands(&self) -> Vec<ApplicationCommand> {
        self.commands
            .iter()
            .map(CommandDefinition::to_registration)
            .collect()
    }
}

fn is_valid_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=32).contains(&len)
        && name
            .chars()
            .all(|c| (c.is_alphanumeric() && !c.is_uppercase()) || c == '-' || c == '_')
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::OptionKind;

    fn noop(name: &str) -> CommandDefinition {
        CommandDefinition::new(name, "does nothing", |_ctx| async { Ok(()) })
    }

    // -- register() --------------------------------------------------------

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("ping")).unwrap();
        assert_eq!(
            registry.register(noop("ping")),
            Err(RegistryError::DuplicateCommand("ping".into()))
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut registry = CommandRegistry::new();
        let long = "x".repeat(33);
        for name in ["", "Ping", "two words", long.as_str()] {
            assert!(
                matches!(registry.register(noop(name)), Err(RegistryError::InvalidName(_))),
                "{:?} accepted",
                name
            );
        }
        registry.register(noop("send-logo")).unwrap();
        registry.register(noop("über_cmd")).unwrap();
    }

    // -- lookup() ----------------------------------------------------------

    #[test]
    fn lookup_finds_by_exact_name() {
        let mut registry = CommandRegistry::new();
        registry.register(noop("ping")).unwrap();
        registry.register(noop("roll")).unwrap();
        assert_eq!(registry.lookup("roll").map(|c| c.name.as_str()), Some("roll"));
        assert!(registry.lookup("rol").is_none());
    }

    // -- application_commands() --------------------------------------------

    #[test]
    fn registration_payload_carries_metadata_in_order() {
        let mut registry = CommandRegistry::new();
        registry
            .register(
                noop("roll")
                    .option(OptionSchema::integer("sides", "Number of sides").min(2.0))
                    .localize("de", "wuerfeln", "Wirf einen Wuerfel")
                    .dm_permission(false)
                    .default_member_permissions("8"),
            )
            .unwrap();
        registry.register(noop("ping")).unwrap();

        let payload = registry.application_commands();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[0].name, "roll");
        assert_eq!(payload[1].name, "ping");

        let roll = serde_json::to_value(&payload[0]).unwrap();
        assert_eq!(roll["type"], 1);
        assert_eq!(roll["dm_permission"], false);
        assert_eq!(roll["default_member_permissions"], "8");
        assert_eq!(roll["name_localizations"]["de"], "wuerfeln");
        assert_eq!(roll["options"][0]["type"], 4);
        assert_eq!(roll["options"][0]["min_value"], 2.0);

        let ping = serde_json::to_value(&payload[1]).unwrap();
        assert!(ping.get("name_localizations").is_none());
        assert_eq!(ping["dm_permission"], true);
    }

    #[test]
    fn definitions_validate_with_their_schema() {
        let def = noop("roll").option(OptionSchema::new("sides", "s", OptionKind::Integer).required());
        assert_eq!(
            def.validate(&[], None),
            Err(OptionError::Missing("sides".into()))
        );
    }
}
