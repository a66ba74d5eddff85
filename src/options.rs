//! Command option schemas and runtime validation.
//!
//! A command declares its options as a list of [`OptionSchema`]s. When an
//! invocation arrives, [`validate`] checks the decoded options against that
//! list and produces a [`ResolvedOptions`] map of typed values. User, channel,
//! role and mentionable options are resolved against the `resolved` block of
//! the interaction so handlers receive full objects instead of bare ids.

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::types::*;

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    User,
    Channel,
    Role,
    Mentionable,
    Number,
}

impl OptionKind {
    pub fn wire_type(self) -> CommandOptionType {
        match self {
            OptionKind::String => CommandOptionType::String,
            OptionKind::Integer => CommandOptionType::Integer,
            OptionKind::Boolean => CommandOptionType::Boolean,
            OptionKind::User => CommandOptionType::User,
            OptionKind::Channel => CommandOptionType::Channel,
            OptionKind::Role => CommandOptionType::Role,
            OptionKind::Mentionable => CommandOptionType::Mentionable,
            OptionKind::Number => CommandOptionType::Number,
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, OptionKind::Integer | OptionKind::Number)
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OptionKind::String => "string",
            OptionKind::Integer => "integer",
            OptionKind::Boolean => "boolean",
            OptionKind::User => "user",
            OptionKind::Channel => "channel",
            OptionKind::Role => "role",
            OptionKind::Mentionable => "mentionable",
            OptionKind::Number => "number",
        };
        f.write_str(name)
    }
}

/// One declared option of a command.
///
/// ```ignore
/// OptionSchema::integer("sides", "Number of sides")
///     .min(2.0)
///     .max(1000.0)
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct OptionSchema {
    pub name: String,
    pub description: String,
    pub kind: OptionKind,
    pub required: bool,
    pub choices: Vec<ApplicationCommandOptionChoice>,
    /// Allowed channel types; empty allows any.
    pub channel_types: Vec<ChannelType>,
    /// Bounds for integer and number options.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

macro_rules! schema_constructors {
    ($($fn_name:ident => $kind:ident),* $(,)?) => {
        $(
            pub fn $fn_name(name: impl Into<String>, description: impl Into<String>) -> Self {
                Self::new(name, description, OptionKind::$kind)
            }
        )*
    };
}

impl OptionSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: OptionKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
            required: false,
            choices: Vec::new(),
            channel_types: Vec::new(),
            min: None,
            max: None,
        }
    }

    schema_constructors! {
        string => String,
        integer => Integer,
        boolean => Boolean,
        user => User,
        channel => Channel,
        role => Role,
        mentionable => Mentionable,
        number => Number,
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn choice(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.choices.push(ApplicationCommandOptionChoice {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn channel_types(mut self, types: impl IntoIterator<Item = ChannelType>) -> Self {
        self.channel_types = types.into_iter().collect();
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// Registration payload for this option.
    pub fn to_registration(&self) -> ApplicationCommandOption {
        let numeric = self.kind.is_numeric();
        ApplicationCommandOption {
            name: self.name.clone(),
            description: self.description.clone(),
            kind: self.kind.wire_type(),
            required: self.required,
            choices: self.choices.clone(),
            channel_types: if self.kind == OptionKind::Channel {
                self.channel_types.clone()
            } else {
                Vec::new()
            },
            min_value: self.min.filter(|_| numeric),
            max_value: self.max.filter(|_| numeric),
        }
    }
}

// ---------------------------------------------------------------------------
// Validated values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Number(f64),
    User(ResolvedUser),
    Channel(PartialChannel),
    Role(Role),
    Mentionable(Mentionable),
}

/// A user option. `member` is present only when invoked inside a guild.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUser {
    pub user: User,
    pub member: Option<PartialMember>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mentionable {
    User(ResolvedUser),
    Role(Role),
}

/// Option name → validated value for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOptions {
    values: HashMap<String, OptionValue>,
}

impl ResolvedOptions {
    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            OptionValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            OptionValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Number options, with integers widened.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            OptionValue::Number(n) => Some(*n),
            OptionValue::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            OptionValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn user(&self, name: &str) -> Option<&ResolvedUser> {
        match self.get(name)? {
            OptionValue::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn channel(&self, name: &str) -> Option<&PartialChannel> {
        match self.get(name)? {
            OptionValue::Channel(c) => Some(c),
            _ => None,
        }
    }

    pub fn role(&self, name: &str) -> Option<&Role> {
        match self.get(name)? {
            OptionValue::Role(r) => Some(r),
            _ => None,
        }
    }

    pub fn mentionable(&self, name: &str) -> Option<&Mentionable> {
        match self.get(name)? {
            OptionValue::Mentionable(m) => Some(m),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionError {
    #[error("missing required option `{0}`")]
    Missing(String),

    #[error("unknown option `{0}`")]
    Unknown(String),

    #[error("option `{name}` should be a {expected}")]
    WrongType { name: String, expected: OptionKind },

    #[error("option `{0}` is not one of the declared choices")]
    NotAChoice(String),

    #[error("option `{name}` is out of range: {value}")]
    OutOfRange { name: String, value: f64 },

    #[error("option `{name}` does not accept {kind:?} channels")]
    ChannelType { name: String, kind: ChannelType },

    #[error("option `{name}` refers to {id}, which is missing from resolved data")]
    Unresolved { name: String, id: String },
}

/// Check `options` against `schema`.
///
/// Every declared required option must be present, every provided option
/// must be declared, and each value must match its declared kind, choices,
/// bounds and channel types.
pub fn validate(
    schema: &[OptionSchema],
    options: &[CommandDataOption],
    resolved: Option<&ResolvedData>,
) -> Result<ResolvedOptions, OptionError> {
    let mut values = HashMap::with_capacity(options.len());

    for option in options {
        let decl = schema
            .iter()
            .find(|s| s.name == option.name)
            .ok_or_else(|| OptionError::Unknown(option.name.clone()))?;
        let value = validate_one(decl, option, resolved)?;
        values.insert(option.name.clone(), value);
    }

    if let Some(missing) = schema
        .iter()
        .find(|s| s.required && !values.contains_key(&s.name))
    {
        return Err(OptionError::Missing(missing.name.clone()));
    }

    Ok(ResolvedOptions { values })
}

fn validate_one(
    decl: &OptionSchema,
    option: &CommandDataOption,
    resolved: Option<&ResolvedData>,
) -> Result<OptionValue, OptionError> {
    let wrong_type = || OptionError::WrongType {
        name: decl.name.clone(),
        expected: decl.kind,
    };
    if option.kind != decl.kind.wire_type() {
        return Err(wrong_type());
    }
    let raw = option.value.as_ref().ok_or_else(wrong_type)?;

    if !decl.choices.is_empty() && !decl.choices.iter().any(|c| same_value(&c.value, raw)) {
        return Err(OptionError::NotAChoice(decl.name.clone()));
    }

    let value = match decl.kind {
        OptionKind::String => OptionValue::String(raw.as_str().ok_or_else(wrong_type)?.to_string()),
        OptionKind::Boolean => OptionValue::Boolean(raw.as_bool().ok_or_else(wrong_type)?),
        OptionKind::Integer => {
            let n = raw.as_i64().ok_or_else(wrong_type)?;
            check_range(decl, n as f64)?;
            OptionValue::Integer(n)
        }
        OptionKind::Number => {
            let n = raw.as_f64().ok_or_else(wrong_type)?;
            check_range(decl, n)?;
            OptionValue::Number(n)
        }
        OptionKind::User => {
            let id = raw.as_str().ok_or_else(wrong_type)?;
            OptionValue::User(resolve_user(decl, id, resolved)?)
        }
        OptionKind::Channel => {
            let id = raw.as_str().ok_or_else(wrong_type)?;
            let channel = resolved
                .and_then(|r| r.channels.get(id))
                .ok_or_else(|| unresolved(decl, id))?;
            if !decl.channel_types.is_empty() && !decl.channel_types.contains(&channel.kind) {
                return Err(OptionError::ChannelType {
                    name: decl.name.clone(),
                    kind: channel.kind,
                });
            }
            OptionValue::Channel(channel.clone())
        }
        OptionKind::Role => {
            let id = raw.as_str().ok_or_else(wrong_type)?;
            let role = resolved
                .and_then(|r| r.roles.get(id))
                .ok_or_else(|| unresolved(decl, id))?;
            OptionValue::Role(role.clone())
        }
        OptionKind::Mentionable => {
            let id = raw.as_str().ok_or_else(wrong_type)?;
            match resolved.and_then(|r| r.roles.get(id)) {
                Some(role) => OptionValue::Mentionable(Mentionable::Role(role.clone())),
                None => OptionValue::Mentionable(Mentionable::User(resolve_user(decl, id, resolved)?)),
            }
        }
    };
    Ok(value)
}

fn resolve_user(
    decl: &OptionSchema,
    id: &str,
    resolved: Option<&ResolvedData>,
) -> Result<ResolvedUser, OptionError> {
    let resolved = resolved.ok_or_else(|| unresolved(decl, id))?;
    let user = resolved.users.get(id).ok_or_else(|| unresolved(decl, id))?;
    Ok(ResolvedUser {
        user: user.clone(),
        member: resolved.members.get(id).cloned(),
    })
}

fn unresolved(decl: &OptionSchema, id: &str) -> OptionError {
    OptionError::Unresolved {
        name: decl.name.clone(),
        id: id.to_string(),
    }
}

fn check_range(decl: &OptionSchema, value: f64) -> Result<(), OptionError> {
    let below = decl.min.is_some_and(|min| value < min);
    let above = decl.max.is_some_and(|max| value > max);
    if below || above {
        return Err(OptionError::OutOfRange {
            name: decl.name.clone(),
            value,
        });
    }
    Ok(())
}

/// JSON equality that treats `1` and `1.0` as the same choice.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn opt(name: &str, kind: CommandOptionType, value: Value) -> CommandDataOption {
        CommandDataOption {
            name: name.to_string(),
            kind,
            value: Some(value),
            options: Vec::new(),
            focused: false,
        }
    }

    fn resolved() -> ResolvedData {
        serde_json::from_value(json!({
            "users": { "1": { "id": "1", "username": "alice" } },
            "members": { "1": { "nick": "al", "roles": [] } },
            "roles": { "9": { "id": "9", "name": "mods" } },
            "channels": { "7": { "id": "7", "type": 2, "name": "voice" } }
        }))
        .unwrap()
    }

    // -- validate(): scalars -----------------------------------------------

    #[test]
    fn scalars_validate_into_typed_values() {
        let schema = [
            OptionSchema::string("word", "w"),
            OptionSchema::integer("sides", "s").required(),
            OptionSchema::boolean("loud", "l"),
            OptionSchema::number("scale", "x"),
        ];
        let options = [
            opt("word", CommandOptionType::String, json!("hi")),
            opt("sides", CommandOptionType::Integer, json!(20)),
            opt("loud", CommandOptionType::Boolean, json!(true)),
            opt("scale", CommandOptionType::Number, json!(1.5)),
        ];
        let values = validate(&schema, &options, None).unwrap();
        assert_eq!(values.string("word"), Some("hi"));
        assert_eq!(values.integer("sides"), Some(20));
        assert_eq!(values.number("sides"), Some(20.0));
        assert_eq!(values.boolean("loud"), Some(true));
        assert_eq!(values.number("scale"), Some(1.5));
        assert_eq!(values.len(), 4);
    }

    #[test]
    fn optional_options_may_be_absent() {
        let schema = [OptionSchema::integer("sides", "s")];
        let values = validate(&schema, &[], None).unwrap();
        assert!(values.is_empty());
        assert_eq!(values.integer("sides"), None);
    }

    #[test]
    fn missing_required_option_is_rejected() {
        let schema = [OptionSchema::string("word", "w").required()];
        assert_eq!(
            validate(&schema, &[], None),
            Err(OptionError::Missing("word".into()))
        );
    }

    #[test]
    fn undeclared_option_is_rejected() {
        let options = [opt("extra", CommandOptionType::String, json!("x"))];
        assert_eq!(
            validate(&[], &options, None),
            Err(OptionError::Unknown("extra".into()))
        );
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let schema = [OptionSchema::integer("sides", "s")];
        let wrong_tag = [opt("sides", CommandOptionType::String, json!("6"))];
        let wrong_value = [opt("sides", CommandOptionType::Integer, json!("6"))];
        for options in [&wrong_tag, &wrong_value] {
            assert!(matches!(
                validate(&schema, options, None),
                Err(OptionError::WrongType { expected: OptionKind::Integer, .. })
            ));
        }
    }

    #[test]
    fn bounds_apply_to_numbers() {
        let schema = [OptionSchema::integer("sides", "s").min(2.0).max(100.0)];
        let low = [opt("sides", CommandOptionType::Integer, json!(1))];
        let high = [opt("sides", CommandOptionType::Integer, json!(101))];
        let ok = [opt("sides", CommandOptionType::Integer, json!(100))];
        assert!(matches!(
            validate(&schema, &low, None),
            Err(OptionError::OutOfRange { .. })
        ));
        assert!(matches!(
            validate(&schema, &high, None),
            Err(OptionError::OutOfRange { .. })
        ));
        assert!(validate(&schema, &ok, None).is_ok());
    }

    #[test]
    fn choices_restrict_values() {
        let schema = [OptionSchema::integer("sides", "s").choice("d6", 6).choice("d20", 20)];
        let ok = [opt("sides", CommandOptionType::Integer, json!(20))];
        let bad = [opt("sides", CommandOptionType::Integer, json!(7))];
        assert_eq!(validate(&schema, &ok, None).unwrap().integer("sides"), Some(20));
        assert_eq!(
            validate(&schema, &bad, None),
            Err(OptionError::NotAChoice("sides".into()))
        );
    }

    // -- validate(): resolved entities -------------------------------------

    #[test]
    fn user_option_resolves_user_and_member() {
        let schema = [OptionSchema::user("who", "w")];
        let options = [opt("who", CommandOptionType::User, json!("1"))];
        let resolved = resolved();
        let values = validate(&schema, &options, Some(&resolved)).unwrap();
        let who = values.user("who").unwrap();
        assert_eq!(who.user.username, "alice");
        assert_eq!(who.member.as_ref().and_then(|m| m.nick.as_deref()), Some("al"));
    }

    #[test]
    fn unresolvable_ids_are_rejected() {
        let schema = [OptionSchema::role("role", "r")];
        let options = [opt("role", CommandOptionType::Role, json!("404"))];
        assert!(matches!(
            validate(&schema, &options, Some(&resolved())),
            Err(OptionError::Unresolved { .. })
        ));
        assert!(matches!(
            validate(&schema, &options, None),
            Err(OptionError::Unresolved { .. })
        ));
    }

    #[test]
    fn channel_types_are_enforced() {
        let resolved = resolved();
        let options = [opt("where", CommandOptionType::Channel, json!("7"))];

        let text_only = [OptionSchema::channel("where", "c").channel_types([ChannelType::GuildText])];
        assert!(matches!(
            validate(&text_only, &options, Some(&resolved)),
            Err(OptionError::ChannelType { kind: ChannelType::GuildVoice, .. })
        ));

        let any = [OptionSchema::channel("where", "c")];
        let values = validate(&any, &options, Some(&resolved)).unwrap();
        assert_eq!(values.channel("where").and_then(|c| c.name.as_deref()), Some("voice"));
    }

    #[test]
    fn mentionable_prefers_roles_then_users() {
        let schema = [OptionSchema::mentionable("m", "m")];
        let resolved = resolved();

        let role = [opt("m", CommandOptionType::Mentionable, json!("9"))];
        assert!(matches!(
            validate(&schema, &role, Some(&resolved)).unwrap().mentionable("m"),
            Some(Mentionable::Role(_))
        ));

        let user = [opt("m", CommandOptionType::Mentionable, json!("1"))];
        assert!(matches!(
            validate(&schema, &user, Some(&resolved)).unwrap().mentionable("m"),
            Some(Mentionable::User(_))
        ));
    }

    // -- to_registration() -------------------------------------------------

    #[test]
    fn registration_drops_bounds_on_non_numeric_kinds() {
        let reg = OptionSchema::string("word", "w").min(1.0).required().to_registration();
        assert_eq!(reg.kind, CommandOptionType::String);
        assert!(reg.required);
        assert_eq!(reg.min_value, None);

        let reg = OptionSchema::integer("n", "n").min(1.0).max(6.0).to_registration();
        assert_eq!((reg.min_value, reg.max_value), (Some(1.0), Some(6.0)));
    }
}
