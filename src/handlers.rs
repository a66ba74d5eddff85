//! Demo commands served by the binary.
//!
//! Each command is an async fn over a [`CommandContext`]; [`commands`]
//! bundles them with their option schemas. Small formatting helpers live at
//! the bottom so they can be tested without a context.

use rand::Rng;
use tracing::info;

use crate::commands::CommandDefinition;
use crate::components::component_handler;
use crate::context::{CommandContext, ComponentContext};
use crate::error::HandlerResult;
use crate::middleware::Next;
use crate::options::OptionSchema;
use crate::types::*;

const DEFAULT_SIDES: i64 = 6;
const REROLL_ID: &str = "reroll";
const LANGUAGE_SELECT_ID: &str = "language_select";

// ---------------------------------------------------------------------------
// Command set
// ---------------------------------------------------------------------------

/// Every demo command, in the order they are registered.
pub fn commands() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new("ping", "Check the bot is alive", ping),
        CommandDefinition::new("roll", "Roll a dice", roll).option(
            OptionSchema::integer("sides", "Number of sides (default: 6)")
                .min(2.0)
                .max(1000.0),
        ),
        CommandDefinition::new("serverinfo", "Show server information", serverinfo)
            .dm_permission(false),
        CommandDefinition::new("whoami", "Show info about yourself", whoami),
        CommandDefinition::new("languages", "Pick your favourite language", languages),
        CommandDefinition::new("help", "Show available commands", help),
    ]
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Locale the invoking user sees the bot in. Attached by [`attach_locale`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale(pub String);

/// Middleware: record the interaction's locale for later steps and handlers.
pub async fn attach_locale(mut ctx: CommandContext) -> Next {
    let locale = Locale(ctx.locale().unwrap_or("en-US").to_string());
    ctx.extensions_mut().insert(locale);
    Next::Continue(ctx)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Defers, looks up the guild over REST, then fills in the deferred reply.
async fn ping(mut ctx: CommandContext) -> HandlerResult {
    ctx.defer(false).await?;
    let text = match ctx.guild().await? {
        Some(guild) => format!("🏓 Pong from **{}**!", guild.name),
        None => "🏓 Pong!".to_string(),
    };
    ctx.send(text, false).await?;
    Ok(())
}

async fn roll(mut ctx: CommandContext) -> HandlerResult {
    let sides = ctx
        .options
        .integer("sides")
        .unwrap_or(DEFAULT_SIDES)
        .clamp(2, 1000) as u32;

    ctx.send(roll_message(sides), false).await?;
    ctx.register_component(
        REROLL_ID,
        component_handler(move |mut ctx: ComponentContext| async move {
            ctx.edit_parent(roll_message(sides)).await?;
            Ok(())
        }),
    )
    .await?;
    Ok(())
}

async fn serverinfo(mut ctx: CommandContext) -> HandlerResult {
    let text = match ctx.guild().await? {
        Some(guild) => format_guild_info(&guild),
        None => "❌ This command only works in a server.".to_string(),
    };
    ctx.send(text, false).await?;
    Ok(())
}

async fn whoami(mut ctx: CommandContext) -> HandlerResult {
    let locale = ctx
        .extension::<Locale>()
        .map(|l| l.0.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let text = format!("{}\n• **Locale:** {}", format_whoami(ctx.user()), locale);
    ctx.send(text, true).await?;
    Ok(())
}

async fn languages(mut ctx: CommandContext) -> HandlerResult {
    let body = MessageBody::new()
        .content("Please select your favourite programming language:")
        .component_row(action_row(vec![string_select(
            LANGUAGE_SELECT_ID,
            "Choose a language...",
            language_options(),
        )]));
    ctx.send(body, false).await?;
    ctx.register_component(
        LANGUAGE_SELECT_ID,
        component_handler(|mut ctx: ComponentContext| async move {
            info!(values = ?ctx.values, "language picked");
            let text = format!("You selected: **{}**", ctx.values.join(", "));
            ctx.send(text, true).await?;
            Ok(())
        }),
    )
    .await?;
    Ok(())
}

async fn help(mut ctx: CommandContext) -> HandlerResult {
    ctx.send(help_text(), true).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

fn roll_message(sides: u32) -> MessageBody {
    let result = rand::thread_rng().gen_range(1..=sides);
    MessageBody::new()
        .content(format!("🎲 Rolling a d{}... **{}**!", sides, result))
        .component_row(action_row(vec![button(
            ButtonStyle::Primary,
            "🎲 Reroll",
            REROLL_ID,
        )]))
}

fn language_options() -> Vec<SelectOption> {
    [
        ("Rust", "rust", "Fast, safe, and concurrent"),
        ("Python", "python", "Simple and versatile"),
        ("TypeScript", "typescript", "Typed JavaScript"),
        ("Go", "go", "Simple and efficient"),
    ]
    .into_iter()
    .map(|(label, value, description)| SelectOption {
        label: label.to_string(),
        value: value.to_string(),
        description: Some(description.to_string()),
        default: false,
    })
    .collect()
}

fn format_guild_info(guild: &Guild) -> String {
    let member_count = guild
        .approximate_member_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let online_count = guild
        .approximate_presence_count
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let owner = guild
        .owner_id
        .as_ref()
        .map(|id| format!("<@{}>", id))
        .unwrap_or_else(|| "unknown".to_string());
    let created_at = guild
        .created_at_ms()
        .and_then(|ms| chrono::DateTime::from_timestamp_millis(ms as i64))
        .map(|dt| dt.format("%B %d, %Y").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    format!(
        "🏰 **Server Info: {}**\n\
         • **Members:** {} ({} online)\n\
         • **Owner:** {}\n\
         • **Created:** {}",
        guild.name, member_count, online_count, owner, created_at
    )
}

fn format_whoami(user: &User) -> String {
    let avatar_url = user
        .avatar_url()
        .unwrap_or_else(|| "No avatar set".to_string());
    format!(
        "👤 **About You:**\n\
         • **Username:** {}\n\
         • **User ID:** {}\n\
         • **Avatar:** {}",
        user.tag(),
        user.id,
        avatar_url
    )
}

fn help_text() -> String {
    "🤖 **Available Commands:**\n\
     • `/ping` — Check the bot is alive\n\
     • `/roll [sides]` — Roll a dice (default: 6 sides), with a reroll button\n\
     • `/serverinfo` — Show server information\n\
     • `/whoami` — Show info about yourself\n\
     • `/languages` — Demo the select menu component\n\
     • `/help` — Show this help message"
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandRegistry;
    use crate::components::DispatchOutcome;
    use crate::context::testing::Harness;
    use crate::http::fake::RestCall;
    use crate::middleware::MiddlewareChain;

    fn guild(json: serde_json::Value) -> Guild {
        serde_json::from_value(json).expect("valid guild JSON")
    }

    // -- commands() --------------------------------------------------------

    #[test]
    fn demo_commands_register_cleanly() {
        let mut registry = CommandRegistry::new();
        for def in commands() {
            registry.register(def).unwrap();
        }
        assert_eq!(registry.len(), 6);
        let roll = registry.lookup("roll").unwrap().to_registration();
        assert_eq!(roll.options.len(), 1);
        assert!(!roll.options[0].required);
    }

    // -- attach_locale() ---------------------------------------------------

    #[tokio::test]
    async fn locale_middleware_attaches_the_user_locale() {
        let h = Harness::new();
        let (ctx, _rx) = h.command("whoami");
        let mut chain = MiddlewareChain::new();
        chain.push(attach_locale);
        let ctx = chain.run(ctx).await.unwrap();
        assert_eq!(ctx.extension::<Locale>(), Some(&Locale("en-US".into())));
    }

    // -- ping() ------------------------------------------------------------

    #[tokio::test]
    async fn ping_defers_then_edits_in_the_guild_name() {
        let h = Harness::new();
        let (ctx, rx) = h.command("ping");
        ping(ctx).await.unwrap();

        let initial = rx.try_recv().unwrap();
        assert_eq!(initial.kind, InteractionCallbackType::DeferredChannelMessageWithSource);

        let calls = h.rest.calls();
        assert_eq!(calls[0], RestCall::GetGuild("guild-1".into()));
        let RestCall::Edit { message_id, body } = &calls[1] else {
            panic!("expected an edit, got {:?}", calls[1]);
        };
        assert_eq!(message_id, ORIGINAL_MESSAGE);
        assert!(body.content.as_deref().unwrap().contains("Test Guild"));
    }

    // -- roll() ------------------------------------------------------------

    #[tokio::test]
    async fn roll_registers_a_reroll_button_that_updates_in_place() {
        let h = Harness::new();
        let (ctx, rx) = h.command("roll");
        roll(ctx).await.unwrap();

        let initial = rx.try_recv().unwrap();
        let body = initial.data.unwrap();
        assert!(body.content.unwrap().starts_with("🎲 Rolling a d6"));
        assert!(h.services.components.contains("original-1", REROLL_ID));

        let (click, rx) = h.component("original-1", REROLL_ID);
        let outcome = h.services.components.dispatch(click).await;
        assert!(matches!(outcome, DispatchOutcome::Handled(Ok(()))));
        let update = rx.try_recv().unwrap();
        assert_eq!(update.kind, InteractionCallbackType::UpdateMessage);
        assert!(update.data.unwrap().content.unwrap().contains("d6"));
    }

    #[test]
    fn roll_message_stays_in_range_and_carries_the_button() {
        for _ in 0..50 {
            let body = roll_message(3);
            let content = body.content.unwrap();
            assert!(
                ["**1**", "**2**", "**3**"].iter().any(|r| content.contains(r)),
                "out of range: {}",
                content
            );
            let row = &body.components.unwrap()[0];
            assert_eq!(row.components[0].custom_id.as_deref(), Some(REROLL_ID));
        }
    }

    // -- whoami() / help() -------------------------------------------------

    #[tokio::test]
    async fn whoami_is_ephemeral() {
        let h = Harness::new();
        let (ctx, rx) = h.command("whoami");
        whoami(ctx).await.unwrap();
        let body = rx.try_recv().unwrap().data.unwrap();
        assert!(body.flags.unwrap().contains(MessageFlags::EPHEMERAL));
        assert!(body.content.unwrap().contains("alice"));
    }

    // -- languages() -------------------------------------------------------

    #[tokio::test]
    async fn language_pick_answers_ephemerally() {
        let h = Harness::new();
        let (ctx, _rx) = h.command("languages");
        languages(ctx).await.unwrap();

        let (mut pick, rx) = h.component("original-1", LANGUAGE_SELECT_ID);
        pick.values = vec!["rust".into()];
        assert!(matches!(
            h.services.components.dispatch(pick).await,
            DispatchOutcome::Handled(Ok(()))
        ));
        let body = rx.try_recv().unwrap().data.unwrap();
        assert_eq!(body.content.as_deref(), Some("You selected: **rust**"));
        assert!(body.flags.unwrap().contains(MessageFlags::EPHEMERAL));
    }

    // -- format_guild_info() -----------------------------------------------

    #[test]
    fn format_guild_info_includes_guild_name() {
        let guild = guild(serde_json::json!({
            "id": "123",
            "name": "Test Server",
            "icon": null,
            "owner_id": "456",
            "approximate_member_count": 42,
            "approximate_presence_count": 10,
        }));
        let text = format_guild_info(&guild);
        assert!(text.contains("Test Server"), "missing guild name");
        assert!(text.contains("42"), "missing member count");
        assert!(text.contains("10"), "missing online count");
        assert!(text.contains("<@456>"), "missing owner mention");
    }

    #[test]
    fn format_guild_info_handles_missing_counts() {
        let guild = guild(serde_json::json!({ "id": "1", "name": "Empty" }));
        let text = format_guild_info(&guild);
        assert!(
            text.contains("unknown"),
            "missing 'unknown' for absent counts"
        );
    }

    // -- format_whoami() ---------------------------------------------------

    #[test]
    fn format_whoami_includes_username_and_id() {
        let user: User = serde_json::from_value(serde_json::json!({
            "id": "789",
            "username": "alice",
            "discriminator": "0001",
            "avatar": null,
            "bot": false,
            "global_name": null,
        }))
        .expect("valid user JSON");
        let text = format_whoami(&user);
        assert!(text.contains("alice#0001"), "missing username");
        assert!(text.contains("789"), "missing user id");
    }

    // -- help_text() -------------------------------------------------------

    #[test]
    fn help_text_mentions_all_slash_commands() {
        let text = help_text();
        for name in commands().iter().map(|c| c.name.as_str()) {
            assert!(
                text.contains(&format!("/{}", name)),
                "help text missing /{}",
                name
            );
        }
    }
}
