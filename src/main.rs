//! Interaction webhook server.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use hello_interactions::bot::{Client, ClientError};
use hello_interactions::config::Config;
use hello_interactions::handlers;

#[derive(Parser)]
#[command(name = "hello-interactions")]
#[command(about = "Discord interaction webhook server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the webhook endpoint (default)
    Serve,
    /// Overwrite the registered commands, then exit
    Push {
        /// Register in this guild instead of globally
        guild_id: Option<String>,
    },
    /// Remove every registered command, then exit
    Clear {
        /// Clear this guild instead of the global set
        guild_id: Option<String>,
    },
}

async fn run(command: Commands) -> Result<(), ClientError> {
    let config = Config::from_env()?;
    let mut client = Client::new(config);
    for definition in handlers::commands() {
        client.command(definition)?;
    }
    client.middleware(handlers::attach_locale);

    match command {
        Commands::Serve => client.listen().await,
        Commands::Push { guild_id } => {
            let registered = client.overwrite_commands(guild_id.as_deref()).await?;
            info!(count = registered.len(), "commands pushed");
            Ok(())
        }
        Commands::Clear { guild_id } => Ok(client.clear_commands(guild_id.as_deref()).await?),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli.command.unwrap_or(Commands::Serve)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal");
            ExitCode::FAILURE
        }
    }
}
