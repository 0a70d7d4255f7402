//! Research Agent - command-line entry point.
//!
//! `research-agent` (or `research-agent chat`) starts the terminal chat;
//! `research-agent serve` starts the browser UI.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use research_agent::{agent::Agent, api, config::Config, repl};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "research-agent", version, about = "Conversational research assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat in the terminal (default)
    Chat,

    /// Serve the browser chat UI
    Serve {
        /// Address to bind (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

fn init_logging(default_filter: &str) {
    // Logs go to stderr so they never interleave with chat output on stdout.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => {
            init_logging("research_agent=warn");
            let config = Config::from_env()?;
            info!("Loaded configuration: model={}", config.llm.model);

            let agent = Arc::new(Agent::from_config(&config)?);
            repl::run(agent).await?;
        }
        Command::Serve { host, port } => {
            init_logging("research_agent=info,tower_http=info");
            let mut config = Config::from_env()?;
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            info!("Loaded configuration: model={}", config.llm.model);

            api::serve(config).await?;
        }
    }

    Ok(())
}
