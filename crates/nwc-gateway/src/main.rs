//! Nostr Wallet Connect gateway.
//!
//! `nwc-gateway run` serves wallet requests from relays against the
//! configured Lightning node; `nwc-gateway app ...` manages the apps allowed
//! to connect.

mod apps;
mod config;
mod error;
mod gateway;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "nwc-gateway")]
#[command(about = "Nostr Wallet Connect gateway for a Lightning node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect to the node and relays and serve requests until Ctrl+C.
    Run,
    /// Manage connected apps.
    #[command(subcommand)]
    App(AppCommand),
}

#[derive(Debug, Subcommand)]
enum AppCommand {
    /// Register an app and print its connection URI.
    Add(AddApp),
    /// List registered apps.
    List,
    /// Stop serving an app.
    Disable {
        /// App public key (hex).
        #[arg(long)]
        pubkey: String,
    },
}

#[derive(Debug, Args)]
struct AddApp {
    #[arg(long)]
    name: String,

    /// Comma separated methods. Defaults to every supported method.
    #[arg(long, value_delimiter = ',')]
    scopes: Vec<String>,

    /// Give the app its own balance instead of the node's.
    #[arg(long)]
    isolated: bool,

    /// Spending cap for pay_invoice, in msat.
    #[arg(long)]
    budget_msat: Option<i64>,

    /// Budget period: daily, weekly, monthly, yearly or never.
    #[arg(long, default_value = "monthly")]
    renewal: String,

    /// Unix time after which the connection stops working.
    #[arg(long)]
    expires_at: Option<i64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run => gateway::run().await,
        Command::App(AppCommand::Add(args)) => {
            apps::add(apps::AddOptions {
                name: args.name,
                scopes: args.scopes,
                isolated: args.isolated,
                budget_msat: args.budget_msat,
                renewal: args.renewal,
                expires_at: args.expires_at,
            })
            .await
        }
        Command::App(AppCommand::List) => apps::list().await,
        Command::App(AppCommand::Disable { pubkey }) => apps::disable(&pubkey).await,
    }
}
