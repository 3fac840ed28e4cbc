mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // `serve` initializes tracing itself from the daemon config; the client
    // commands get a plain env-filter subscriber.
    if !matches!(cli.command, Command::Serve { .. }) {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .init();
    }

    match cli.command {
        Command::Serve { config } => commands::serve(config).await,
        Command::Create { volume, block, hosts, mpath, size, auth, prealloc } => {
            commands::create(
                cli.server, cli.json, volume, block, hosts, mpath, size, auth, prealloc,
            )
            .await
        }
        Command::Delete { volume, block, keep_backing, force } => {
            commands::delete(cli.server, cli.json, volume, block, keep_backing, force).await
        }
        Command::Modify { volume, block, auth } => {
            commands::modify(cli.server, cli.json, volume, block, auth).await
        }
        Command::Replace { volume, block, old_node, new_node, force } => {
            commands::replace(cli.server, cli.json, volume, block, old_node, new_node, force)
                .await
        }
        Command::List { volume } => commands::list(cli.server, cli.json, volume).await,
        Command::Info { volume, block } => {
            commands::info(cli.server, cli.json, volume, block).await
        }
    }
}
