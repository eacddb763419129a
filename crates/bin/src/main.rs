use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The server logs its activity; client commands keep stdout for their output.
    let directive = match cli.command {
        Commands::Serve(_) => "sharedstate=info",
        _ => "sharedstate=warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Serve(args) => commands::serve::run(args).await,
        Commands::Health(args) => commands::health::run(args).await,
        Commands::Objects(args) => commands::objects::run(args).await,
        Commands::Get(args) => commands::client::get(args).await,
        Commands::Set(args) => commands::client::set(args).await,
        Commands::Watch(args) => commands::client::watch(args).await,
    }
}
