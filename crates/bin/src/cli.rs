//! CLI argument definitions for the sharedstate binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use sharedstate::{config::EchoPolicy, constants::DEFAULT_OBJECT_NAME};

/// Whether a writer also receives the broadcast of its own write
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Echo {
    /// Broadcast to every subscriber, including the writer (default)
    IncludeOrigin,
    /// Broadcast to every subscriber except the writer
    ExcludeOrigin,
}

impl From<Echo> for EchoPolicy {
    fn from(echo: Echo) -> Self {
        match echo {
            Echo::IncludeOrigin => EchoPolicy::IncludeOrigin,
            Echo::ExcludeOrigin => EchoPolicy::ExcludeOrigin,
        }
    }
}

/// Server-authoritative shared state, replicated to subscribers by path
#[derive(Parser, Debug)]
#[command(name = "sharedstate")]
#[command(about = "sharedstate: server-authoritative shared state replicated by path")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the sharedstate server
    Serve(ServeArgs),
    /// Check health of a running server
    Health(HealthArgs),
    /// List the objects a running server holds
    Objects(ObjectsArgs),
    /// Print an object's data (or the value at a path)
    Get(GetArgs),
    /// Write a JSON value at a path
    Set(SetArgs),
    /// Follow an object and print every change
    Watch(WatchArgs),
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Port for the state protocol
    #[arg(short, long, default_value_t = 7070, env = "SHAREDSTATE_PORT")]
    pub port: u16,

    /// Port for the HTTP status endpoints
    #[arg(long, default_value_t = 7071, env = "SHAREDSTATE_HTTP_PORT")]
    pub http_port: u16,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "SHAREDSTATE_HOST")]
    pub host: String,

    /// Echo policy; overrides the config file
    #[arg(long, env = "SHAREDSTATE_ECHO")]
    pub echo: Option<Echo>,

    /// JSON registry configuration file
    #[arg(short, long, env = "SHAREDSTATE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Arguments for the health command
#[derive(clap::Args, Debug)]
pub struct HealthArgs {
    /// Base URL of the server's HTTP endpoints
    #[arg(long, default_value = "http://127.0.0.1:7071", env = "SHAREDSTATE_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,
}

/// Arguments for the objects command
#[derive(clap::Args, Debug)]
pub struct ObjectsArgs {
    /// Base URL of the server's HTTP endpoints
    #[arg(long, default_value = "http://127.0.0.1:7071", env = "SHAREDSTATE_URL")]
    pub url: String,

    /// Timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    pub timeout: u64,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

/// Connection options shared by the client commands
#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Server host
    #[arg(long, default_value = "127.0.0.1", env = "SHAREDSTATE_HOST")]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = 7070, env = "SHAREDSTATE_PORT")]
    pub port: u16,
}

impl ServerArgs {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Arguments for the get command
#[derive(clap::Args, Debug)]
pub struct GetArgs {
    /// Object name
    #[arg(default_value = DEFAULT_OBJECT_NAME)]
    pub name: String,

    /// Dotted path inside the object; omit for the whole object
    pub path: Option<String>,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments for the set command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Object name
    pub name: String,

    /// Dotted path inside the object; use "" to replace the whole object
    pub path: String,

    /// Value as JSON; anything that does not parse is stored as a string
    pub value: String,

    #[command(flatten)]
    pub server: ServerArgs,
}

/// Arguments for the watch command
#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Object name
    #[arg(default_value = DEFAULT_OBJECT_NAME)]
    pub name: String,

    /// Create the object if it does not exist
    #[arg(long)]
    pub create: bool,

    #[command(flatten)]
    pub server: ServerArgs,
}
