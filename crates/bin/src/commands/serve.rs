//! Serve command - runs the state protocol server and the HTTP status endpoints.

use axum::{Router, extract::State, routing::get};
use serde::Serialize;
use sharedstate::{Registry, config::RegistryConfig, registry::ObjectStatus, transport::tcp::TcpServer};
use tokio::signal::unix::{SignalKind, signal};

use crate::cli::ServeArgs;

/// Run the sharedstate server
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading registry configuration from {}", path.display());
            RegistryConfig::from_json_file(path)?
        }
        None => RegistryConfig::default(),
    };
    if let Some(echo) = args.echo {
        config = config.with_echo(echo.into());
    }
    tracing::info!(echo = ?config.echo, "Starting registry");

    let registry = Registry::new(config);

    let mut server = TcpServer::new(registry.clone());
    server
        .start(&format!("{}:{}", args.host, args.port))
        .await?;
    let state_address = server.address()?;

    let app = Router::new()
        .route("/health", get(handle_health_endpoint))
        .route("/objects", get(handle_objects_endpoint))
        .with_state(registry.clone());

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", args.host, args.http_port)).await?;
    let http_address = listener.local_addr()?;

    println!("sharedstate server starting");
    println!("  State protocol: tcp://{state_address}");
    println!("  HTTP endpoints: http://{http_address}");
    println!();
    println!("Available endpoints:");
    println!("  GET  /health       - Health check");
    println!("  GET  /objects      - Registered objects and subscriber counts");
    println!();
    println!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let mut sigterm =
                signal(SignalKind::terminate()).expect("failed to set up SIGTERM handler");
            let mut sigint =
                signal(SignalKind::interrupt()).expect("failed to set up SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
                _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
            }
        })
        .await?;

    server.stop()?;
    tracing::info!(
        objects = registry.object_count(),
        connections = registry.connection_count(),
        "Server stopped"
    );
    println!("Server shut down");
    Ok(())
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    objects: usize,
    connections: usize,
}

/// Handler for GET /health - Health check endpoint
async fn handle_health_endpoint(State(registry): State<Registry>) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "healthy",
        objects: registry.object_count(),
        connections: registry.connection_count(),
    })
}

/// Handler for GET /objects - Registered objects
async fn handle_objects_endpoint(State(registry): State<Registry>) -> axum::Json<Vec<ObjectStatus>> {
    axum::Json(registry.status())
}
