//! Story Context - bounded narrative context engine
//!
//! Serves per-story transcripts and segment search over HTTP.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use story_context::{
    api::{build_app, AppState},
    config::{ContextConfig, StorageConfig},
    context,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "story-context")]
#[command(version)]
#[command(about = "Bounded narrative context engine")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "STORY_CONTEXT_CONFIG")]
    config: Option<PathBuf>,

    /// Vector database URL (overrides the configuration file)
    #[arg(long, env = "VECTOR_DB_URL")]
    vector_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Check the vector backend and storage
    Doctor,

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.json);

    let mut config = match &cli.config {
        Some(path) => ContextConfig::from_file(path)?,
        None => ContextConfig::default(),
    };
    if let Some(url) = cli.vector_url {
        config.vector.url = Some(url);
    }

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            run_server(config).await?;
        }
        Commands::Doctor => {
            run_doctor(config).await?;
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("story_context={},tower_http=info", log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run_server(config: ContextConfig) -> Result<()> {
    tracing::info!("Starting story context service");

    let (service, backend) = context::bootstrap(&config).await?;
    tracing::info!("Vector backend: {}", backend.state());

    let app = build_app(AppState { service, backend }, &config.server.cors_origins);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}. Press Ctrl+C to stop.", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        })
        .await?;

    Ok(())
}

async fn run_doctor(config: ContextConfig) -> Result<()> {
    println!("Story Context Doctor");
    println!();

    println!("Checking configuration...");
    match config.validate() {
        Ok(()) => println!("  ✓ Configuration valid"),
        Err(e) => println!("  ✗ {}", e),
    }

    println!();
    println!("Checking vector backend...");
    if config.vector.remote_configured() {
        let backend = context::BackendHealthController::from_config(
            &config.vector,
            std::sync::Arc::new(context::FallbackStore::new()),
        );
        backend.initialize().await;
        if backend.is_healthy() {
            println!(
                "  ✓ Collection {} reachable at {}",
                config.vector.collection,
                config.vector.url.as_deref().unwrap_or_default()
            );
        } else {
            println!("  ✗ Backend unreachable (in-memory fallback would be used)");
        }
    } else {
        println!("  ℹ No vector backend configured (in-memory fallback)");
    }

    println!();
    println!("Checking storage...");
    match &config.storage.data_dir {
        Some(dir) if dir.exists() => println!("  ✓ Transcript directory: {}", dir.display()),
        Some(dir) => println!("  ℹ Transcript directory will be created: {}", dir.display()),
        None => println!(
            "  ℹ Transcripts kept in memory (suggested directory: {})",
            StorageConfig::default_dir().display()
        ),
    }

    println!();
    println!("Doctor check complete!");

    Ok(())
}

fn show_config(config: Option<&ContextConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}
