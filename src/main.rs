use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mindful_sync::{
    backend::{Credentials, MemoryBackend, RemoteCollection, RestBackend},
    cli::{execute_command, Command},
    config::{Config, LogFormat},
    functions::FunctionsClient,
    persist::{KeyValueStore, MemoryKv, SqliteKv},
    AppState,
};

/// Offline-first client for mood, therapy and meditation data
#[derive(Parser, Debug)]
#[command(name = "mindful-sync", version)]
struct Cli {
    /// Use an unreachable backend and in-memory cache to inspect demo data
    #[arg(long, global = true)]
    demo: bool,

    /// Signed-in user id (defaults to MINDFUL_USER_ID)
    #[arg(long, global = true)]
    user: Option<String>,

    /// Access token for the user (defaults to MINDFUL_ACCESS_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(_) if cli.demo => Config::offline(),
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        demo = cli.demo,
        "mindful-sync starting"
    );

    let credentials = Credentials::new(config.backend.anon_key.clone());

    let (backend, kv): (Arc<dyn RemoteCollection>, Arc<dyn KeyValueStore>) = if cli.demo {
        (
            Arc::new(MemoryBackend::unreachable()),
            Arc::new(MemoryKv::new()),
        )
    } else {
        let backend =
            match RestBackend::new(&config.backend, credentials.clone(), config.request.clone()) {
                Ok(b) => {
                    info!(base_url = %config.backend.base_url, "Backend client initialized");
                    b
                }
                Err(e) => {
                    error!(error = %e, "Failed to initialize backend client");
                    return Err(e.into());
                }
            };

        let kv = match SqliteKv::new(&config.cache).await {
            Ok(kv) => {
                info!(path = %config.cache.path.display(), "Snapshot cache initialized");
                kv
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize snapshot cache");
                return Err(e.into());
            }
        };

        (Arc::new(backend), Arc::new(kv))
    };

    let functions = FunctionsClient::new(&config.backend, credentials.clone(), &config.request)?;

    let state = AppState::new(config, credentials, backend, kv).with_functions(functions);

    let user = cli.user.or_else(|| std::env::var("MINDFUL_USER_ID").ok());
    let token = cli
        .token
        .or_else(|| std::env::var("MINDFUL_ACCESS_TOKEN").ok());

    if let Some(user) = user {
        state.sign_in(user, token).await;
        let restored = state.restore_cached().await;
        info!(restored, "Snapshots restored");
    }

    let result = execute_command(cli.command, &state).await;
    println!("{}", serde_json::to_string_pretty(&result.output)?);

    if result.exit_code != 0 {
        std::process::exit(result.exit_code);
    }
    Ok(())
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
