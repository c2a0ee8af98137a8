mod auth;
mod config;
mod constants;
mod error;
mod models;
mod routes;
mod transforms;

use auth::KeyRotator;
use axum::ServiceExt;
use clap::{Args, CommandFactory, Parser, Subcommand};
use config::Config;
use models::ModelRegistry;
use reqwest::Client;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tower_http::normalize_path::NormalizePath;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

pub struct AppState {
    pub models: ModelRegistry,
    pub keys: KeyRotator,
    pub http_client: Client,
    /// Per-request upstream deadline; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

#[derive(Parser)]
#[command(name = "glm-proxy")]
#[command(about = "OpenAI-compatible proxy for the z.ai GLM API", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy server
    #[command(alias = "s")]
    Server(ServerArgs),
}

#[derive(Args)]
struct ServerArgs {
    /// Address to listen on
    #[arg(short, long, env = "GLM_PROXY_LISTEN", default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// Model used when a request names none or an unknown one
    #[arg(short, long, env = "GLM_PROXY_MODEL", default_value = constants::DEFAULT_MODEL)]
    model: String,

    /// Upstream timeout in seconds (0 disables it)
    #[arg(short, long, env = "GLM_PROXY_TIMEOUT", default_value_t = 0)]
    timeout: u64,

    /// Skip TLS certificate verification for upstream calls
    #[arg(long, env = "GLM_PROXY_INSECURE_TLS")]
    insecure_tls: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let Some(Commands::Server(args)) = cli.command else {
        if let Err(e) = Cli::command().print_help() {
            error!("{e}");
        }
        return;
    };

    if let Err(e) = serve(args).await {
        error!("{e}");
        process::exit(1);
    }
}

async fn serve(args: ServerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    let models = ModelRegistry::builtin(&args.model)?;
    let keys = KeyRotator::new(config.api_keys)?;

    if args.insecure_tls {
        warn!("TLS certificate verification is DISABLED for upstream calls");
    }

    // No client-wide timeout: it would also cut off long-lived streams
    let http_client = Client::builder()
        .danger_accept_invalid_certs(args.insecure_tls)
        .pool_max_idle_per_host(10)
        .build()?;

    info!(
        "Starting glm-proxy v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", args.listen);
    info!(
        "Default model: {}, {} API key(s) loaded",
        models.default_profile().tag,
        keys.key_count()
    );

    let state = Arc::new(AppState {
        models,
        keys,
        http_client,
        timeout: config::request_timeout(args.timeout),
    });

    let app = NormalizePath::trim_trailing_slash(routes::router(state));

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
