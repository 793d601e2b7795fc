use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Router, routing::get};
use clap::Parser;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use speak_relay::{
    ServerConfig,
    handlers::health::health_check,
    routes,
    state::AppState,
};

/// speak-relay - real-time text-to-speech relay server
#[derive(Parser, Debug)]
#[command(name = "speak-relay")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Host to bind (overrides HOST)
    #[arg(long = "host")]
    host: Option<String>,

    /// Port to bind (overrides PORT)
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Initialize crypto provider for TLS connections to the provider.
    // This must be done before any TLS connections are attempted.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    if config.deepgram_api_key.is_none() {
        tracing::warn!(
            "DEEPGRAM_API_KEY is not set; synthesis requests will be rejected with an error"
        );
    }

    let address = config.address();
    let app_state = AppState::new(config);

    let app = Router::new()
        .route("/", get(health_check))
        .merge(routes::create_speak_router())
        .with_state(app_state)
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http());

    let socket_addr: SocketAddr = address
        .parse()
        .map_err(|e| anyhow!("Invalid server address '{}': {}", address, e))?;

    info!("Server listening on http://{}", socket_addr);

    let listener = TcpListener::bind(&socket_addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
