//! UAA authorization-code proxy.
//!
//! ```text
//!   Browser ──▶ redirect_proto ──▶ redirect_port ──▶ authorize ──▶ proxy ──▶ Backend
//!      │                                                 │           └─ websocket tunnel
//!      │                                          no token: 307
//!      ▼                                                 ▼
//!   /auth/callback ◀──────────── code, state ◀──────── UAA
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use uaa_authcode_proxy::config::{load_config, ConfigOverrides};
use uaa_authcode_proxy::lifecycle::{register_proxy_client, signals, Components, Shutdown};
use uaa_authcode_proxy::observability::{logging, metrics};
use uaa_authcode_proxy::session::SessionSweeper;
use uaa_authcode_proxy::HttpServer;

#[derive(Debug, Parser)]
#[command(name = "uaa-authcode-proxy", version, about = "OAuth2 authorization-code proxy for UAA")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "UAA_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "LISTEN_ADDRESS")]
    listen: Option<String>,

    /// Backend base URL
    #[arg(long, env = "BACKEND_ADDRESS")]
    backend: Option<String>,

    /// UAA base URL
    #[arg(long, env = "UAA_URL")]
    uaa_url: Option<String>,

    #[arg(long, env = "UAA_PROXY_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "UAA_PROXY_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    #[arg(long, env = "SESSION_AUTH_KEY", hide_env_values = true)]
    session_auth_key: Option<String>,

    #[arg(long, env = "SESSION_ENCRYPT_KEY", hide_env_values = true)]
    session_encrypt_key: Option<String>,

    /// Register the proxy's OAuth client with UAA at startup
    #[arg(long)]
    register_client: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            listen: self.listen.clone(),
            backend: self.backend.clone(),
            uaa_url: self.uaa_url.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            session_auth_key: self.session_auth_key.clone(),
            session_encrypt_key: self.session_encrypt_key.clone(),
            register_client: self.register_client,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), &cli.overrides())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "uaa-authcode-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.url,
        uaa = %config.uaa.url,
        mount_path = %config.listener.mount_path,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let components = Components::from_config(&config)?;
    register_proxy_client(&config, &components.http).await;
    let server = HttpServer::new(&config, &components)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let stopped = shutdown.subscribe();
    tokio::spawn(signals::wait_for_shutdown(shutdown.clone()));

    let sweeper = SessionSweeper::new(
        components.sessions.clone(),
        Duration::from_secs(config.session.sweep_interval_secs),
    );
    tokio::spawn(sweeper.run(shutdown.subscribe()));

    server.run(listener, stopped).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
