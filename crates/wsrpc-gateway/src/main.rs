//! wsrpc demo gateway
//!
//! Run with:
//! ```bash
//! GATEWAY_PORT=9000 cargo run -p wsrpc-gateway
//! ```
//!
//! Serves `ping`, `echo` and `divide` requests and logs `log` events.

use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info};
use wsrpc_common::{try_init_tracing_with_config, AppConfig, TracingConfig};
use wsrpc_gateway::demo::register_demo_handlers;
use wsrpc_gateway::{Acceptor, AcceptorEvent, GatewayConfig};

#[tokio::main]
async fn main() {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Gateway failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    info!(
        app = %config.app.name,
        env = ?config.app.env,
        address = %config.gateway.address(),
        "Starting wsrpc gateway"
    );

    let acceptor = Acceptor::new(GatewayConfig::from(&config));
    let mut events = acceptor.events();
    acceptor.on_connection(register_demo_handlers);
    acceptor.listen().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(AcceptorEvent::Closed) | Err(RecvError::Closed) => break,
                Ok(event) => info!(event = ?event, "Gateway event"),
                Err(RecvError::Lagged(skipped)) => info!(skipped, "Gateway events skipped"),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                acceptor.close().await;
                break;
            }
        }
    }

    Ok(())
}
