//! Process entry point: load config, init tracing, connect the
//! database, bind the gateway, and run until a shutdown signal arrives.
//! Bootstrap order follows the teacher's `main.rs`: config → tracing →
//! db → background tasks (spawned with a shutdown broadcast subscriber
//! each) → serve.

use roleplay_hub::{config, db, network, state};

use network::gateway::GatewayState;
use state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = match config::Config::from_env() {
        Ok(cfg) => cfg,
        Err(errors) => {
            init_tracing();
            for e in &errors {
                tracing::error!(error = %e, "configuration error");
            }
            std::process::exit(1);
        }
    };

    init_tracing();

    let db = db::Database::connect(&cfg.database_url).await?;
    let listen_port = cfg.listen_port;
    let app_state = Arc::new(AppState::new(db, cfg));

    let (shutdown_tx, _) = broadcast::channel(1);

    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        });
    }

    let gateway_state = GatewayState { app: app_state, shutdown: shutdown_tx.clone() };
    let router = network::build_router(gateway_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], listen_port));
    tracing::info!(%addr, "roleplay-hub listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let mut shutdown_rx = shutdown_tx.subscribe();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await?;

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
