use anyhow::Context;
use log::{error, info};
use tokio::net::TcpListener;

use crate::{
    broker_state::BrokerState,
    config::{BindTarget, BrokerConfig},
    session::Session,
};

/// Binds the configured listener and serves clients until the listener fails.
pub async fn serve(config: BrokerConfig) -> anyhow::Result<()> {
    let broker_state = BrokerState::new(config.credential_check(), config.max_granted_qos);

    info!("Starting MQTT broker on {}...", config.bind);

    match &config.bind {
        BindTarget::Tcp { host, port } => {
            let listener = TcpListener::bind((host.as_str(), *port))
                .await
                .with_context(|| format!("Failed to bind {host}:{port}"))?;
            info!("Broker is listening on {}", listener.local_addr()?);

            serve_tcp(listener, broker_state).await
        }
        BindTarget::Unix(path) => serve_unix(path, broker_state).await,
    }
}

pub async fn serve_tcp(listener: TcpListener, broker_state: BrokerState) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await.context("Failed to accept connection")?;
        info!("Client connected: {}", addr);

        if let Err(e) = stream.set_nodelay(true) {
            error!("Failed to set TCP_NODELAY for {addr}: {e}");
        }

        let broker_state = broker_state.clone();
        tokio::spawn(async move {
            if let Err(e) = Session::handle_session(stream, broker_state).await {
                error!("Error handling connection from {}: {:?}", addr, e);
            }
        });
    }
}

#[cfg(unix)]
async fn serve_unix(path: &std::path::Path, broker_state: BrokerState) -> anyhow::Result<()> {
    use tokio::net::UnixListener;

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind unix socket {}", path.display()))?;
    info!("Broker is listening on unix:{}", path.display());

    loop {
        let (stream, _) = listener.accept().await.context("Failed to accept connection")?;
        info!("Client connected on unix:{}", path.display());

        let broker_state = broker_state.clone();
        tokio::spawn(async move {
            if let Err(e) = Session::handle_session(stream, broker_state).await {
                error!("Error handling unix socket connection: {:?}", e);
            }
        });
    }
}

#[cfg(not(unix))]
async fn serve_unix(path: &std::path::Path, _broker_state: BrokerState) -> anyhow::Result<()> {
    anyhow::bail!("Unix domain sockets are not supported on this platform: {}", path.display())
}
