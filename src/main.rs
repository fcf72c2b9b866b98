use std::sync::Arc;

use roomlink::{auth, config::Config, store, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("roomlink=info")))
        .init();

    let config = Config::from_env().map_err(|e| e.0)?;

    let store = store::RoomStore::connect(&config.database_url).await?;
    let clients = auth::Clients::load(&config.client_secrets, &config.public_url).map_err(|e| e.0)?;
    store::spawn_sweeper(store.clone(), config.sweep_interval);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, public_url = %config.public_url, "rendezvous listening");

    let app_state = AppState {
        store,
        clients,
        config: Arc::new(config),
    };
    axum::serve(listener, roomlink::app(app_state)).await?;
    Ok(())
}
