use std::path::PathBuf;

use cuemirror::{apiserver, controller::ControllerCommand, start_backend};

const API_ADDR: &str = "0.0.0.0:3000";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let data_dir = data_dir();
    log::info!("cuemirror starting up, data in {}", data_dir.display());

    let backend = start_backend(data_dir).await?;

    if let Err(e) = backend.controller_tx.send(ControllerCommand::Connect).await {
        log::error!("Could not request initial console connection: {:?}", e);
    }

    let router = apiserver::create_api_router(
        backend.controller_tx,
        backend.state_rx,
        backend.event_tx,
        backend.manager,
    );
    let listener = tokio::net::TcpListener::bind(API_ADDR).await?;
    log::info!("API listening on {API_ADDR}");
    axum::serve(listener, router).await?;
    Ok(())
}

/// `~/.local/share/cuemirror` (or the platform equivalent), current
/// directory as a last resort.
fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cuemirror")
}
