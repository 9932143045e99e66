use std::{path::PathBuf, sync::Arc};

use tokio::sync::{broadcast, mpsc, watch};

use crate::{
    controller::{ConsoleController, ControllerCommand, EngineState},
    event::UiEvent,
    manager::ShowManager,
    timing::SystemClock,
};

pub mod apiserver;
pub mod console;
pub mod controller;
pub mod event;
pub mod manager;
pub mod model;
pub mod refresh;
pub mod timing;

pub struct BackendHandle {
    pub manager: ShowManager,
    pub controller_tx: mpsc::Sender<ControllerCommand>,
    pub state_rx: watch::Receiver<EngineState>,
    pub event_tx: broadcast::Sender<UiEvent>,
    pub event_rx: broadcast::Receiver<UiEvent>,
}

/// Bring the backend up: migrate the data directory, load settings and the
/// last-used show, then spawn the persister and controller tasks.
pub async fn start_backend(data_dir: PathBuf) -> Result<BackendHandle, anyhow::Error> {
    let (manager, persist_rx) = ShowManager::new(data_dir);
    manager.migrate_data_layout().await?;

    let settings = model::settings::load(&manager.settings_path()).await;
    manager.load_show(&settings.last_show_name).await?;

    let (controller_tx, controller_rx) = mpsc::channel::<ControllerCommand>(32);
    let (state_tx, state_rx) = watch::channel::<EngineState>(EngineState::new());
    let (event_tx, event_rx) = broadcast::channel::<UiEvent>(64);

    let controller = ConsoleController::new(
        manager.clone(),
        settings,
        controller_rx,
        state_tx,
        event_tx.clone(),
        Arc::new(SystemClock),
    );

    tokio::spawn(manager.clone().run_persister(persist_rx));
    tokio::spawn(controller.run());

    Ok(BackendHandle {
        manager,
        controller_tx,
        state_rx,
        event_tx,
        event_rx,
    })
}
