use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, watch};

use crate::{
    controller::{ControllerCommand, EngineState},
    event::UiEvent,
    manager::ShowManager,
    model::ShowModel,
};

#[derive(Clone)]
struct ApiState {
    controller_tx: mpsc::Sender<ControllerCommand>,
    state_rx: watch::Receiver<EngineState>,
    event_tx: broadcast::Sender<UiEvent>,
    manager: ShowManager,
}

pub fn create_api_router(
    controller_tx: mpsc::Sender<ControllerCommand>,
    state_rx: watch::Receiver<EngineState>,
    event_tx: broadcast::Sender<UiEvent>,
    manager: ShowManager,
) -> Router {
    let state = ApiState {
        controller_tx,
        state_rx,
        event_tx,
        manager,
    };

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/show/full_state", get(get_full_state_handler))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FullShowState {
    show_model: ShowModel,
    engine_state: EngineState,
    shows: Vec<String>,
}

/// Everything a client needs to render on first connect.
async fn get_full_state_handler(State(state): State<ApiState>) -> axum::Json<FullShowState> {
    let show_model = state.manager.read().await.clone();
    let engine_state = state.state_rx.borrow().clone();
    let shows = state.manager.list_shows().await;

    axum::Json(FullShowState {
        show_model,
        engine_state,
        shows,
    })
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

#[derive(Serialize)]
#[serde(tag = "type", content = "param")]
enum WsPush<'a> {
    State(&'a EngineState),
    Event(&'a UiEvent),
}

async fn handle_socket(mut socket: WebSocket, state: ApiState) {
    let mut state_rx = state.state_rx.clone();
    let mut event_rx = state.event_tx.subscribe();

    log::info!("New WebSocket client connected.");

    loop {
        tokio::select! {
            Ok(_) = state_rx.changed() => {
                let new_state = state_rx.borrow().clone();
                if let Ok(payload) = serde_json::to_string(&WsPush::State(&new_state)) {
                    if socket.send(Message::Text(payload.into())).await.is_err() {
                        log::info!("WebSocket client disconnected (send error).");
                        break;
                    }
                }
            }

            event = event_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Ok(payload) = serde_json::to_string(&WsPush::Event(&event)) {
                            if socket.send(Message::Text(payload.into())).await.is_err() {
                                log::info!("WebSocket client disconnected (send error).");
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("WebSocket client lagged; skipped {missed} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            Some(Ok(msg)) = socket.recv() => {
                if let Message::Text(text) = msg {
                    if let Ok(command) = serde_json::from_str::<ControllerCommand>(&text) {
                        if state.controller_tx.send(command).await.is_err() {
                            log::error!("Failed to forward command to ConsoleController.");
                            break;
                        }
                    } else {
                        log::error!("Invalid command received.")
                    }
                } else if let Message::Close(_) = msg {
                    log::info!("WebSocket client sent close message.");
                    break;
                }
            }

            else => break,
        }
    }
}
