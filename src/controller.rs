use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};

use rosc::OscMessage;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time,
};

use crate::{
    console::{
        protocol::{self, ConsoleEvent, ConsoleRequest, CueTextOutcome},
        transport::{OscTransport, TransportEvent, UDP_LISTEN_PORT},
    },
    event::UiEvent,
    manager::{PersistKind, ShowManager},
    model::{
        cue::LastSeen,
        settings::{self, GlobalSettings, OscSettings},
    },
    refresh::{RefreshAction, RefreshEngine, BATCH_INTERVAL},
    timing::{Clock, CountdownStatus, TimingEngine},
};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const POLL_TIMEOUT: Duration = Duration::from_millis(600);
const COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);

/// Commands from the API layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "param")]
pub enum ControllerCommand {
    Connect,
    Disconnect,
    /// Refresh one list, or every discovered list.
    RefreshCueList {
        list: Option<u32>,
    },
    SetRecording {
        enabled: bool,
    },
    ResetTimings,
    SwitchShow {
        name: String,
    },
    SetMainPlaybackList {
        list: u32,
    },
    UpdateCueMeta {
        cue_list: u32,
        cue_number: String,
        part_number: u32,
        notes: Option<String>,
        color: Option<String>,
        tags: Option<Vec<String>>,
        page: Option<String>,
        image_path: Option<String>,
    },
    UpdateShowNotes {
        notes: String,
    },
    UpdateSceneMeta {
        scene: String,
        notes: Option<String>,
        color: Option<String>,
    },
    UpdateTagColor {
        tag: String,
        color: Option<String>,
    },
    UpdateOscSettings {
        osc: OscSettings,
    },
}

/// Snapshot pushed to UI clients whenever it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineState {
    pub connected: bool,
    pub console_show_name: String,
    pub console_version: String,
    pub cue_lists: Vec<u32>,
    pub refreshing: Option<u32>,
    pub recording: bool,
    pub main_playback_list: Option<u32>,
    pub current_show: String,
    pub countdown: Option<CountdownStatus>,
}

impl EngineState {
    pub fn new() -> Self {
        Self {
            connected: false,
            console_show_name: String::new(),
            console_version: String::new(),
            cue_lists: Vec::new(),
            refreshing: None,
            recording: false,
            main_playback_list: None,
            current_show: String::new(),
            countdown: None,
        }
    }
}

impl Default for EngineState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollKind {
    Active,
    Pending,
}

/// Active/pending polling fallback: one outstanding request at a time, a
/// fixed deadline per request, late replies consumed by the regular parser.
#[derive(Debug, Default)]
struct Poller {
    queue: VecDeque<(u32, PollKind)>,
    in_flight: Option<(u32, PollKind, Instant)>,
}

impl Poller {
    fn next_request(&mut self, lists: &BTreeSet<u32>, now: Instant) -> Option<ConsoleRequest> {
        if let Some((_, _, started)) = self.in_flight {
            if now.duration_since(started) < POLL_TIMEOUT {
                return None;
            }
            // The slot is freed; a late reply still flows through the parser.
            self.in_flight = None;
        }
        if self.queue.is_empty() {
            for &list in lists {
                self.queue.push_back((list, PollKind::Active));
                self.queue.push_back((list, PollKind::Pending));
            }
        }
        let (list, kind) = self.queue.pop_front()?;
        self.in_flight = Some((list, kind, now));
        Some(match kind {
            PollKind::Active => ConsoleRequest::ActiveCue { list },
            PollKind::Pending => ConsoleRequest::PendingCue { list },
        })
    }

    fn on_response(&mut self, list: u32, kind: PollKind) {
        if matches!(self.in_flight, Some((l, k, _)) if l == list && k == kind) {
            self.in_flight = None;
        }
    }

    fn context_list(&self) -> Option<u32> {
        self.in_flight.map(|(list, _, _)| list)
    }
}

/// The single owning task for everything mutable: cue store writes, refresh
/// state, active/pending markers and the timing log all happen here, so no
/// two event sources can interleave destructively.
pub struct ConsoleController {
    manager: ShowManager,
    settings: GlobalSettings,
    command_rx: mpsc::Receiver<ControllerCommand>,

    transport_event_tx: mpsc::Sender<TransportEvent>,
    transport_event_rx: mpsc::Receiver<TransportEvent>,
    transport_tx: Option<mpsc::Sender<OscMessage>>,
    transport_task: Option<JoinHandle<()>>,
    udp_listen_port: u16,

    refresh: RefreshEngine,
    timing: TimingEngine,
    poller: Poller,
    known_lists: BTreeSet<u32>,

    state: EngineState,
    state_tx: watch::Sender<EngineState>,
    event_tx: broadcast::Sender<UiEvent>,
}

impl ConsoleController {
    pub fn new(
        manager: ShowManager,
        settings: GlobalSettings,
        command_rx: mpsc::Receiver<ControllerCommand>,
        state_tx: watch::Sender<EngineState>,
        event_tx: broadcast::Sender<UiEvent>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (transport_event_tx, transport_event_rx) = mpsc::channel(256);
        let timing = TimingEngine::new(clock, settings.main_list());
        let mut state = EngineState::new();
        state.main_playback_list = settings.main_list();
        state.current_show = settings.last_show_name.clone();

        Self {
            manager,
            settings,
            command_rx,
            transport_event_tx,
            transport_event_rx,
            transport_tx: None,
            transport_task: None,
            udp_listen_port: UDP_LISTEN_PORT,
            refresh: RefreshEngine::new(),
            timing,
            poller: Poller::default(),
            known_lists: BTreeSet::new(),
            state,
            state_tx,
            event_tx,
        }
    }

    pub async fn run(mut self) {
        log::info!("ConsoleController run loop started.");
        self.state.recording = self.manager.read().await.timings.is_recording;
        self.state.current_show = self.manager.current_show_name().await;
        self.publish_state();

        let mut poll_timer = time::interval(POLL_INTERVAL);
        let mut batch_timer = time::interval(BATCH_INTERVAL);
        let mut countdown_timer = time::interval(COUNTDOWN_INTERVAL);

        loop {
            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    if let Err(e) = self.handle_command(command).await {
                        log::error!("Error handling controller command: {:?}", e);
                    }
                    self.publish_state();
                },
                Some(event) = self.transport_event_rx.recv() => {
                    self.handle_transport_event(event).await;
                    self.publish_state();
                },
                _ = poll_timer.tick() => self.poll_tick().await,
                _ = batch_timer.tick() => self.refresh_tick().await,
                _ = countdown_timer.tick() => {
                    self.countdown_tick().await;
                    self.publish_state();
                },
                else => break,
            }
        }
        log::info!("ConsoleController run loop finished.");
    }

    async fn handle_command(&mut self, command: ControllerCommand) -> Result<(), anyhow::Error> {
        match command {
            ControllerCommand::Connect => self.connect().await,
            ControllerCommand::Disconnect => {
                self.disconnect();
                Ok(())
            }
            ControllerCommand::RefreshCueList { list } => {
                let now = Instant::now();
                let lists: Vec<u32> = match list {
                    Some(list) => vec![list],
                    None => self.known_lists.iter().copied().collect(),
                };
                for list in lists {
                    let actions = self.refresh.request(list, now);
                    self.apply_refresh_actions(actions).await;
                }
                Ok(())
            }
            ControllerCommand::SetRecording { enabled } => {
                let timing = &self.timing;
                self.manager
                    .write_with(|m| timing.set_recording(&mut m.timings, enabled))
                    .await;
                self.state.recording = enabled;
                self.manager.persist_now(PersistKind::Timings).await?;
                self.emit(UiEvent::RecordingChanged { enabled });
                Ok(())
            }
            ControllerCommand::ResetTimings => {
                let timing = &mut self.timing;
                self.manager
                    .write_with(|m| timing.reset_timings(&mut m.timings))
                    .await;
                self.manager.persist_now(PersistKind::Timings).await?;
                self.emit(UiEvent::ShowModelChanged);
                Ok(())
            }
            ControllerCommand::SwitchShow { name } => {
                self.manager.switch_show(&name).await?;
                self.settings.last_show_name = name.clone();
                self.save_settings().await;
                self.state.recording = self.manager.read().await.timings.is_recording;
                self.state.current_show = name.clone();
                self.emit(UiEvent::ShowSwitched { name });
                Ok(())
            }
            ControllerCommand::SetMainPlaybackList { list } => {
                self.timing.set_main_list(list);
                self.settings.main_playback_list = Some(list.to_string());
                self.save_settings().await;
                self.state.main_playback_list = Some(list);
                self.emit(UiEvent::MainPlaybackListChanged { list });
                Ok(())
            }
            ControllerCommand::UpdateCueMeta {
                cue_list,
                cue_number,
                part_number,
                notes,
                color,
                tags,
                page,
                image_path,
            } => {
                let updated = self
                    .manager
                    .write_with(|m| {
                        let Some(cue) = m.find_cue_mut(cue_list, &cue_number, part_number) else {
                            return false;
                        };
                        if let Some(notes) = notes {
                            cue.notes = notes;
                        }
                        if let Some(color) = color {
                            cue.color = color;
                        }
                        if let Some(tags) = tags {
                            cue.tags = tags;
                        }
                        if let Some(page) = page {
                            cue.page = page;
                        }
                        if let Some(image_path) = image_path {
                            cue.image_path = Some(image_path).filter(|p| !p.is_empty());
                        }
                        true
                    })
                    .await;
                if updated {
                    // API mutations must be durable before the answer goes out.
                    self.manager.persist_now(PersistKind::Cues).await?;
                    self.emit(UiEvent::CueMetaUpdated {
                        cue_list,
                        cue_number,
                        part_number,
                    });
                } else {
                    log::warn!("No cue {cue_list}/{cue_number} part {part_number} to update");
                }
                Ok(())
            }
            ControllerCommand::UpdateShowNotes { notes } => {
                self.manager.write_with(|m| m.notes = notes).await;
                self.manager.persist_now(PersistKind::ShowNotes).await?;
                self.emit(UiEvent::ShowModelChanged);
                Ok(())
            }
            ControllerCommand::UpdateSceneMeta {
                scene,
                notes,
                color,
            } => {
                self.manager
                    .write_with(|m| {
                        let meta = m.scenes.entry(scene).or_default();
                        if let Some(notes) = notes {
                            meta.notes = notes;
                        }
                        if let Some(color) = color {
                            meta.color = color;
                        }
                    })
                    .await;
                self.manager.persist_now(PersistKind::Scenes).await?;
                self.emit(UiEvent::ShowModelChanged);
                Ok(())
            }
            ControllerCommand::UpdateTagColor { tag, color } => {
                self.manager
                    .write_with(|m| match color {
                        Some(color) => {
                            m.tag_colors.insert(tag, color);
                        }
                        None => {
                            m.tag_colors.remove(&tag);
                        }
                    })
                    .await;
                self.manager.persist_now(PersistKind::TagColors).await?;
                self.emit(UiEvent::ShowModelChanged);
                Ok(())
            }
            ControllerCommand::UpdateOscSettings { osc } => {
                self.settings.osc_settings = osc;
                self.save_settings().await;
                Ok(())
            }
        }
    }

    async fn connect(&mut self) -> Result<(), anyhow::Error> {
        if self.transport_tx.is_some() {
            log::warn!("Connect requested while already connected.");
            return Ok(());
        }
        match OscTransport::connect(
            &self.settings.osc_settings,
            self.udp_listen_port,
            self.transport_event_tx.clone(),
        )
        .await
        {
            Ok((transport, command_tx)) => {
                self.transport_tx = Some(command_tx);
                self.transport_task = Some(tokio::spawn(transport.run()));
                Ok(())
            }
            Err(e) => {
                self.emit(UiEvent::ConnectFailed {
                    error: format!("{e:#}"),
                });
                Err(e)
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(task) = self.transport_task.take() {
            task.abort();
        }
        self.transport_tx = None;
        if self.state.connected {
            self.state.connected = false;
            self.emit(UiEvent::Disconnected {
                reason: "disconnected by user".to_string(),
            });
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Ready => {
                self.state.connected = true;
                self.emit(UiEvent::Connected);
                for request in [
                    ConsoleRequest::Version,
                    ConsoleRequest::Subscribe,
                    ConsoleRequest::FaderConfig,
                    ConsoleRequest::CueListCount,
                ] {
                    self.send(request).await;
                }
            }
            TransportEvent::Message(msg) => match protocol::decode(&msg) {
                Some(event) => self.dispatch(event).await,
                None => log::debug!("Ignoring OSC message at {}", msg.addr),
            },
            TransportEvent::Closed(reason) => {
                self.transport_tx = None;
                self.transport_task = None;
                if self.state.connected {
                    self.state.connected = false;
                    self.emit(UiEvent::Disconnected { reason });
                }
            }
        }
    }

    async fn dispatch(&mut self, event: ConsoleEvent) {
        let now = Instant::now();
        match event {
            ConsoleEvent::ShowName(name) => {
                self.state.console_show_name = name.clone();
                self.emit(UiEvent::ConsoleShowName { name });
            }
            ConsoleEvent::Version(version) => {
                self.state.console_version = version.clone();
                self.emit(UiEvent::ConsoleVersion { version });
            }
            ConsoleEvent::CueListCount(count) => {
                for index in 0..count {
                    self.send(ConsoleRequest::CueListIndex { index }).await;
                }
            }
            ConsoleEvent::CueListDiscovered { list } => {
                if self.known_lists.insert(list) {
                    self.state.cue_lists = self.known_lists.iter().copied().collect();
                    self.emit(UiEvent::CueListDiscovered { list });
                    let actions = self.refresh.request(list, now);
                    self.apply_refresh_actions(actions).await;
                }
            }
            ConsoleEvent::CueCount { list, count } => {
                let actions = self.refresh.on_cue_count(list, count, now);
                self.apply_refresh_actions(actions).await;
            }
            ConsoleEvent::CueData(rec) => {
                let (upsert, actions) = self.refresh.on_cue_data(&rec, now);
                if upsert {
                    self.manager
                        .write_with(|m| m.upsert_console(rec.list, &rec.number, rec.part, &rec.update))
                        .await;
                    if !self.refresh.in_progress() {
                        // Ad-hoc updates debounce; refresh rides its own persist.
                        self.manager.persist(PersistKind::Cues);
                    }
                }
                self.apply_refresh_actions(actions).await;
            }
            ConsoleEvent::CueNotify {
                list,
                cue_number,
                count,
            } => {
                let actions = self
                    .refresh
                    .on_cue_notify(list, cue_number.as_deref(), count, now);
                self.apply_refresh_actions(actions).await;
            }
            ConsoleEvent::ActiveCue { list, number } => {
                self.poller.on_response(list, PollKind::Active);
                self.apply_active(list, number, String::new()).await;
            }
            ConsoleEvent::PendingCue { list, number } => {
                self.poller.on_response(list, PollKind::Pending);
                self.apply_pending(list, number).await;
            }
            ConsoleEvent::ActiveCueText { list, text } => {
                let context = list.or_else(|| self.poller.context_list());
                if let Some(list) = context {
                    self.poller.on_response(list, PollKind::Active);
                }
                match protocol::parse_cue_text(&text) {
                    CueTextOutcome::Reset => {
                        if let Some(list) = context {
                            self.manager
                                .write_with(|m| m.clear_last_seen(list, LastSeen::Active))
                                .await;
                        }
                    }
                    CueTextOutcome::Parsed(parsed) => {
                        let Some(list) = parsed.list.or(context) else {
                            log::debug!("Active cue text without list context: {text}");
                            return;
                        };
                        self.apply_active(list, parsed.number.clone(), parsed.label).await;
                        if let Some(fade) = parsed.fade_time {
                            if parsed.percent == Some(0) {
                                self.set_fade_time(list, &parsed.number, fade).await;
                            }
                        }
                    }
                }
            }
            ConsoleEvent::PendingCueText { list, text } => {
                let context = list.or_else(|| self.poller.context_list());
                if let Some(list) = context {
                    self.poller.on_response(list, PollKind::Pending);
                }
                match protocol::parse_cue_text(&text) {
                    CueTextOutcome::Reset => {
                        if let Some(list) = context {
                            self.manager
                                .write_with(|m| m.clear_last_seen(list, LastSeen::Pending))
                                .await;
                        }
                    }
                    CueTextOutcome::Parsed(parsed) => {
                        let Some(list) = parsed.list.or(context) else {
                            log::debug!("Pending cue text without list context: {text}");
                            return;
                        };
                        self.apply_pending(list, parsed.number.clone()).await;
                        if let Some(fade) = parsed.fade_time {
                            self.set_fade_time(list, &parsed.number, fade).await;
                        }
                    }
                }
            }
            ConsoleEvent::FaderConfig {
                index,
                fader_type,
                target,
                ..
            } => {
                if let Some(list) = self.timing.on_fader_config(index, fader_type, target) {
                    self.settings.main_playback_list = Some(list.to_string());
                    self.save_settings().await;
                    self.state.main_playback_list = Some(list);
                    self.emit(UiEvent::MainPlaybackListChanged { list });
                }
            }
        }
    }

    async fn apply_active(&mut self, list: u32, number: String, label: String) {
        self.manager
            .write_with(|m| m.mark_last_seen(list, &number, LastSeen::Active))
            .await;

        let timing = &mut self.timing;
        let outcome = self
            .manager
            .write_with(|m| timing.on_active_cue(&mut m.timings, list, &number, &label))
            .await;

        if outcome.timings_changed {
            if let Err(e) = self.manager.persist_now(PersistKind::Timings).await {
                log::error!("Failed to persist timings: {:?}", e);
            }
            if outcome.is_main_list {
                let timestamp = self
                    .manager
                    .read()
                    .await
                    .timings
                    .timing_for(&number)
                    .map(|t| t.timestamp);
                if let Some(timestamp) = timestamp {
                    self.emit(UiEvent::CueTimingRecorded {
                        cue_number: number.clone(),
                        timestamp,
                    });
                }
            }
        }
        self.emit(UiEvent::ActiveCueChanged {
            list,
            cue_number: number,
        });
    }

    async fn apply_pending(&mut self, list: u32, number: String) {
        self.manager
            .write_with(|m| m.mark_last_seen(list, &number, LastSeen::Pending))
            .await;
        self.emit(UiEvent::PendingCueChanged {
            list,
            cue_number: number,
        });
    }

    async fn set_fade_time(&self, list: u32, number: &str, fade: f64) {
        self.manager
            .write_with(|m| {
                if let Some(cue) = m.find_cue_mut(list, number, 0) {
                    cue.fade_time = Some(fade);
                }
            })
            .await;
    }

    async fn apply_refresh_actions(&mut self, actions: Vec<RefreshAction>) {
        for action in actions {
            match action {
                RefreshAction::Send(request) => self.send(request).await,
                RefreshAction::Evict { list, keep } => {
                    let evicted = self.manager.write_with(|m| m.evict(list, &keep)).await;
                    if evicted > 0 {
                        log::info!("Evicted {evicted} stale cues from list {list}");
                    }
                }
                RefreshAction::Persist => self.manager.persist(PersistKind::Cues),
                RefreshAction::Started { list } => {
                    self.state.refreshing = Some(list);
                    self.emit(UiEvent::RefreshStarted { list });
                }
                RefreshAction::Completed { list, cue_count } => {
                    self.state.refreshing = None;
                    self.emit(UiEvent::RefreshCompleted { list, cue_count });
                }
                RefreshAction::Failed { list } => {
                    self.state.refreshing = None;
                    self.emit(UiEvent::RefreshFailed { list });
                }
            }
        }
    }

    async fn poll_tick(&mut self) {
        if !self.state.connected || self.refresh.in_progress() || self.known_lists.is_empty() {
            return;
        }
        let lists = self.known_lists.clone();
        if let Some(request) = self.poller.next_request(&lists, Instant::now()) {
            self.send(request).await;
        }
    }

    async fn refresh_tick(&mut self) {
        if !self.state.connected {
            return;
        }
        let actions = self.refresh.tick(Instant::now());
        self.apply_refresh_actions(actions).await;
    }

    async fn countdown_tick(&mut self) {
        let status = {
            let model = self.manager.read().await;
            self.timing.countdown(&model.timings)
        };
        if self.state.countdown != status {
            if let Some(status) = &status {
                self.emit(UiEvent::Countdown {
                    status: status.clone(),
                });
            }
            self.state.countdown = status;
        }
    }

    async fn send(&mut self, request: ConsoleRequest) {
        let Some(tx) = &self.transport_tx else {
            log::debug!("Not connected; dropping {:?}", request);
            return;
        };
        if tx.send(request.to_message()).await.is_err() {
            log::warn!("Transport task is gone; marking disconnected.");
            self.transport_tx = None;
            self.state.connected = false;
        }
    }

    async fn save_settings(&self) {
        if let Err(e) = settings::save(&self.manager.settings_path(), &self.settings).await {
            log::error!("Failed to save settings: {:?}", e);
        }
    }

    fn emit(&self, event: UiEvent) {
        if self.event_tx.send(event).is_err() {
            log::trace!("No UI clients are listening to events.");
        }
    }

    fn publish_state(&self) {
        self.state_tx.send_if_modified(|current| {
            if *current != self.state {
                *current = self.state.clone();
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::cue::Cue, timing::SystemClock};
    use tokio::time::timeout;

    struct Harness {
        _dir: tempfile::TempDir,
        manager: ShowManager,
        command_tx: mpsc::Sender<ControllerCommand>,
        transport_tx: mpsc::Sender<TransportEvent>,
        event_rx: broadcast::Receiver<UiEvent>,
        _state_rx: watch::Receiver<EngineState>,
    }

    async fn spawn_controller() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let (manager, _persist_rx) = ShowManager::new(dir.path().to_path_buf());
        let (command_tx, command_rx) = mpsc::channel(32);
        let (state_tx, state_rx) = watch::channel(EngineState::new());
        let (event_tx, event_rx) = broadcast::channel(32);

        let controller = ConsoleController::new(
            manager.clone(),
            GlobalSettings {
                main_playback_list: Some("1".to_string()),
                ..GlobalSettings::default()
            },
            command_rx,
            state_tx,
            event_tx,
            Arc::new(SystemClock),
        );
        let transport_tx = controller.transport_event_tx.clone();
        tokio::spawn(controller.run());

        Harness {
            _dir: dir,
            manager,
            command_tx,
            transport_tx,
            event_rx,
            _state_rx: state_rx,
        }
    }

    async fn wait_for(
        event_rx: &mut broadcast::Receiver<UiEvent>,
        mut predicate: impl FnMut(&UiEvent) -> bool,
    ) -> UiEvent {
        timeout(Duration::from_secs(2), async {
            loop {
                let event = event_rx.recv().await.expect("event stream closed");
                if predicate(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn cue_meta_update_is_durable_before_the_event() {
        let mut harness = spawn_controller().await;
        harness
            .manager
            .write_with(|m| m.cues.push(Cue::new(1, "5", 0)))
            .await;

        harness
            .command_tx
            .send(ControllerCommand::UpdateCueMeta {
                cue_list: 1,
                cue_number: "5".to_string(),
                part_number: 0,
                notes: Some("stand by flys".to_string()),
                color: None,
                tags: Some(vec!["act1".to_string()]),
                page: None,
                image_path: None,
            })
            .await
            .unwrap();

        wait_for(&mut harness.event_rx, |e| {
            matches!(e, UiEvent::CueMetaUpdated { .. })
        })
        .await;

        let on_disk = tokio::fs::read_to_string(
            harness
                .manager
                .data_dir()
                .join("Default")
                .join("cues.json"),
        )
        .await
        .unwrap();
        assert!(on_disk.contains("stand by flys"));
    }

    #[tokio::test]
    async fn active_cue_message_marks_store_and_records_timing() {
        let mut harness = spawn_controller().await;
        harness
            .manager
            .write_with(|m| {
                m.cues.push(Cue::new(1, "7", 0));
                m.timings.is_recording = true;
            })
            .await;

        harness
            .transport_tx
            .send(TransportEvent::Message(OscMessage {
                addr: "/eos/out/active/cue/1/7".to_string(),
                args: vec![],
            }))
            .await
            .unwrap();

        wait_for(&mut harness.event_rx, |e| {
            matches!(e, UiEvent::ActiveCueChanged { .. })
        })
        .await;

        let model = harness.manager.read().await;
        assert_eq!(
            model.find_cue(1, "7", 0).unwrap().last_seen,
            Some(LastSeen::Active)
        );
        assert!(model.timings.timing_for("7").is_some());
    }

    #[tokio::test]
    async fn switching_shows_swaps_the_model() {
        let mut harness = spawn_controller().await;
        harness
            .manager
            .write_with(|m| m.cues.push(Cue::new(1, "5", 0)))
            .await;

        harness
            .command_tx
            .send(ControllerCommand::SwitchShow {
                name: "Second Night".to_string(),
            })
            .await
            .unwrap();

        let event = wait_for(&mut harness.event_rx, |e| {
            matches!(e, UiEvent::ShowSwitched { .. })
        })
        .await;
        assert_eq!(
            event,
            UiEvent::ShowSwitched {
                name: "Second Night".to_string()
            }
        );

        let model = harness.manager.read().await;
        assert_eq!(model.name, "Second Night");
        assert!(model.cues.is_empty());
    }

    #[tokio::test]
    async fn refresh_command_emits_started_event() {
        let mut harness = spawn_controller().await;
        harness
            .command_tx
            .send(ControllerCommand::RefreshCueList { list: Some(4) })
            .await
            .unwrap();
        let event = wait_for(&mut harness.event_rx, |e| {
            matches!(e, UiEvent::RefreshStarted { .. })
        })
        .await;
        assert_eq!(event, UiEvent::RefreshStarted { list: 4 });
    }
}
