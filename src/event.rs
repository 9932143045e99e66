use serde::{Deserialize, Serialize};

use crate::timing::CountdownStatus;

/// Events pushed to connected UI clients over the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "param")]
pub enum UiEvent {
    // Connection lifecycle
    Connected,
    ConnectFailed { error: String },
    Disconnected { reason: String },

    // Console identity
    ConsoleShowName { name: String },
    ConsoleVersion { version: String },

    // Cue database
    CueListDiscovered { list: u32 },
    RefreshStarted { list: u32 },
    RefreshCompleted { list: u32, cue_count: usize },
    RefreshFailed { list: u32 },
    CueMetaUpdated { cue_list: u32, cue_number: String, part_number: u32 },

    // Playback state
    ActiveCueChanged { list: u32, cue_number: String },
    PendingCueChanged { list: u32, cue_number: String },
    MainPlaybackListChanged { list: u32 },

    // Timing
    RecordingChanged { enabled: bool },
    CueTimingRecorded { cue_number: String, timestamp: f64 },
    Countdown { status: CountdownStatus },

    // Shows
    ShowSwitched { name: String },
    ShowModelChanged,
}
