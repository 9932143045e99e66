//! Main-list tracking, timing recording and countdown playback.
//!
//! Wall-clock time comes in through [`Clock`] so the recording and countdown
//! logic can be driven deterministically in tests.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::model::timing::ShowTimings;

pub trait Clock: Send + Sync {
    /// Wall-clock seconds since the Unix epoch.
    fn now_secs(&self) -> f64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64()
    }
}

/// Live countdown snapshot, recomputed at 1 Hz while playing back against a
/// recorded schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountdownStatus {
    pub show_elapsed: f64,
    pub total_show_time: f64,
    pub estimated_time_remaining: f64,
    pub active_cue_number: Option<String>,
    pub time_to_next: Option<f64>,
    pub cue_countdowns: Vec<CueCountdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueCountdown {
    pub cue_number: String,
    pub seconds: f64,
    /// True for the live countdown of the active cue; false for the static
    /// recorded gap of every other cue.
    pub live: bool,
}

/// What an active-cue change did to the timing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActiveOutcome {
    /// The timings were mutated and should be persisted.
    pub timings_changed: bool,
    pub is_main_list: bool,
}

pub struct TimingEngine {
    clock: Arc<dyn Clock>,
    main_list: Option<u32>,
    active_main_cue: Option<String>,
    // Playback anchors: recorded elapsed at the last firing, and when it fired.
    current_show_elapsed: f64,
    last_cue_fire_time: Option<f64>,
}

impl TimingEngine {
    pub fn new(clock: Arc<dyn Clock>, main_list: Option<u32>) -> Self {
        Self {
            clock,
            main_list,
            active_main_cue: None,
            current_show_elapsed: 0.0,
            last_cue_fire_time: None,
        }
    }

    pub fn main_list(&self) -> Option<u32> {
        self.main_list
    }

    /// User override; replaced by the next fader config from the console.
    pub fn set_main_list(&mut self, list: u32) {
        self.main_list = Some(list);
    }

    /// Fader 0 bound to a cue list names the main playback list.
    pub fn on_fader_config(&mut self, index: u32, fader_type: u32, target: u32) -> Option<u32> {
        if index != 0 || fader_type != 1 {
            return None;
        }
        self.main_list = Some(target);
        Some(target)
    }

    pub fn set_recording(&self, timings: &mut ShowTimings, enabled: bool) {
        timings.is_recording = enabled;
        if enabled {
            // A fresh run: the first active cue stamps the new start.
            timings.show_start_time = None;
            timings.last_cue_time = 0.0;
            timings.last_cue_number = None;
        }
    }

    pub fn reset_timings(&mut self, timings: &mut ShowTimings) {
        *timings = ShowTimings {
            is_recording: timings.is_recording,
            ..ShowTimings::default()
        };
        self.active_main_cue = None;
        self.last_cue_fire_time = None;
        self.current_show_elapsed = 0.0;
    }

    /// Handle an active-cue change on `list`.
    ///
    /// While recording, only main-list transitions produce records; events on
    /// secondary lists are ignored so they cannot leave ghost entries. When
    /// not recording, a main-list firing re-anchors the countdown.
    pub fn on_active_cue(
        &mut self,
        timings: &mut ShowTimings,
        list: u32,
        number: &str,
        label: &str,
    ) -> ActiveOutcome {
        let now = self.clock.now_secs();
        let is_main = self.main_list == Some(list);
        let mut changed = false;

        if timings.is_recording {
            if timings.show_start_time.is_none() {
                timings.show_start_time = Some(now);
                changed = true;
            }
            if is_main && timings.last_cue_number.as_deref() != Some(number) {
                let start = timings.show_start_time.unwrap_or(now);
                timings.record(number, list, label, now - start);
                changed = true;
            }
        } else if is_main {
            if let Some(recorded) = timings.timing_for(number) {
                self.current_show_elapsed = recorded.timestamp;
                self.last_cue_fire_time = Some(now);
            }
        }

        if is_main {
            self.active_main_cue = Some(number.to_string());
        }
        ActiveOutcome {
            timings_changed: changed,
            is_main_list: is_main,
        }
    }

    /// 1 Hz countdown recomputation. `None` while recording or without a
    /// recorded schedule.
    pub fn countdown(&self, timings: &ShowTimings) -> Option<CountdownStatus> {
        if timings.is_recording || timings.cue_timings.is_empty() {
            return None;
        }
        let now = self.clock.now_secs();
        let show_elapsed = match self.last_cue_fire_time {
            Some(fired) => self.current_show_elapsed + (now - fired),
            None => 0.0,
        };
        let total_show_time = timings.total_show_time();

        let active = self.active_main_cue.as_deref();
        let time_to_next = active.and_then(|number| {
            let current = timings.timing_for(number)?;
            let next = timings.timing_after(number)?;
            Some(next.time_from_previous - (show_elapsed - current.timestamp))
        });

        let cue_countdowns = timings
            .cue_timings
            .iter()
            .map(|t| {
                let is_active = active == Some(t.cue_number.as_str());
                let seconds = match (is_active, time_to_next) {
                    (true, Some(remaining)) => remaining.max(0.0),
                    _ => t.time_from_previous,
                };
                CueCountdown {
                    cue_number: t.cue_number.clone(),
                    seconds,
                    live: is_active,
                }
            })
            .collect();

        Some(CountdownStatus {
            show_elapsed,
            total_show_time,
            estimated_time_remaining: (total_show_time - show_elapsed).max(0.0),
            active_cue_number: self.active_main_cue.clone(),
            time_to_next,
            cue_countdowns,
        })
    }
}
