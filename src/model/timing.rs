use serde::{Deserialize, Serialize};

/// One recorded firing of a main-list cue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueTiming {
    pub cue_number: String,
    pub cue_list: u32,
    pub label: String,
    /// Seconds from show start.
    pub timestamp: f64,
    pub time_from_previous: f64,
}

/// Persisted timing state of the current show (`show_timings.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ShowTimings {
    pub is_recording: bool,
    /// Wall-clock epoch seconds of the first active cue of the recording.
    pub show_start_time: Option<f64>,
    pub last_cue_time: f64,
    pub last_cue_number: Option<String>,
    pub cue_timings: Vec<CueTiming>,
}

impl ShowTimings {
    pub fn timing_for(&self, cue_number: &str) -> Option<&CueTiming> {
        self.cue_timings.iter().find(|t| t.cue_number == cue_number)
    }

    /// Total recorded show length: the timestamp of the last firing.
    pub fn total_show_time(&self) -> f64 {
        self.cue_timings
            .iter()
            .map(|t| t.timestamp)
            .fold(0.0, f64::max)
    }

    /// The recorded entry that follows `cue_number`, in recorded order.
    pub fn timing_after(&self, cue_number: &str) -> Option<&CueTiming> {
        let idx = self
            .cue_timings
            .iter()
            .position(|t| t.cue_number == cue_number)?;
        self.cue_timings.get(idx + 1)
    }

    /// Record a firing: one entry per cue number, updated in place on re-fire.
    pub fn record(&mut self, cue_number: &str, cue_list: u32, label: &str, timestamp: f64) {
        let time_from_previous = match self.last_cue_number {
            Some(_) => timestamp - self.last_cue_time,
            None => 0.0,
        };
        if let Some(existing) = self
            .cue_timings
            .iter_mut()
            .find(|t| t.cue_number == cue_number)
        {
            existing.timestamp = timestamp;
            existing.time_from_previous = time_from_previous;
            existing.label = label.to_string();
        } else {
            self.cue_timings.push(CueTiming {
                cue_number: cue_number.to_string(),
                cue_list,
                label: label.to_string(),
                timestamp,
                time_from_previous,
            });
        }
        self.last_cue_time = timestamp;
        self.last_cue_number = Some(cue_number.to_string());
    }
}
