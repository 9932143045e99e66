use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_CUE_COLOR: &str = "#ffffff";

/// Primary key of a cue: part 0 is the main cue, 1..N are its parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CueKey {
    pub cue_list: u32,
    pub cue_number: String,
    pub part_number: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LastSeen {
    Active,
    Pending,
}

/// One cue of the mirrored console database.
///
/// Console-owned fields are replaced on refresh; user-owned fields only ever
/// change through the API and survive any refresh while the key survives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cue {
    pub cue_list: u32,
    pub cue_number: String,
    pub part_number: u32,

    // Console-owned.
    pub label: String,
    pub uid: Option<Uuid>,
    pub up_time: Option<f64>,
    pub up_delay: Option<f64>,
    pub down_time: Option<f64>,
    pub down_delay: Option<f64>,
    pub focus_time: Option<f64>,
    pub focus_delay: Option<f64>,
    pub color_time: Option<f64>,
    pub color_delay: Option<f64>,
    pub beam_time: Option<f64>,
    pub beam_delay: Option<f64>,
    pub mark: String,
    pub block: String,
    #[serde(rename = "assert")]
    pub assert_flag: String,
    pub follow_time: Option<f64>,
    pub hang_time: Option<f64>,
    pub part_count: u32,
    pub scene: String,
    pub scene_end: bool,
    pub duration: f64,
    /// Fade reported by the console's active/pending text, not by cue data.
    pub fade_time: Option<f64>,

    // User-owned.
    pub notes: String,
    pub color: String,
    pub tags: Vec<String>,
    pub page: String,
    pub image_path: Option<String>,

    // Runtime-only.
    pub last_seen: Option<LastSeen>,
}

impl Default for Cue {
    fn default() -> Self {
        Self {
            cue_list: 0,
            cue_number: String::new(),
            part_number: 0,
            label: String::new(),
            uid: None,
            up_time: None,
            up_delay: None,
            down_time: None,
            down_delay: None,
            focus_time: None,
            focus_delay: None,
            color_time: None,
            color_delay: None,
            beam_time: None,
            beam_delay: None,
            mark: String::new(),
            block: String::new(),
            assert_flag: String::new(),
            follow_time: None,
            hang_time: None,
            part_count: 0,
            scene: String::new(),
            scene_end: false,
            duration: 0.0,
            fade_time: None,
            notes: String::new(),
            color: DEFAULT_CUE_COLOR.to_string(),
            tags: Vec::new(),
            page: String::new(),
            image_path: None,
            last_seen: None,
        }
    }
}

impl Cue {
    pub fn new(cue_list: u32, cue_number: impl Into<String>, part_number: u32) -> Self {
        Self {
            cue_list,
            cue_number: cue_number.into(),
            part_number,
            ..Self::default()
        }
    }

    pub fn key(&self) -> CueKey {
        CueKey {
            cue_list: self.cue_list,
            cue_number: self.cue_number.clone(),
            part_number: self.part_number,
        }
    }

    pub fn matches(&self, cue_list: u32, cue_number: &str, part_number: u32) -> bool {
        self.cue_list == cue_list
            && self.cue_number == cue_number
            && self.part_number == part_number
    }
}

/// The console-owned snapshot carried by one cue-data message.
///
/// Applying it overwrites timing and flag fields unconditionally (the console
/// may legitimately clear them), while `label` and `uid` are only written when
/// present so that an under-specified message cannot blank them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsoleCueUpdate {
    pub label: String,
    pub uid: Option<Uuid>,
    pub up_time: Option<f64>,
    pub up_delay: Option<f64>,
    pub down_time: Option<f64>,
    pub down_delay: Option<f64>,
    pub focus_time: Option<f64>,
    pub focus_delay: Option<f64>,
    pub color_time: Option<f64>,
    pub color_delay: Option<f64>,
    pub beam_time: Option<f64>,
    pub beam_delay: Option<f64>,
    pub mark: String,
    pub block: String,
    pub assert_flag: String,
    pub follow_time: Option<f64>,
    pub hang_time: Option<f64>,
    pub part_count: u32,
    pub scene: String,
    pub scene_end: bool,
    pub duration: f64,
}

impl ConsoleCueUpdate {
    pub fn apply(&self, cue: &mut Cue) {
        if !self.label.is_empty() {
            cue.label = self.label.clone();
        }
        if self.uid.is_some() {
            cue.uid = self.uid;
        }
        cue.up_time = self.up_time;
        cue.up_delay = self.up_delay;
        cue.down_time = self.down_time;
        cue.down_delay = self.down_delay;
        cue.focus_time = self.focus_time;
        cue.focus_delay = self.focus_delay;
        cue.color_time = self.color_time;
        cue.color_delay = self.color_delay;
        cue.beam_time = self.beam_time;
        cue.beam_delay = self.beam_delay;
        cue.mark = self.mark.clone();
        cue.block = self.block.clone();
        cue.assert_flag = self.assert_flag.clone();
        cue.follow_time = self.follow_time;
        cue.hang_time = self.hang_time;
        cue.part_count = self.part_count;
        cue.scene = self.scene.clone();
        cue.scene_end = self.scene_end;
        cue.duration = self.duration;
    }
}

/// Numeric cue-number ordering with decimal support ("9.5" sorts before "10").
pub fn compare_cue_numbers(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_preserves_user_fields() {
        let mut cue = Cue::new(1, "5", 0);
        cue.notes = "hello".to_string();
        cue.color = "#ff0000".to_string();
        cue.tags = vec!["act1".to_string()];
        cue.page = "12".to_string();

        ConsoleCueUpdate::default().apply(&mut cue);

        assert_eq!(cue.notes, "hello");
        assert_eq!(cue.color, "#ff0000");
        assert_eq!(cue.tags, vec!["act1".to_string()]);
        assert_eq!(cue.page, "12");
    }

    #[test]
    fn empty_label_does_not_blank_existing() {
        let mut cue = Cue::new(1, "5", 0);
        cue.label = "Blackout".to_string();
        ConsoleCueUpdate::default().apply(&mut cue);
        assert_eq!(cue.label, "Blackout");
    }

    #[test]
    fn timing_fields_are_cleared_when_console_clears_them() {
        let mut cue = Cue::new(1, "5", 0);
        cue.up_time = Some(3.0);
        cue.follow_time = Some(1.5);
        ConsoleCueUpdate::default().apply(&mut cue);
        assert_eq!(cue.up_time, None);
        assert_eq!(cue.follow_time, None);
    }

    #[test]
    fn cue_number_ordering_is_numeric() {
        use std::cmp::Ordering;
        assert_eq!(compare_cue_numbers("9.5", "10"), Ordering::Less);
        assert_eq!(compare_cue_numbers("2", "10"), Ordering::Less);
        assert_eq!(compare_cue_numbers("5.1", "5.10"), Ordering::Equal);
    }
}
