use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{
    cue::{compare_cue_numbers, ConsoleCueUpdate, Cue, LastSeen},
    timing::ShowTimings,
};

pub mod cue;
pub mod settings;
pub mod timing;

/// User metadata attached to a scene name (`scene-data.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SceneMeta {
    pub notes: String,
    pub color: String,
}

/// Body of `show_notes.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowNotes {
    pub notes: String,
}

/// The complete in-memory state of one show.
///
/// The console is authoritative for cue existence and console-owned fields;
/// everything else here belongs to the user and is persisted per show.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ShowModel {
    pub name: String,
    pub cues: Vec<Cue>,
    pub notes: String,
    pub timings: ShowTimings,
    pub scenes: BTreeMap<String, SceneMeta>,
    pub tag_colors: BTreeMap<String, String>,
}

impl ShowModel {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn find_cue(&self, cue_list: u32, cue_number: &str, part_number: u32) -> Option<&Cue> {
        self.cues
            .iter()
            .find(|c| c.matches(cue_list, cue_number, part_number))
    }

    pub fn find_cue_mut(
        &mut self,
        cue_list: u32,
        cue_number: &str,
        part_number: u32,
    ) -> Option<&mut Cue> {
        self.cues
            .iter_mut()
            .find(|c| c.matches(cue_list, cue_number, part_number))
    }

    pub fn cues_in_list(&self, cue_list: u32) -> impl Iterator<Item = &Cue> {
        self.cues.iter().filter(move |c| c.cue_list == cue_list)
    }

    /// Merge one console cue snapshot into the store.
    ///
    /// Creates the record (user fields at defaults) when the key is new, and a
    /// synthetic part-0 stub when a part arrives before its parent.
    pub fn upsert_console(
        &mut self,
        cue_list: u32,
        cue_number: &str,
        part_number: u32,
        update: &ConsoleCueUpdate,
    ) {
        if part_number > 0 && self.find_cue(cue_list, cue_number, 0).is_none() {
            self.cues.push(Cue::new(cue_list, cue_number, 0));
        }
        match self.find_cue_mut(cue_list, cue_number, part_number) {
            Some(cue) => update.apply(cue),
            None => {
                let mut cue = Cue::new(cue_list, cue_number, part_number);
                update.apply(&mut cue);
                self.cues.push(cue);
            }
        }
        self.sort_cues();
    }

    /// Drop every cue of `cue_list` whose number is not in `kept_numbers`.
    /// Cues in other lists are untouched.
    pub fn evict(&mut self, cue_list: u32, kept_numbers: &HashSet<String>) -> usize {
        let before = self.cues.len();
        self.cues
            .retain(|c| c.cue_list != cue_list || kept_numbers.contains(&c.cue_number));
        before - self.cues.len()
    }

    /// Move the active/pending marker of `state` within one list.
    ///
    /// Clears the marker on every cue of the list first, so at most one cue
    /// per list carries it. Unknown cues get a stub record.
    pub fn mark_last_seen(&mut self, cue_list: u32, cue_number: &str, state: LastSeen) {
        self.clear_last_seen(cue_list, state);
        match self.find_cue_mut(cue_list, cue_number, 0) {
            Some(cue) => cue.last_seen = Some(state),
            None => {
                let mut stub = Cue::new(cue_list, cue_number, 0);
                stub.last_seen = Some(state);
                self.cues.push(stub);
                self.sort_cues();
            }
        }
    }

    /// Clear the `state` marker on every cue of one list, other lists untouched.
    pub fn clear_last_seen(&mut self, cue_list: u32, state: LastSeen) {
        for cue in self
            .cues
            .iter_mut()
            .filter(|c| c.cue_list == cue_list && c.last_seen == Some(state))
        {
            cue.last_seen = None;
        }
    }

    pub fn active_cue(&self, cue_list: u32) -> Option<&Cue> {
        self.cues
            .iter()
            .find(|c| c.cue_list == cue_list && c.last_seen == Some(LastSeen::Active))
    }

    /// Sort by numeric list, then numeric cue number, then part.
    pub fn sort_cues(&mut self) {
        self.cues.sort_by(|a, b| {
            a.cue_list
                .cmp(&b.cue_list)
                .then_with(|| compare_cue_numbers(&a.cue_number, &b.cue_number))
                .then_with(|| a.part_number.cmp(&b.part_number))
        });
    }
}
