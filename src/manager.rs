use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{mpsc, RwLock};

use crate::model::{settings::DEFAULT_SHOW_NAME, ShowModel, ShowNotes};

const CUES_FILE: &str = "cues.json";
const NOTES_FILE: &str = "show_notes.json";
const TIMINGS_FILE: &str = "show_timings.json";
const SCENES_FILE: &str = "scene-data.json";
const TAG_COLORS_FILE: &str = "tag-colors.json";
pub const SETTINGS_FILE: &str = "global_settings.json";

const PERSIST_DEBOUNCE: Duration = Duration::from_secs(1);

/// Characters kept verbatim in a show directory name; everything else is
/// percent-encoded. Matches what old data directories were written with, so
/// decode(encode(name)) round-trips for any show name.
const SHOW_DIR_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*');

pub fn encode_show_name(name: &str) -> String {
    utf8_percent_encode(name, SHOW_DIR_KEEP).to_string()
}

pub fn decode_show_name(dir_name: &str) -> String {
    percent_decode_str(dir_name).decode_utf8_lossy().to_string()
}

/// Which slice of the show to write. Each kind maps to one file of the show
/// directory, so unrelated edits do not rewrite each other's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistKind {
    Cues,
    ShowNotes,
    Timings,
    Scenes,
    TagColors,
}

impl PersistKind {
    const ALL: [PersistKind; 5] = [
        PersistKind::Cues,
        PersistKind::ShowNotes,
        PersistKind::Timings,
        PersistKind::Scenes,
        PersistKind::TagColors,
    ];
}

/// Shared handle to the current show plus its on-disk home.
///
/// All mutation funnels through the controller task via `write_with`; the
/// persister task only ever reads snapshots taken under the lock.
#[derive(Clone)]
pub struct ShowManager {
    state: Arc<RwLock<ShowModel>>,
    data_dir: PathBuf,
    persist_tx: mpsc::UnboundedSender<PersistKind>,
}

impl ShowManager {
    pub fn new(data_dir: PathBuf) -> (Self, mpsc::UnboundedReceiver<PersistKind>) {
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(RwLock::new(ShowModel::named(DEFAULT_SHOW_NAME))),
                data_dir,
                persist_tx,
            },
            persist_rx,
        )
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub async fn read(&self) -> tokio::sync::RwLockReadGuard<'_, ShowModel> {
        self.state.read().await
    }

    pub async fn write_with<F, R>(&self, updater: F) -> R
    where
        F: FnOnce(&mut ShowModel) -> R,
    {
        let mut guard = self.state.write().await;
        updater(&mut guard)
    }

    /// Queue a debounced write; writes within one second are coalesced.
    pub fn persist(&self, kind: PersistKind) {
        if self.persist_tx.send(kind).is_err() {
            log::warn!("Persister is gone; {:?} not scheduled", kind);
        }
    }

    /// Debounce loop. Spawned once at startup.
    pub async fn run_persister(self, mut persist_rx: mpsc::UnboundedReceiver<PersistKind>) {
        log::info!("Persister started for {}", self.data_dir.display());
        while let Some(first) = persist_rx.recv().await {
            tokio::time::sleep(PERSIST_DEBOUNCE).await;
            let mut pending: HashSet<PersistKind> = HashSet::new();
            pending.insert(first);
            while let Ok(kind) = persist_rx.try_recv() {
                pending.insert(kind);
            }
            for kind in pending {
                if let Err(e) = self.persist_now(kind).await {
                    log::error!("Persist {:?} failed: {:?}", kind, e);
                }
            }
        }
        log::info!("Persister finished.");
    }

    /// Immediate durable write of one slice, for mutations that must hit disk
    /// before the caller is answered.
    pub async fn persist_now(&self, kind: PersistKind) -> Result<(), anyhow::Error> {
        let guard = self.read().await;
        let dir = self.data_dir.join(encode_show_name(&guard.name));
        match kind {
            PersistKind::Cues => {
                let cues = guard.cues.clone();
                drop(guard);
                write_json(dir.join(CUES_FILE), cues).await
            }
            PersistKind::ShowNotes => {
                let notes = ShowNotes {
                    notes: guard.notes.clone(),
                };
                drop(guard);
                write_json(dir.join(NOTES_FILE), notes).await
            }
            PersistKind::Timings => {
                let timings = guard.timings.clone();
                drop(guard);
                write_json(dir.join(TIMINGS_FILE), timings).await
            }
            PersistKind::Scenes => {
                let scenes = guard.scenes.clone();
                drop(guard);
                write_json(dir.join(SCENES_FILE), scenes).await
            }
            PersistKind::TagColors => {
                let tag_colors = guard.tag_colors.clone();
                drop(guard);
                write_json(dir.join(TAG_COLORS_FILE), tag_colors).await
            }
        }
    }

    pub async fn persist_all_now(&self) -> Result<(), anyhow::Error> {
        for kind in PersistKind::ALL {
            self.persist_now(kind).await?;
        }
        Ok(())
    }

    /// Load a show from disk into memory, creating it empty if unknown.
    /// A file that fails to parse resets that slice only, it never aborts.
    pub async fn load_show(&self, name: &str) -> Result<(), anyhow::Error> {
        let dir = self.data_dir.join(encode_show_name(name));
        let mut model = ShowModel::named(name);
        model.cues = read_json(dir.join(CUES_FILE)).await;
        model.notes = read_json::<ShowNotes>(dir.join(NOTES_FILE)).await.notes;
        model.timings = read_json(dir.join(TIMINGS_FILE)).await;
        model.scenes = read_json(dir.join(SCENES_FILE)).await;
        model.tag_colors = read_json(dir.join(TAG_COLORS_FILE)).await;
        model.sort_cues();

        self.write_with(|state| *state = model).await;
        log::info!("Show loaded: {}", name);
        Ok(())
    }

    /// Persist the current show, then swap the whole in-memory model.
    pub async fn switch_show(&self, name: &str) -> Result<(), anyhow::Error> {
        if let Err(e) = self.persist_all_now().await {
            log::error!("Could not persist outgoing show: {:?}", e);
        }
        self.load_show(name).await
    }

    pub async fn current_show_name(&self) -> String {
        self.read().await.name.clone()
    }

    /// Every show present on disk, by decoded name.
    pub async fn list_shows(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.data_dir).await else {
            return names;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                names.push(decode_show_name(&entry.file_name().to_string_lossy()));
            }
        }
        names.sort();
        names
    }

    /// One-time layout fixups, run before the first show is loaded:
    /// pre-show-era files at the data root move under the default show, and
    /// directory names written before encoding was introduced are re-encoded.
    pub async fn migrate_data_layout(&self) -> Result<(), anyhow::Error> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;

        let default_dir = self.data_dir.join(encode_show_name(DEFAULT_SHOW_NAME));
        for file in [CUES_FILE, NOTES_FILE, TIMINGS_FILE] {
            let legacy = self.data_dir.join(file);
            if tokio::fs::try_exists(&legacy).await.unwrap_or(false) {
                tokio::fs::create_dir_all(&default_dir).await?;
                tokio::fs::rename(&legacy, default_dir.join(file)).await?;
                log::info!("Migrated legacy {} into {}", file, default_dir.display());
            }
        }

        let mut entries = tokio::fs::read_dir(&self.data_dir).await?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            if !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().to_string();
            let canonical = encode_show_name(&decode_show_name(&dir_name));
            if canonical != dir_name {
                let target = self.data_dir.join(&canonical);
                if tokio::fs::try_exists(&target).await.unwrap_or(true) {
                    log::warn!("Not migrating {dir_name}: {canonical} already exists");
                    continue;
                }
                tokio::fs::rename(entry.path(), &target).await?;
                log::info!("Re-encoded show directory {dir_name} as {canonical}");
            }
        }
        Ok(())
    }
}

async fn write_json<T>(path: PathBuf, value: T) -> Result<(), anyhow::Error>
where
    T: Serialize + Send + 'static,
{
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = tokio::task::spawn_blocking(move || serde_json::to_string_pretty(&value)).await??;
    tokio::fs::write(&path, content)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Tolerant read: a missing or unparsable file yields the default value.
async fn read_json<T: DeserializeOwned + Default>(path: PathBuf) -> T {
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::error!("Resetting unreadable {}: {}", path.display(), e);
            T::default()
        }),
        Err(_) => T::default(),
    }
}
