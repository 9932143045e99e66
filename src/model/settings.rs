use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SHOW_NAME: &str = "Default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Udp,
    Tcp,
}

/// Transport parameters for reaching the console.
///
/// Field names match the on-disk `global_settings.json` layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OscSettings {
    pub ip_address: String,
    pub port: u16,
    pub osc_version: String,
    pub protocol: Protocol,
}

impl Default for OscSettings {
    fn default() -> Self {
        Self {
            ip_address: "127.0.0.1".to_string(),
            port: 8000,
            osc_version: "1.1".to_string(),
            protocol: Protocol::Udp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalSettings {
    pub last_show_name: String,
    /// Cue list bound to fader 0, kept as the console reports it.
    pub main_playback_list: Option<String>,
    pub osc_settings: OscSettings,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            last_show_name: DEFAULT_SHOW_NAME.to_string(),
            main_playback_list: None,
            osc_settings: OscSettings::default(),
        }
    }
}

impl GlobalSettings {
    pub fn main_list(&self) -> Option<u32> {
        self.main_playback_list.as_deref()?.parse().ok()
    }
}

pub async fn load(path: &Path) -> GlobalSettings {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::error!("Unreadable settings file {}: {}", path.display(), e);
            GlobalSettings::default()
        }),
        Err(_) => GlobalSettings::default(),
    }
}

pub async fn save(path: &Path, settings: &GlobalSettings) -> Result<(), anyhow::Error> {
    let content = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write settings to {}", path.display()))?;
    Ok(())
}
