//! Player settings
//!
//! Language preferences and the preferred-codec lists the builder
//! consults when assembling a graph. Stored as JSON in the user's
//! config directory; a missing or unreadable file falls back to
//! defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Two-letter code, e.g. "en".
    pub preferred_audio_language: String,
    /// Also used for disc menu and subpicture language.
    pub preferred_subtitle_language: String,
    pub enable_subtitles: bool,
    /// Preferred video decoder names, most preferred first.
    pub preferred_video_codecs: Vec<String>,
    /// Preferred audio decoder names, most preferred first.
    pub preferred_audio_codecs: Vec<String>,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            preferred_audio_language: "en".to_string(),
            preferred_subtitle_language: "en".to_string(),
            enable_subtitles: true,
            preferred_video_codecs: Vec::new(),
            preferred_audio_codecs: Vec::new(),
        }
    }
}

impl PlayerSettings {
    pub fn load() -> Self {
        Self::load_from(&settings_file_path())
    }

    pub fn load_from(path: &PathBuf) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("settings file unreadable, using defaults: {}", e);
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("could not read settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<(), String> {
        self.save_to(&settings_file_path())
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create directory: {}", e))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
    }
}

fn settings_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hearth")
        .join("settings.json")
}
