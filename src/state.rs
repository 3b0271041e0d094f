//! Application state: the content source and the learner state loaded from
//! the persistent store.
//!
//! This module owns:
//!   - the content source (OpenAI-backed, or `Unconfigured` without a key)
//!   - opening the key-value store (JSON files under DATA_DIR, memory as fallback)
//!   - the practice history log and the preferences, both read once at startup
//!
//! Controllers do not live here: each WebSocket session owns its own.

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use std::sync::Arc;

use crate::config::{data_dir_from_env, load_agent_config_from_env};
use crate::content::{content_from_env, SharedContent};
use crate::history::HistoryLog;
use crate::prefs::Preferences;
use crate::store::{JsonFileStore, MemoryStore, SharedStore};

pub struct AppState {
    pub content: SharedContent,
    pub history: RwLock<HistoryLog>,
    pub prefs: RwLock<Preferences>,
}

impl AppState {
    /// Build state from env: load prompt overrides, pick the content source, open the store.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let prompts = load_agent_config_from_env()
            .map(|c| c.prompts)
            .unwrap_or_default();

        let content = content_from_env(prompts);
        if content.is_configured() {
            info!(target: "practica_valencia", "OpenAI enabled.");
        } else {
            warn!(target: "practica_valencia", "OpenAI disabled (no OPENAI_API_KEY). Content requests will fail until a key is configured.");
        }

        let data_dir = data_dir_from_env();
        let store: SharedStore = match JsonFileStore::with_base_dir(data_dir.clone()) {
            Ok(s) => {
                info!(target: "practica_valencia", dir = %data_dir.display(), "Using JSON file store");
                Arc::new(s)
            }
            Err(e) => {
                warn!(target: "practica_valencia", dir = %data_dir.display(), error = %e, "Cannot open data dir; keeping state in memory only");
                Arc::new(MemoryStore::new())
            }
        };

        Self::with_parts(content, store)
    }

    /// Assemble state from explicit parts (tests, embedding).
    pub fn with_parts(content: SharedContent, store: SharedStore) -> Self {
        let history = HistoryLog::load(store.clone());
        let prefs = Preferences::load(store);
        Self {
            content,
            history: RwLock::new(history),
            prefs: RwLock::new(prefs),
        }
    }
}
