use log::{debug, warn};
use shared::ThemeMode;
use std::sync::Arc;

use crate::storage::{KeyValueStorage, StorageKey};

/// Persists the user's theme preference
#[derive(Clone)]
pub struct ThemeService {
    storage: Arc<dyn KeyValueStorage>,
}

impl ThemeService {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self { storage }
    }

    /// Stored theme mode, or `None` when nothing usable is stored
    pub async fn get_theme_mode(&self) -> Option<ThemeMode> {
        let stored = match self.storage.get_value(StorageKey::ThemeMode.as_str()).await {
            Ok(stored) => stored?,
            Err(e) => {
                warn!("Failed to read theme mode: {}", e);
                return None;
            }
        };

        match stored.parse::<ThemeMode>() {
            Ok(mode) => Some(mode),
            Err(e) => {
                debug!("Ignoring stored theme mode '{}': {}", stored, e);
                None
            }
        }
    }

    pub async fn save_theme_mode(&self, mode: ThemeMode) {
        if let Err(e) = self
            .storage
            .put_value(StorageKey::ThemeMode.as_str(), mode.as_str())
            .await
        {
            warn!("Failed to save theme mode '{}': {}", mode.as_str(), e);
        }
    }
}
