//! User preferences: default league, matcher thresholds and favourite teams.
//!
//! Settings are a plain value passed to whoever needs them and persisted
//! through a [`KeyValueStore`], so the storage backend can be swapped (SQLite
//! in the binary, memory in tests).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::services::{DEFAULT_THRESHOLD, IMPORT_THRESHOLD};

const SETTINGS_KEY: &str = "settings";

/// League used when neither the caller nor the stored settings name one.
pub const FALLBACK_LEAGUE: &str = "winmix";

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: tokio::sync::RwLock<std::collections::HashMap<String, String>>,
}

#[cfg(test)]
#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub default_league: Option<String>,
    #[serde(default = "default_import_threshold")]
    pub import_threshold: f64,
    #[serde(default = "default_match_threshold")]
    pub match_threshold: f64,
    #[serde(default)]
    pub favorite_teams: Vec<String>,
}

fn default_import_threshold() -> f64 {
    IMPORT_THRESHOLD
}

fn default_match_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_league: None,
            import_threshold: default_import_threshold(),
            match_threshold: default_match_threshold(),
            favorite_teams: Vec::new(),
        }
    }
}

impl Settings {
    /// Stored settings, or defaults when nothing usable is stored.
    pub async fn load(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get(SETTINGS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(e) => {
                tracing::warn!("Could not read settings, using defaults: {}", e);
                return Self::default();
            }
        };

        match serde_json::from_str::<Settings>(&raw) {
            Ok(settings) => settings.sanitized(),
            Err(e) => {
                tracing::warn!("Stored settings are not valid JSON, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// `requested`, else the stored default league, else [`FALLBACK_LEAGUE`].
    pub fn league_or_default(&self, requested: Option<String>) -> String {
        requested
            .filter(|l| !l.trim().is_empty())
            .or_else(|| self.default_league.clone())
            .unwrap_or_else(|| FALLBACK_LEAGUE.to_string())
    }

    pub async fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        let json = serde_json::to_string(&self.clone().sanitized())?;
        store.set(SETTINGS_KEY, &json).await
    }

    fn sanitized(mut self) -> Self {
        self.import_threshold = clamp_threshold(self.import_threshold, IMPORT_THRESHOLD);
        self.match_threshold = clamp_threshold(self.match_threshold, DEFAULT_THRESHOLD);
        let mut seen = Vec::new();
        self.favorite_teams.retain(|name| {
            let key = name.trim().to_lowercase();
            if key.is_empty() || seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        self
    }

    pub fn set_import_threshold(&mut self, value: f64) {
        self.import_threshold = clamp_threshold(value, IMPORT_THRESHOLD);
    }

    pub fn set_match_threshold(&mut self, value: f64) {
        self.match_threshold = clamp_threshold(value, DEFAULT_THRESHOLD);
    }

    pub fn is_favorite(&self, team: &str) -> bool {
        let key = team.trim().to_lowercase();
        self.favorite_teams.iter().any(|f| f.to_lowercase() == key)
    }

    /// Returns false when the team was already a favourite.
    pub fn add_favorite(&mut self, team: &str) -> bool {
        let team = team.trim();
        if team.is_empty() || self.is_favorite(team) {
            return false;
        }
        self.favorite_teams.push(team.to_string());
        true
    }

    pub fn remove_favorite(&mut self, team: &str) -> bool {
        let key = team.trim().to_lowercase();
        let before = self.favorite_teams.len();
        self.favorite_teams.retain(|f| f.to_lowercase() != key);
        self.favorite_teams.len() != before
    }
}

fn clamp_threshold(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_returns_defaults_when_missing() {
        let store = MemoryKeyValueStore::default();
        let settings = Settings::load(&store).await;
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.import_threshold, 0.6);
        assert_eq!(settings.match_threshold, 0.7);
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let store = MemoryKeyValueStore::default();
        let mut settings = Settings::default();
        settings.default_league = Some("winmix".to_string());
        settings.set_import_threshold(0.75);
        settings.add_favorite("Real Madrid");
        settings.save(&store).await.unwrap();

        let loaded = Settings::load(&store).await;
        assert_eq!(loaded, settings);
    }

    #[tokio::test]
    async fn test_load_merges_with_defaults() {
        let store = MemoryKeyValueStore::default();
        store
            .set(SETTINGS_KEY, r#"{"default_league": "EPL", "import_threshold": 4.0}"#)
            .await
            .unwrap();
        let loaded = Settings::load(&store).await;
        assert_eq!(loaded.default_league.as_deref(), Some("EPL"));
        assert_eq!(loaded.import_threshold, 1.0);
        assert_eq!(loaded.match_threshold, 0.7);
    }

    #[tokio::test]
    async fn test_corrupt_settings_fall_back_to_defaults() {
        let store = MemoryKeyValueStore::default();
        store.set(SETTINGS_KEY, "{not json").await.unwrap();
        assert_eq!(Settings::load(&store).await, Settings::default());
    }

    #[test]
    fn test_favorites_are_case_insensitive() {
        let mut settings = Settings::default();
        assert!(settings.add_favorite("Barcelona"));
        assert!(!settings.add_favorite("  barcelona "));
        assert!(settings.is_favorite("BARCELONA"));
        assert!(settings.remove_favorite("barcelona"));
        assert!(!settings.remove_favorite("barcelona"));
        assert!(settings.favorite_teams.is_empty());
    }

    #[test]
    fn test_league_resolution_order() {
        let mut settings = Settings::default();
        assert_eq!(settings.league_or_default(None), "winmix");
        settings.default_league = Some("EPL".to_string());
        assert_eq!(settings.league_or_default(None), "EPL");
        assert_eq!(settings.league_or_default(Some(" ".to_string())), "EPL");
        assert_eq!(settings.league_or_default(Some("winmix".to_string())), "winmix");
    }

    #[test]
    fn test_threshold_clamping() {
        let mut settings = Settings::default();
        settings.set_match_threshold(-1.0);
        assert_eq!(settings.match_threshold, 0.0);
        settings.set_import_threshold(f64::NAN);
        assert_eq!(settings.import_threshold, 0.6);
    }
}
