use crate::config::KioskConfig;
use crate::error::StorageError;
use crate::kiosk::storage::Persistence;
use crate::kiosk::types::DisplayState;
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads and saves display snapshots. Persistence is best effort: every
/// failure is logged and the caller keeps its in-memory state.
#[derive(Clone)]
pub struct StateStore {
    persistence: Persistence,
    config: Arc<KioskConfig>,
}

impl StateStore {
    pub fn new(persistence: Persistence, config: Arc<KioskConfig>) -> Self {
        Self {
            persistence,
            config,
        }
    }

    /// Stored snapshot for `display_id`, or the configured defaults when
    /// nothing usable is stored.
    pub fn load(&self, display_id: &str) -> DisplayState {
        let raw = match self.persistence.get(display_id) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No stored state for {}, using defaults", display_id);
                return self.create_default(display_id);
            }
            Err(e) => {
                warn!("Failed to read state for {}: {}", display_id, e);
                return self.create_default(display_id);
            }
        };

        match serde_json::from_str::<DisplayState>(&raw) {
            Ok(mut state) if state.display_id == display_id => {
                if state.normalize() {
                    warn!("Stored slide index for {} out of range, clamped", display_id);
                }
                state
            }
            Ok(state) => {
                warn!(
                    "Stored state under {} belongs to {}, using defaults",
                    display_id, state.display_id
                );
                self.create_default(display_id)
            }
            Err(e) => {
                warn!("Stored state for {} is unreadable: {}", display_id, e);
                self.create_default(display_id)
            }
        }
    }

    pub fn save(&self, state: &DisplayState) {
        if let Err(e) = self.try_save(state) {
            warn!("Failed to save state for {}: {}", state.display_id, e);
        }
    }

    pub fn try_save(&self, state: &DisplayState) -> Result<(), StorageError> {
        let raw =
            serde_json::to_string(state).map_err(|e| StorageError::Serialize(e.to_string()))?;
        self.persistence.put(&state.display_id, &raw)
    }

    pub fn create_default(&self, display_id: &str) -> DisplayState {
        DisplayState::new_default(display_id, &self.config)
    }

    pub fn config(&self) -> &Arc<KioskConfig> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kiosk::storage::{
        DisabledStore, JsonFileStore, KeyValueStore, MemoryStore, StorageMedium,
    };
    use crate::kiosk::types::{DisplayMode, Sponsor};
    use uuid::Uuid;

    fn store_with(backend: Box<dyn KeyValueStore>) -> (StateStore, Arc<StorageMedium>) {
        let config = Arc::new(KioskConfig::default());
        let medium = Arc::new(StorageMedium::new(backend));
        let persistence =
            Persistence::new(medium.clone(), config.storage_key_prefix.clone(), Uuid::new_v4());
        (StateStore::new(persistence, config), medium)
    }

    #[test]
    fn test_load_without_save_returns_defaults() {
        let (store, _) = store_with(Box::new(MemoryStore::new()));
        for id in ["tv1", "tv2", "tv3", "tv4"] {
            let state = store.load(id);
            assert_eq!(state.display_id, id);
            assert_eq!(state.mode, DisplayMode::PrimaryFeed);
            assert_eq!(state.current_slide_index, 0);
            assert_eq!(state.sponsors, store.config().sponsors);
        }
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let (store, _) = store_with(Box::new(MemoryStore::new()));
        let mut state = store.create_default("tv2");
        state.mode = DisplayMode::SecondaryFeed;
        state.sponsors = Sponsor::sequence_from_urls(["https://x/a.png"]);
        state.secondary_feed_url = "https://x/live".to_string();
        state.transitioning = None;

        store.save(&state);
        assert_eq!(store.load("tv2"), state);
    }

    #[test]
    fn test_unparseable_snapshot_falls_back_to_defaults() {
        let (store, medium) = store_with(Box::new(MemoryStore::new()));
        medium
            .put(Uuid::new_v4(), "kiosk-state-tv1", "{definitely not state")
            .unwrap();
        let state = store.load("tv1");
        assert_eq!(state.mode, DisplayMode::PrimaryFeed);
        assert_eq!(state.display_id, "tv1");
    }

    #[test]
    fn test_snapshot_for_other_display_is_ignored() {
        let (store, medium) = store_with(Box::new(MemoryStore::new()));
        let mut foreign = store.create_default("tv2");
        foreign.mode = DisplayMode::SponsorShowcase;
        medium
            .put(
                Uuid::new_v4(),
                "kiosk-state-tv1",
                &serde_json::to_string(&foreign).unwrap(),
            )
            .unwrap();

        let state = store.load("tv1");
        assert_eq!(state.display_id, "tv1");
        assert_eq!(state.mode, DisplayMode::PrimaryFeed);
    }

    #[test]
    fn test_out_of_range_slide_index_is_clamped_on_load() {
        let (store, medium) = store_with(Box::new(MemoryStore::new()));
        let mut stored = store.create_default("tv1");
        stored.current_slide_index = usize::MAX;
        medium
            .put(
                Uuid::new_v4(),
                "kiosk-state-tv1",
                &serde_json::to_string(&stored).unwrap(),
            )
            .unwrap();

        let state = store.load("tv1");
        assert_eq!(state.current_slide_index, state.sponsors.len() - 1);
    }

    #[test]
    fn test_similar_ids_persist_independently_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let (store, _) = store_with(Box::new(JsonFileStore::open(dir.path()).unwrap()));

        let mut dotted = store.create_default("tv.1");
        dotted.mode = DisplayMode::SponsorShowcase;
        store.save(&dotted);

        let mut underscored = store.create_default("tv_1");
        underscored.slide_duration_seconds = 9;
        store.save(&underscored);

        assert_eq!(store.load("tv.1"), dotted);
        assert_eq!(store.load("tv_1"), underscored);
    }

    #[test]
    fn test_unavailable_medium_is_not_fatal() {
        let (store, _) = store_with(Box::new(DisabledStore));
        let state = store.create_default("tv3");
        store.save(&state);
        assert_eq!(store.try_save(&state), Err(StorageError::Unavailable));
        assert_eq!(store.load("tv3").display_id, "tv3");
    }
}
