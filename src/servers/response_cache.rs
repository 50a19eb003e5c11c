//! Bounded LRU of recent recommendations.
//!
//! Keys combine the validated game state with the versions of every model
//! the answer depends on, so activating or rolling back a model makes older
//! entries unreachable without any explicit invalidation.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::decision::{DecisionResult, ModelSnapshot};
use crate::game::GameState;

#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: Option<Arc<Mutex<LruCache<String, DecisionResult>>>>,
}

impl ResponseCache {
    /// A capacity of 0 disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: NonZeroUsize::new(capacity).map(|c| Arc::new(Mutex::new(LruCache::new(c)))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Cache key of `state` scored against `snapshot`; `None` when disabled.
    pub fn key(&self, snapshot: &ModelSnapshot, state: &GameState, stale: bool) -> Option<String> {
        self.entries.as_ref()?;
        let state_json = match serde_json::to_string(state) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("⚠️ Uncacheable game state: {}", e);
                return None;
            }
        };
        let classifier = snapshot.classifier();
        let regressor = snapshot
            .regressor()
            .map(|r| format!("{}@{}", r.name(), r.version()))
            .unwrap_or_default();
        Some(format!(
            "{}@{}|{}|{}|{}",
            classifier.name(),
            classifier.version(),
            regressor,
            stale,
            state_json
        ))
    }

    pub fn get(&self, key: &str) -> Option<DecisionResult> {
        let entries = self.entries.as_ref()?;
        let mut cache = entries.lock().unwrap_or_else(|p| p.into_inner());
        cache.get(key).cloned()
    }

    pub fn put(&self, key: String, result: DecisionResult) {
        if let Some(entries) = &self.entries {
            let mut cache = entries.lock().unwrap_or_else(|p| p.into_inner());
            cache.put(key, result);
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .as_ref()
            .map(|e| e.lock().unwrap_or_else(|p| p.into_inner()).len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{DecisionEngine, DecisionPolicy};
    use crate::game::PlayCall;
    use crate::models::artifact::tests::{constant_classifier, constant_regressor};
    use crate::registry::ModelRegistry;

    fn setup() -> (Arc<ModelRegistry>, DecisionEngine, GameState) {
        let registry = Arc::new(ModelRegistry::default());
        registry
            .activate("fourth_down", constant_classifier("fourth_down", "v1", PlayCall::Go, 2.0))
            .unwrap();
        let engine = DecisionEngine::new(Arc::clone(&registry), DecisionPolicy::default());
        let state = GameState::builder(4, 2, 40).build().unwrap();
        (registry, engine, state)
    }

    #[test]
    fn test_disabled_cache_has_no_keys() {
        let (_, engine, state) = setup();
        let cache = ResponseCache::new(0);
        assert!(!cache.is_enabled());
        assert!(cache.key(&engine.snapshot(None).unwrap(), &state, false).is_none());
    }

    #[test]
    fn test_keys_track_model_versions() {
        let (registry, engine, state) = setup();
        let cache = ResponseCache::new(8);
        let first = cache.key(&engine.snapshot(None).unwrap(), &state, false).unwrap();
        assert_eq!(cache.key(&engine.snapshot(None).unwrap(), &state, false).unwrap(), first);
        assert_ne!(cache.key(&engine.snapshot(None).unwrap(), &state, true).unwrap(), first);

        registry
            .activate("expected_points", constant_regressor("expected_points", "v1", 1.0))
            .unwrap();
        let with_regressor = cache.key(&engine.snapshot(None).unwrap(), &state, false).unwrap();
        assert_ne!(with_regressor, first);

        registry
            .activate("fourth_down", constant_classifier("fourth_down", "v2", PlayCall::Punt, 2.0))
            .unwrap();
        assert_ne!(cache.key(&engine.snapshot(None).unwrap(), &state, false).unwrap(), with_regressor);
    }

    #[test]
    fn test_least_recently_used_entry_is_evicted() {
        let (_, engine, _) = setup();
        let snapshot = engine.snapshot(None).unwrap();
        let cache = ResponseCache::new(2);
        let states: Vec<GameState> = (30..33).map(|y| GameState::builder(4, 1, y).build().unwrap()).collect();
        let keys: Vec<String> = states.iter().map(|s| cache.key(&snapshot, s, false).unwrap()).collect();

        for (key, state) in keys.iter().zip(&states) {
            cache.put(key.clone(), engine.decide_with(state, &snapshot).unwrap());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&keys[0]).is_none());
        assert_eq!(cache.get(&keys[2]).unwrap().model_version, "v1");
    }
}
