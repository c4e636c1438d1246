//! Per-cycle scratch space shared by plugins.
//!
//! A fresh [`CycleState`] is created for every scheduling attempt and
//! threaded through every plugin call of that attempt. Plugins write
//! intermediate results under string keys in one stage (typically
//! pre-filter or pre-score) and read them back in later stages.
//!
//! Score plugins run concurrently across nodes, so every accessor takes
//! `&self` and synchronises internally.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{StateError, StateResult};

type StateData = Arc<dyn Any + Send + Sync>;

/// Key/value store scoped to one scheduling attempt.
#[derive(Default)]
pub struct CycleState {
    storage: RwLock<HashMap<String, StateData>>,
    skip_filter_plugins: RwLock<HashSet<String>>,
    skip_score_plugins: RwLock<HashSet<String>>,
    record_plugin_metrics: AtomicBool,
}

impl CycleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the value stored under `key` as a `T`.
    pub fn read<T: Any + Send + Sync>(&self, key: &str) -> StateResult<Arc<T>> {
        let data = self
            .storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::NotFound(key.to_string()))?;

        data.downcast::<T>().map_err(|_| StateError::TypeMismatch {
            key: key.to_string(),
        })
    }

    /// Store `value` under `key`, replacing any previous value.
    pub fn write<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) {
        self.storage
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), Arc::new(value));
    }

    pub fn delete(&self, key: &str) {
        self.storage
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Shallow copy: values are shared, the maps are not.
    pub fn clone_state(&self) -> Self {
        let storage = self
            .storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Self {
            storage: RwLock::new(storage),
            skip_filter_plugins: RwLock::new(read_set(&self.skip_filter_plugins)),
            skip_score_plugins: RwLock::new(read_set(&self.skip_score_plugins)),
            record_plugin_metrics: AtomicBool::new(self.record_plugin_metrics()),
        }
    }

    // ── Skip sets ──────────────────────────────────────────────────

    /// Mark a filter plugin as skipped for the rest of the cycle.
    pub fn skip_filter_plugin(&self, name: impl Into<String>) {
        self.skip_filter_plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }

    pub fn should_skip_filter(&self, name: &str) -> bool {
        self.skip_filter_plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    /// Mark a score plugin as skipped for the rest of the cycle.
    pub fn skip_score_plugin(&self, name: impl Into<String>) {
        self.skip_score_plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }

    pub fn should_skip_score(&self, name: &str) -> bool {
        self.skip_score_plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    // ── Metrics sampling ───────────────────────────────────────────

    pub fn set_record_plugin_metrics(&self, record: bool) {
        self.record_plugin_metrics.store(record, Ordering::Relaxed);
    }

    /// Whether per-plugin durations are reported for this cycle.
    pub fn record_plugin_metrics(&self) -> bool {
        self.record_plugin_metrics.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .storage
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("CycleState").field("keys", &keys).finish()
    }
}

fn read_set(set: &RwLock<HashSet<String>>) -> HashSet<String> {
    set.read().unwrap_or_else(PoisonError::into_inner).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Request {
        memory: u64,
    }

    #[test]
    fn write_then_read() {
        let state = CycleState::new();
        state.write("req", Request { memory: 128 });

        let req = state.read::<Request>("req").unwrap();
        assert_eq!(req.memory, 128);
    }

    #[test]
    fn missing_key_is_not_found() {
        let state = CycleState::new();
        assert_eq!(
            state.read::<Request>("req").unwrap_err(),
            StateError::NotFound("req".to_string())
        );
    }

    #[test]
    fn wrong_type_is_mismatch() {
        let state = CycleState::new();
        state.write("req", 7_u32);

        assert!(matches!(
            state.read::<Request>("req"),
            Err(StateError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn delete_removes_key() {
        let state = CycleState::new();
        state.write("req", 1_u8);
        state.delete("req");
        assert!(!state.contains("req"));
    }

    #[test]
    fn clone_state_is_independent() {
        let state = CycleState::new();
        state.write("a", 1_u8);
        state.skip_score_plugin("Spread");

        let copy = state.clone_state();
        copy.write("b", 2_u8);

        assert!(copy.contains("a"));
        assert!(copy.should_skip_score("Spread"));
        assert!(!state.contains("b"));
    }

    #[test]
    fn skip_sets_are_separate() {
        let state = CycleState::new();
        state.skip_filter_plugin("NodeLabels");

        assert!(state.should_skip_filter("NodeLabels"));
        assert!(!state.should_skip_score("NodeLabels"));
    }

    #[test]
    fn concurrent_writers_do_not_lose_keys() {
        let state = Arc::new(CycleState::new());
        let mut handles = vec![];

        for t in 0..4 {
            let state = state.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    state.write(format!("{t}-{i}"), i);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        for t in 0..4 {
            for i in 0..50 {
                assert_eq!(*state.read::<i32>(&format!("{t}-{i}")).unwrap(), i);
            }
        }
    }
}
