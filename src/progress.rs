//! Learner completion state and its persistence.
//!
//! Stored as one JSON document under a fixed key:
//!
//! ```json
//! {"version": 1,
//!  "verbs": {"binyan1": {"past": {"v1-katab": true}}},
//!  "adjectives": {"colors": true}}
//! ```
//!
//! Absence of any key means "not completed". Loading goes through
//! `merge_with_defaults`, which walks each section independently so that a
//! missing or damaged section never takes the others down with it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::lessons::Tense;
use crate::store::{Collection, KvStore};

pub const PROGRESS_KEY: &str = "shu-ismak-progress";
pub const SCHEMA_VERSION: u32 = 1;

pub type VerbMarks = BTreeMap<String, bool>;
pub type BinyanProgress = BTreeMap<Tense, VerbMarks>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub version: u32,
    pub verbs: BTreeMap<String, BinyanProgress>,
    pub adjectives: BTreeMap<String, bool>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            verbs: BTreeMap::new(),
            adjectives: BTreeMap::new(),
        }
    }
}

impl ProgressState {
    pub fn binyan(&self, binyan_id: &str) -> Option<&BinyanProgress> {
        self.verbs.get(binyan_id)
    }

    pub fn is_verb_completed(&self, binyan_id: &str, tense: Tense, verb_id: &str) -> bool {
        self.verbs
            .get(binyan_id)
            .and_then(|b| b.get(&tense))
            .and_then(|marks| marks.get(verb_id))
            .copied()
            .unwrap_or(false)
    }

    pub fn set_verb_completed(&mut self, binyan_id: &str, tense: Tense, verb_id: &str, completed: bool) {
        self.verbs
            .entry(binyan_id.to_string())
            .or_default()
            .entry(tense)
            .or_default()
            .insert(verb_id.to_string(), completed);
    }

    pub fn reset_binyan(&mut self, binyan_id: &str) {
        self.verbs.remove(binyan_id);
    }

    pub fn is_adjective_category_completed(&self, category_id: &str) -> bool {
        self.adjectives.get(category_id).copied().unwrap_or(false)
    }

    /// Flip a category and return its new value.
    pub fn toggle_adjective_category(&mut self, category_id: &str) -> bool {
        let next = !self.is_adjective_category_completed(category_id);
        self.adjectives.insert(category_id.to_string(), next);
        next
    }

    pub fn reset_adjectives(&mut self) {
        self.adjectives.clear();
    }

    pub fn adjective_completed_count(&self) -> usize {
        self.adjectives.values().filter(|done| **done).count()
    }
}

/// How one top-level section looked in the stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    Present,
    Missing,
    /// Wrong shape; replaced by the empty default.
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub verbs: SectionStatus,
    pub adjectives: SectionStatus,
    /// Leaf entries dropped because they were not booleans or named an unknown tense.
    pub dropped_entries: usize,
}

/// Build a well-formed state from whatever JSON was stored.
pub fn merge_with_defaults(raw: &Value) -> (ProgressState, MergeReport) {
    let mut state = ProgressState::default();
    let mut report = MergeReport {
        verbs: SectionStatus::Missing,
        adjectives: SectionStatus::Missing,
        dropped_entries: 0,
    };

    let Some(root) = raw.as_object() else {
        report.verbs = SectionStatus::Malformed;
        report.adjectives = SectionStatus::Malformed;
        return (state, report);
    };

    if let Some(version) = root.get("version").and_then(Value::as_u64) {
        if version > u64::from(SCHEMA_VERSION) {
            warn!("Progress document has newer schema v{version}, reading known fields only");
        }
    }

    match root.get("verbs") {
        None | Some(Value::Null) => {}
        Some(Value::Object(binyans)) => {
            report.verbs = SectionStatus::Present;
            for (binyan_id, tenses) in binyans {
                let Some(tenses) = tenses.as_object() else {
                    report.dropped_entries += 1;
                    continue;
                };
                for (tense_key, marks) in tenses {
                    let (Ok(tense), Some(marks)) = (tense_key.parse::<Tense>(), marks.as_object()) else {
                        report.dropped_entries += 1;
                        continue;
                    };
                    for (verb_id, done) in marks {
                        match done.as_bool() {
                            Some(done) => state.set_verb_completed(binyan_id, tense, verb_id, done),
                            None => report.dropped_entries += 1,
                        }
                    }
                }
            }
        }
        Some(_) => report.verbs = SectionStatus::Malformed,
    }

    match root.get("adjectives") {
        None | Some(Value::Null) => {}
        Some(Value::Object(categories)) => {
            report.adjectives = SectionStatus::Present;
            for (category_id, done) in categories {
                match done.as_bool() {
                    Some(done) => {
                        state.adjectives.insert(category_id.clone(), done);
                    }
                    None => report.dropped_entries += 1,
                }
            }
        }
        Some(_) => report.adjectives = SectionStatus::Malformed,
    }

    (state, report)
}

/// Owner of the single in-memory progress copy for this process.
///
/// Every mutation goes through `update`, which writes the new state through
/// to the store before releasing the lock.
pub struct ProgressTracker {
    store: Arc<dyn KvStore>,
    state: Mutex<ProgressState>,
    persist_warning: AtomicBool,
}

impl ProgressTracker {
    /// Load persisted progress and take ownership of it.
    pub async fn open(store: Arc<dyn KvStore>) -> Self {
        let initial = load_progress(store.as_ref()).await;
        Self {
            store,
            state: Mutex::new(initial),
            persist_warning: AtomicBool::new(false),
        }
    }

    pub async fn snapshot(&self) -> ProgressState {
        self.state.lock().await.clone()
    }

    /// Write `state` as the stored document. Failure is logged and flagged.
    pub async fn save_progress(&self, state: &ProgressState) -> bool {
        let saved = save_progress(self.store.as_ref(), state).await;
        if !saved {
            self.persist_warning.store(true, Ordering::Relaxed);
        }
        saved
    }

    /// Apply `mutator` to the current state, persist, and return the new state.
    /// The in-memory state is replaced even when persistence fails.
    pub async fn update<F>(&self, mutator: F) -> ProgressState
    where
        F: FnOnce(&ProgressState) -> ProgressState,
    {
        let mut guard = self.state.lock().await;
        let next = mutator(&*guard);
        self.save_progress(&next).await;
        *guard = next.clone();
        next
    }

    /// True once after a failed save, then resets.
    pub fn take_persist_warning(&self) -> bool {
        self.persist_warning.swap(false, Ordering::Relaxed)
    }
}

pub async fn load_progress(store: &dyn KvStore) -> ProgressState {
    let Some(raw) = store.get(Collection::Progress, PROGRESS_KEY).await else {
        debug!("No stored progress, starting empty");
        return ProgressState::default();
    };

    let value: Value = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => {
            warn!("Stored progress is not valid JSON ({e}), starting empty");
            return ProgressState::default();
        }
    };

    let (state, report) = merge_with_defaults(&value);
    if report.verbs != SectionStatus::Present
        || report.adjectives != SectionStatus::Present
        || report.dropped_entries > 0
    {
        info!(
            "Progress merged with defaults: verbs={:?} adjectives={:?} dropped={}",
            report.verbs, report.adjectives, report.dropped_entries
        );
    }
    state
}

pub async fn save_progress(store: &dyn KvStore, state: &ProgressState) -> bool {
    let json = match serde_json::to_string(state) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize progress: {e}");
            return false;
        }
    };
    if store.put(Collection::Progress, PROGRESS_KEY, &json).await {
        debug!("Progress saved ({} bytes)", json.len());
        true
    } else {
        warn!("Failed to persist progress, keeping in-memory state for this session");
        false
    }
}
