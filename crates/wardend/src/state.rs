//! Daemon state: the shared incident-id -> run map.
//!
//! One run mutates its entry while status queries read concurrently, so the
//! whole map lives behind an RwLock. Readers must tolerate runs in any
//! non-terminal state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use warden_common::RunResult;

#[derive(Default)]
pub struct RunRegistry {
    runs: HashMap<String, RunResult>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, run: RunResult) {
        self.runs.insert(run.incident_id.clone(), run);
    }

    pub fn get(&self, incident_id: &str) -> Option<RunResult> {
        self.runs.get(incident_id).cloned()
    }

    pub fn list(&self) -> Vec<RunResult> {
        self.runs.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn get_mut(&mut self, incident_id: &str) -> Option<&mut RunResult> {
        self.runs.get_mut(incident_id)
    }
}

/// Thread-safe shared handle to the run map.
pub type SharedRuns = Arc<RwLock<RunRegistry>>;

pub fn create_shared_runs() -> SharedRuns {
    Arc::new(RwLock::new(RunRegistry::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_common::RunStatus;

    #[test]
    fn test_insert_and_get() {
        let mut registry = RunRegistry::new();
        registry.insert(RunResult::new("inc-1", "Memory Leak"));
        let run = registry.get("inc-1").unwrap();
        assert_eq!(run.status, RunStatus::Received);
        assert!(registry.get("inc-404").is_none());
    }

    #[test]
    fn test_mutation_visible_to_readers() {
        let mut registry = RunRegistry::new();
        registry.insert(RunResult::new("inc-1", "Memory Leak"));
        registry.get_mut("inc-1").unwrap().status = RunStatus::Analysing;
        assert_eq!(registry.get("inc-1").unwrap().status, RunStatus::Analysing);
    }
}
