//! Remembers which containers were running before the restore stopped them
use crate::engine::{Engine, EngineError};
use crate::gate::{Gate, GateError};

/// Containers observed running right before the stop step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadSnapshot {
    ids: Vec<String>,
}

impl WorkloadSnapshot {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl From<Vec<String>> for WorkloadSnapshot {
    fn from(ids: Vec<String>) -> Self {
        Self { ids }
    }
}

/// Captures the running set at most once and hands it back exactly once.
#[derive(Debug, Default)]
pub struct WorkloadTracker {
    captured: Option<WorkloadSnapshot>,
}

impl WorkloadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the running containers. Later calls return the first capture
    /// untouched, whatever the engine reports by then.
    pub fn capture_running(
        &mut self,
        engine: &dyn Engine,
    ) -> Result<&WorkloadSnapshot, EngineError> {
        if self.captured.is_none() {
            let ids = engine.running_containers()?;
            tracing::info!(count = ids.len(), ?ids, "captured running containers");
            self.captured = Some(WorkloadSnapshot::from(ids));
        }
        Ok(self.captured.get_or_insert_with(WorkloadSnapshot::default))
    }

    pub fn captured(&self) -> Option<&WorkloadSnapshot> {
        self.captured.as_ref()
    }

    /// Stops exactly the captured containers as one batch.
    pub fn stop_captured(&self, engine: &dyn Engine, gate: &mut Gate) -> Result<bool, GateError> {
        let Some(snapshot) = self.captured.as_ref().filter(|s| !s.is_empty()) else {
            tracing::info!("no running containers to stop");
            return Ok(false);
        };
        gate.perform(
            format!(
                "stop {} running container(s): {}",
                snapshot.len(),
                snapshot.ids().join(" ")
            ),
            || Ok(engine.stop_containers(snapshot.ids())?),
        )?;
        Ok(true)
    }

    /// Starts the captured containers again and consumes the capture.
    /// Returns whether anything was started; nothing captured is not an error.
    pub fn resume(&mut self, engine: &dyn Engine, gate: &mut Gate) -> Result<bool, GateError> {
        let Some(snapshot) = self.captured.take().filter(|s| !s.is_empty()) else {
            tracing::info!("no previously running containers to resume");
            return Ok(false);
        };
        gate.perform(
            format!(
                "start {} previously running container(s): {}",
                snapshot.len(),
                snapshot.ids().join(" ")
            ),
            || Ok(engine.start_containers(snapshot.ids())?),
        )?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake::{EngineCall, FakeEngine};
    use crate::gate::ExecutionMode;

    #[test]
    fn test_capture_is_taken_once() {
        let engine = FakeEngine::new().with_running(["web", "db"]);
        let mut tracker = WorkloadTracker::new();
        assert_eq!(tracker.capture_running(&engine).unwrap().len(), 2);

        engine.start_containers(&["late".to_owned()]).unwrap();
        let again = tracker.capture_running(&engine).unwrap();
        assert_eq!(again.ids(), ["web", "db"]);
    }

    #[test]
    fn test_stop_then_resume_restores_exact_set() {
        let engine = FakeEngine::new().with_running(["web", "db"]);
        let mut gate = Gate::new(ExecutionMode::Live);
        let mut tracker = WorkloadTracker::new();

        tracker.capture_running(&engine).unwrap();
        assert!(tracker.stop_captured(&engine, &mut gate).unwrap());
        assert!(engine.running().is_empty());

        // something started during the restore is not part of the capture
        engine.start_containers(&["helper".to_owned()]).unwrap();
        assert!(tracker.resume(&engine, &mut gate).unwrap());
        assert_eq!(
            engine.calls().last(),
            Some(&EngineCall::StartContainers(vec!["web".to_owned(), "db".to_owned()]))
        );
        assert!(tracker.captured().is_none());
    }

    #[test]
    fn test_resume_without_running_is_noop() {
        let engine = FakeEngine::new();
        let mut gate = Gate::new(ExecutionMode::Live);
        let mut tracker = WorkloadTracker::new();

        tracker.capture_running(&engine).unwrap();
        assert!(!tracker.stop_captured(&engine, &mut gate).unwrap());
        assert!(!tracker.resume(&engine, &mut gate).unwrap());
        assert!(engine.calls().is_empty());
        assert!(gate.journal().is_empty());
    }

    #[test]
    fn test_dry_run_stop_leaves_containers_running() {
        let engine = FakeEngine::new().with_running(["web"]);
        let mut gate = Gate::new(ExecutionMode::DryRun);
        let mut tracker = WorkloadTracker::new();

        tracker.capture_running(&engine).unwrap();
        assert!(tracker.stop_captured(&engine, &mut gate).unwrap());
        assert!(tracker.resume(&engine, &mut gate).unwrap());
        assert_eq!(engine.running(), ["web"]);
        assert!(engine.calls().is_empty());
        assert_eq!(gate.journal().len(), 2);
    }
}
