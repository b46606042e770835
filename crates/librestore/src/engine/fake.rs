use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::{Engine, EngineError, Mount};
use crate::compose::ComposeStyle;

/// A state-changing call received by [`FakeEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    CreateVolume(String),
    LoadImage(PathBuf),
    StopContainers(Vec<String>),
    StartContainers(Vec<String>),
    RunEphemeral {
        image: String,
        mounts: Vec<Mount>,
        command: Vec<String>,
    },
    ComposeUp {
        style: ComposeStyle,
        dir: PathBuf,
        file: PathBuf,
    },
}

type FailurePredicate = Box<dyn Fn(&EngineCall) -> bool>;

/// In-memory engine for testing.
///
/// Keeps just enough state (running containers, volumes, images) for the
/// pipeline to observe the effect of its own actions, and records every
/// state-changing call in order. Read-only queries are not recorded.
pub struct FakeEngine {
    running: RefCell<Vec<String>>,
    volumes: RefCell<BTreeSet<String>>,
    images: RefCell<BTreeSet<PathBuf>>,
    data_root: Option<PathBuf>,
    compose: Vec<ComposeStyle>,
    calls: RefCell<Vec<EngineCall>>,
    failures: Vec<FailurePredicate>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            running: RefCell::new(Vec::new()),
            volumes: RefCell::new(BTreeSet::new()),
            images: RefCell::new(BTreeSet::new()),
            data_root: Some(PathBuf::from("/var/lib/docker")),
            compose: Vec::new(),
            calls: RefCell::new(Vec::new()),
            failures: Vec::new(),
        }
    }

    pub fn with_running<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.running.borrow_mut() = ids.into_iter().map(Into::into).collect();
        self
    }

    /// `None` makes the data root query fail.
    pub fn with_data_root(mut self, root: Option<PathBuf>) -> Self {
        self.data_root = root;
        self
    }

    pub fn with_compose(mut self, style: ComposeStyle) -> Self {
        self.compose.push(style);
        self
    }

    /// Makes every call matching `predicate` fail.
    pub fn fail_when(mut self, predicate: impl Fn(&EngineCall) -> bool + 'static) -> Self {
        self.failures.push(Box::new(predicate));
        self
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn running(&self) -> Vec<String> {
        self.running.borrow().clone()
    }

    pub fn volumes(&self) -> Vec<String> {
        self.volumes.borrow().iter().cloned().collect()
    }

    pub fn images(&self) -> Vec<PathBuf> {
        self.images.borrow().iter().cloned().collect()
    }

    fn record(&self, call: EngineCall) -> Result<(), EngineError> {
        let failed = self.failures.iter().any(|predicate| predicate(&call));
        let description = format!("{call:?}");
        self.calls.borrow_mut().push(call);
        if failed {
            return Err(EngineError::Rejected(description));
        }
        Ok(())
    }
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for FakeEngine {
    fn running_containers(&self) -> Result<Vec<String>, EngineError> {
        Ok(self.running.borrow().clone())
    }

    fn data_root(&self) -> Result<PathBuf, EngineError> {
        self.data_root
            .clone()
            .ok_or_else(|| EngineError::Rejected("data root query".to_owned()))
    }

    fn compose_available(&self, style: ComposeStyle) -> bool {
        self.compose.contains(&style)
    }

    fn create_volume(&self, name: &str) -> Result<(), EngineError> {
        self.record(EngineCall::CreateVolume(name.to_owned()))?;
        self.volumes.borrow_mut().insert(name.to_owned());
        Ok(())
    }

    fn load_image(&self, archive: &Path) -> Result<(), EngineError> {
        self.record(EngineCall::LoadImage(archive.to_owned()))?;
        self.images.borrow_mut().insert(archive.to_owned());
        Ok(())
    }

    fn stop_containers(&self, ids: &[String]) -> Result<(), EngineError> {
        self.record(EngineCall::StopContainers(ids.to_vec()))?;
        self.running.borrow_mut().retain(|id| !ids.contains(id));
        Ok(())
    }

    fn start_containers(&self, ids: &[String]) -> Result<(), EngineError> {
        self.record(EngineCall::StartContainers(ids.to_vec()))?;
        let mut running = self.running.borrow_mut();
        for id in ids {
            if !running.contains(id) {
                running.push(id.clone());
            }
        }
        Ok(())
    }

    fn run_ephemeral(
        &self,
        image: &str,
        mounts: &[Mount],
        command: &[String],
    ) -> Result<(), EngineError> {
        self.record(EngineCall::RunEphemeral {
            image: image.to_owned(),
            mounts: mounts.to_vec(),
            command: command.to_vec(),
        })
    }

    fn compose_up(&self, style: ComposeStyle, dir: &Path, file: &Path) -> Result<(), EngineError> {
        self.record(EngineCall::ComposeUp {
            style,
            dir: dir.to_owned(),
            file: file.to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_and_start_track_running_set() {
        let engine = FakeEngine::new().with_running(["a", "b"]);
        engine.stop_containers(&["a".to_owned()]).unwrap();
        assert_eq!(engine.running(), ["b"]);
        engine.start_containers(&["a".to_owned()]).unwrap();
        assert_eq!(engine.running(), ["b", "a"]);
        assert_eq!(engine.calls().len(), 2);
    }

    #[test]
    fn test_failure_is_recorded_and_returned() {
        let engine = FakeEngine::new()
            .fail_when(|call| matches!(call, EngineCall::CreateVolume(name) if name == "bad"));
        assert!(engine.create_volume("good").is_ok());
        assert!(engine.create_volume("bad").is_err());
        assert_eq!(engine.volumes(), ["good"]);
        assert_eq!(engine.calls().len(), 2);
    }
}
