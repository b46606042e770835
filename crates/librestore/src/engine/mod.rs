//! The narrow set of container engine capabilities a restore relies on
use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::compose::ComposeStyle;

mod docker;
pub mod fake;

pub use docker::DockerCli;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to execute {command}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("unexpected output from {command}: {reason}")]
    UnexpectedOutput { command: String, reason: String },
    #[error("engine rejected {0}")]
    Rejected(String),
}

/// A mount handed to an ephemeral container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Volume name or host path
    pub source: String,
    /// Path inside the container
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    pub fn volume(name: &str, target: &str) -> Self {
        Self {
            source: name.to_owned(),
            target: target.to_owned(),
            read_only: false,
        }
    }

    pub fn bind(host_path: &Path, target: &str) -> Self {
        Self {
            source: host_path.to_string_lossy().into_owned(),
            target: target.to_owned(),
            read_only: false,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

impl Display for Mount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.source, self.target)?;
        if self.read_only {
            write!(f, ":ro")?;
        }
        Ok(())
    }
}

/// Container engine operations used by the restore pipeline.
///
/// The read-only queries run in every mode. The remaining operations change
/// engine state and are only ever invoked through [`crate::gate::Gate`].
pub trait Engine {
    /// Identifiers of the containers currently running.
    fn running_containers(&self) -> Result<Vec<String>, EngineError>;

    /// Directory the engine keeps volumes and images in.
    fn data_root(&self) -> Result<PathBuf, EngineError>;

    /// Whether the given compose front end can be invoked.
    fn compose_available(&self, style: ComposeStyle) -> bool;

    /// Creates a named volume. Creating a volume that already exists succeeds.
    fn create_volume(&self, name: &str) -> Result<(), EngineError>;

    /// Loads an exported image into the image store.
    fn load_image(&self, archive: &Path) -> Result<(), EngineError>;

    fn stop_containers(&self, ids: &[String]) -> Result<(), EngineError>;

    fn start_containers(&self, ids: &[String]) -> Result<(), EngineError>;

    /// Runs `command` in a throwaway container of `image` and waits for it.
    fn run_ephemeral(
        &self,
        image: &str,
        mounts: &[Mount],
        command: &[String],
    ) -> Result<(), EngineError>;

    /// Brings up every service of the compose `file`, detached, with `dir`
    /// as the project directory.
    fn compose_up(&self, style: ComposeStyle, dir: &Path, file: &Path) -> Result<(), EngineError>;
}
