//! Single choke point for every state-changing action
use std::fmt::Display;

use crate::archive::ArchiveError;
use crate::engine::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Perform every action
    #[default]
    Live,
    /// Log every action without performing it
    DryRun,
}

impl Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let print = match self {
            Self::Live => "live",
            Self::DryRun => "dry-run",
        };
        write!(f, "{print}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
#[error("failed to {description}")]
pub struct GateError {
    pub description: String,
    #[source]
    pub source: ActionError,
}

/// Runs or simulates mutating actions depending on the execution mode.
///
/// Every description handed to [`Gate::perform`] is appended to a journal in
/// both modes, so a simulated run yields the exact plan a live run executes.
#[derive(Debug, Default)]
pub struct Gate {
    mode: ExecutionMode,
    journal: Vec<String>,
}

impl Gate {
    pub fn new(mode: ExecutionMode) -> Self {
        Self {
            mode,
            journal: Vec::new(),
        }
    }

    /// `description` reads as an imperative, e.g. "create volume db".
    pub fn perform<F>(&mut self, description: impl Into<String>, action: F) -> Result<(), GateError>
    where
        F: FnOnce() -> Result<(), ActionError>,
    {
        let description = description.into();
        self.journal.push(description.clone());

        match self.mode {
            ExecutionMode::DryRun => {
                tracing::info!("[dry-run] would {description}");
                Ok(())
            }
            ExecutionMode::Live => {
                tracing::info!("{description}");
                action().map_err(|source| {
                    tracing::error!(err = %source, "failed to {description}");
                    GateError {
                        description,
                        source,
                    }
                })
            }
        }
    }

    /// Descriptions of every action seen so far, in order.
    pub fn journal(&self) -> &[String] {
        &self.journal
    }

    pub fn into_journal(self) -> Vec<String> {
        self.journal
    }
}
