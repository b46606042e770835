//! Bringing up compose stacks through whichever front end is installed
use std::collections::BTreeSet;
use std::fmt::Display;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::engine::Engine;
use crate::gate::{Gate, GateError};

/// File names recognised as compose definitions.
pub const COMPOSE_FILE_NAMES: [&str; 4] = [
    "docker-compose.yml",
    "docker-compose.yaml",
    "compose.yml",
    "compose.yaml",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeStyle {
    /// `docker compose`
    Plugin,
    /// `docker-compose`
    Legacy,
}

impl Display for ComposeStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let print = match self {
            Self::Plugin => "docker compose",
            Self::Legacy => "docker-compose",
        };
        write!(f, "{print}")
    }
}

/// Front end picked once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeLauncher {
    style: Option<ComposeStyle>,
}

impl ComposeLauncher {
    /// Prefers the plugin, falls back to the standalone binary.
    pub fn detect(engine: &dyn Engine) -> Self {
        let style = [ComposeStyle::Plugin, ComposeStyle::Legacy]
            .into_iter()
            .find(|style| engine.compose_available(*style));
        match style {
            Some(style) => tracing::debug!(%style, "compose front end detected"),
            None => tracing::debug!("no compose front end available"),
        }
        Self { style }
    }

    pub fn unavailable() -> Self {
        Self { style: None }
    }

    pub fn style(&self) -> Option<ComposeStyle> {
        self.style
    }

    pub fn is_available(&self) -> bool {
        self.style.is_some()
    }

    /// Brings up the services defined in `file`, using its directory as the
    /// project directory. Without a front end this only warns.
    pub fn launch(
        &self,
        engine: &dyn Engine,
        gate: &mut Gate,
        file: &Path,
    ) -> Result<(), GateError> {
        let Some(style) = self.style else {
            tracing::warn!(
                ?file,
                "neither docker compose nor docker-compose is available, skipping"
            );
            return Ok(());
        };
        let dir = file.parent().unwrap_or_else(|| Path::new("."));
        gate.perform(
            format!("bring up {} with {}", file.display(), style),
            || Ok(engine.compose_up(style, dir, file)?),
        )
    }
}

pub fn is_compose_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| COMPOSE_FILE_NAMES.contains(&name))
}

/// Every compose file below `root`, plus the compose files among `bundled`
/// (paths relative to `root`) that are not extracted yet. Sorted, no
/// duplicates.
pub fn discover_compose_files(root: &Path, bundled: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = BTreeSet::new();

    if root.is_dir() {
        for entry in WalkDir::new(root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_compose_file(entry.path()) => {
                    found.insert(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => tracing::warn!(%err, "skipping unreadable entry"),
            }
        }
    }

    found.extend(
        bundled
            .iter()
            .filter(|path| is_compose_file(path))
            .map(|path| root.join(path.strip_prefix(".").unwrap_or(path.as_path()))),
    );
    found.into_iter().collect()
}
