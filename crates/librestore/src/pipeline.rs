//! The restore sequence
//!
//! Stages run strictly in order and every failure ends the run, except for
//! compose bring-up where each stack is attempted independently:
//! 1. select the backup set
//! 2. preflight: estimate sizes and check free space
//! 3. stop running containers (optional)
//! 4. restore named volumes
//! 5. load images
//! 6. restore the application-data volume
//! 7. extract the compose bundle
//! 8. resume the containers stopped in 3 (optional)
//! 9. bring up compose stacks (optional)
//!
//! Nothing is checkpointed. An interrupted run leaves the engine as it was at
//! the point of interruption and has to be inspected and re-run from the top;
//! every step tolerates being repeated.
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::compose::{ComposeLauncher, discover_compose_files};
use crate::config::RestoreConfig;
use crate::engine::{Engine, EngineError, Mount};
use crate::gate::{ExecutionMode, Gate, GateError};
use crate::snapshot::{SnapshotError, SnapshotSet, VolumeArchiveEntry, locate};
use crate::space::{SpaceError, SpaceGuard, SpaceProbe};
use crate::workload::WorkloadTracker;

/// Where the engine keeps its data when it cannot tell us.
pub const DEFAULT_DATA_ROOT: &str = "/var/lib/docker";

const VOLUME_MOUNT: &str = "/volume";
const BACKUP_MOUNT: &str = "/backup";

#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error(transparent)]
    Action(#[from] GateError),
    #[error("failed to list running containers")]
    Workloads(#[source] EngineError),
}

pub type Result<T> = std::result::Result<T, RestoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Select,
    Preflight,
    Stop,
    Volumes,
    Images,
    AppData,
    ComposeBundle,
    Resume,
    ComposeUp,
}

impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let print = match self {
            Self::Select => "select",
            Self::Preflight => "preflight",
            Self::Stop => "stop",
            Self::Volumes => "volumes",
            Self::Images => "images",
            Self::AppData => "app-data",
            Self::ComposeBundle => "compose-bundle",
            Self::Resume => "resume",
            Self::ComposeUp => "compose-up",
        };
        write!(f, "{print}")
    }
}

/// How a stage ended. A failed stage is the error returned by
/// [`RestorePipeline::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    /// Not requested, or nothing to act on
    Skipped,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub snapshot: PathBuf,
    pub mode: ExecutionMode,
    pub stages: Vec<(Stage, StageOutcome)>,
    /// Compose files whose bring-up failed
    pub compose_failures: Vec<PathBuf>,
    /// Every mutating action performed, or simulated, in order
    pub actions: Vec<String>,
}

impl RestoreReport {
    pub fn outcome(&self, stage: Stage) -> Option<StageOutcome> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, outcome)| *outcome)
    }

    fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        tracing::info!(%stage, ?outcome, "stage finished");
        self.stages.push((stage, outcome));
    }
}

pub struct RestorePipeline<'a> {
    config: RestoreConfig,
    engine: &'a dyn Engine,
    guard: SpaceGuard<'a>,
    gate: Gate,
    tracker: WorkloadTracker,
    compose: ComposeLauncher,
}

impl<'a> RestorePipeline<'a> {
    pub fn new(config: RestoreConfig, engine: &'a dyn Engine, probe: &'a dyn SpaceProbe) -> Self {
        let compose = if config.compose_up {
            ComposeLauncher::detect(engine)
        } else {
            ComposeLauncher::unavailable()
        };
        Self {
            gate: Gate::new(config.mode),
            config,
            engine,
            guard: SpaceGuard::new(probe),
            tracker: WorkloadTracker::new(),
            compose,
        }
    }

    #[tracing::instrument(level = "debug", skip(self), fields(mode = %self.config.mode))]
    pub fn run(mut self) -> Result<RestoreReport> {
        let mut report = RestoreReport {
            mode: self.config.mode,
            ..Default::default()
        };

        let snapshot = self.select()?;
        report.snapshot = snapshot.root.clone();
        report.record(Stage::Select, StageOutcome::Succeeded);

        let data_root = self.preflight(&snapshot)?;
        report.record(Stage::Preflight, StageOutcome::Succeeded);

        let outcome = self.stop_workloads()?;
        report.record(Stage::Stop, outcome);

        let outcome = self.restore_volumes(&snapshot, &data_root)?;
        report.record(Stage::Volumes, outcome);

        let outcome = self.load_images(&snapshot, &data_root)?;
        report.record(Stage::Images, outcome);

        let outcome = self.restore_app_data(&snapshot, &data_root)?;
        report.record(Stage::AppData, outcome);

        let outcome = self.restore_compose_bundle(&snapshot)?;
        report.record(Stage::ComposeBundle, outcome);

        let outcome = self.resume_workloads()?;
        report.record(Stage::Resume, outcome);

        let (outcome, failures) = self.compose_up(&snapshot);
        report.compose_failures = failures;
        report.record(Stage::ComposeUp, outcome);

        report.actions = self.gate.into_journal();
        Ok(report)
    }

    fn select(&self) -> Result<SnapshotSet> {
        let root = match &self.config.snapshot {
            Some(explicit) => explicit.clone(),
            None => locate(&self.config.backup_root, &self.config.snapshot_prefix)?,
        };
        tracing::info!(?root, "selected backup set");
        Ok(SnapshotSet::open(&root, &self.config.app_data_volume)?)
    }

    /// Checks the aggregate requirement of each target location before
    /// anything is touched. Returns the engine data root.
    fn preflight(&self, snapshot: &SnapshotSet) -> Result<PathBuf> {
        let data_root = self.engine.data_root().unwrap_or_else(|err| {
            tracing::warn!(%err, "could not query engine data root, assuming {DEFAULT_DATA_ROOT}");
            PathBuf::from(DEFAULT_DATA_ROOT)
        });

        let engine_bytes = snapshot.engine_bytes();
        let compose_bytes = snapshot.compose_bytes();
        tracing::info!(
            ?data_root,
            engine_bytes,
            compose_dir = ?self.config.compose_dir,
            compose_bytes,
            "estimated restore footprint"
        );

        self.guard.check_or_abort(
            &data_root,
            engine_bytes,
            "volumes, images and application data",
        )?;
        if snapshot.compose_bundle.is_some() {
            self.guard
                .check_or_abort(&self.config.compose_dir, compose_bytes, "compose bundle")?;
        }
        Ok(data_root)
    }

    fn stop_workloads(&mut self) -> Result<StageOutcome> {
        if !self.config.stop_running {
            return Ok(StageOutcome::Skipped);
        }
        self.tracker
            .capture_running(self.engine)
            .map_err(RestoreError::Workloads)?;
        if self.tracker.stop_captured(self.engine, &mut self.gate)? {
            Ok(StageOutcome::Succeeded)
        } else {
            Ok(StageOutcome::Skipped)
        }
    }

    fn restore_volumes(
        &mut self,
        snapshot: &SnapshotSet,
        data_root: &Path,
    ) -> Result<StageOutcome> {
        if snapshot.volumes.is_empty() {
            tracing::info!("no volume archives in backup set");
            return Ok(StageOutcome::Skipped);
        }
        for entry in &snapshot.volumes {
            self.restore_volume(entry, data_root)?;
        }
        Ok(StageOutcome::Succeeded)
    }

    fn restore_app_data(
        &mut self,
        snapshot: &SnapshotSet,
        data_root: &Path,
    ) -> Result<StageOutcome> {
        match &snapshot.app_data {
            Some(entry) => {
                self.restore_volume(entry, data_root)?;
                Ok(StageOutcome::Succeeded)
            }
            None => {
                tracing::info!(
                    volume = %self.config.app_data_volume,
                    "no application-data archive in backup set, skipping"
                );
                Ok(StageOutcome::Skipped)
            }
        }
    }

    /// Creates the volume and refills it from the archive inside a helper
    /// container. The helper lists the archive before extracting so an
    /// unreadable archive fails without touching the volume.
    fn restore_volume(&mut self, entry: &VolumeArchiveEntry, data_root: &Path) -> Result<()> {
        self.guard.check_or_abort(
            data_root,
            entry.estimated_bytes,
            &format!("volume {}", entry.name),
        )?;

        let engine = self.engine;
        self.gate.perform(format!("create volume {}", entry.name), || {
            Ok(engine.create_volume(&entry.name)?)
        })?;

        let file_name = entry
            .archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let backup_dir = entry.archive.parent().unwrap_or_else(|| Path::new("/"));
        let mounts = [
            Mount::volume(&entry.name, VOLUME_MOUNT),
            Mount::bind(backup_dir, BACKUP_MOUNT).read_only(),
        ];
        let command = extraction_command(&file_name);
        let image = &self.config.helper_image;
        self.gate.perform(
            format!("restore volume {} from {}", entry.name, entry.archive.display()),
            || Ok(engine.run_ephemeral(image, &mounts, &command)?),
        )?;
        Ok(())
    }

    fn load_images(&mut self, snapshot: &SnapshotSet, data_root: &Path) -> Result<StageOutcome> {
        if snapshot.images.is_empty() {
            tracing::info!("no image archives in backup set");
            return Ok(StageOutcome::Skipped);
        }
        let engine = self.engine;
        for image in &snapshot.images {
            self.guard.check_or_abort(
                data_root,
                image.estimated_bytes,
                &format!("image {}", image.path.display()),
            )?;
            self.gate
                .perform(format!("load image {}", image.path.display()), || {
                    Ok(engine.load_image(&image.path)?)
                })?;
        }
        Ok(StageOutcome::Succeeded)
    }

    fn restore_compose_bundle(&mut self, snapshot: &SnapshotSet) -> Result<StageOutcome> {
        let Some(bundle) = &snapshot.compose_bundle else {
            tracing::info!("no compose bundle in backup set, skipping");
            return Ok(StageOutcome::Skipped);
        };
        let target = &self.config.compose_dir;

        self.gate
            .perform(format!("create directory {}", target.display()), || {
                Ok(fs::create_dir_all(target)?)
            })?;
        self.guard
            .check_or_abort(target, bundle.estimated_bytes, "compose bundle")?;
        self.gate.perform(
            format!("extract {} into {}", bundle.path.display(), target.display()),
            || Ok(archive::extract(&bundle.path, target)?),
        )?;
        Ok(StageOutcome::Succeeded)
    }

    fn resume_workloads(&mut self) -> Result<StageOutcome> {
        if !self.config.resumes_workloads() {
            if self.config.resume_running {
                tracing::info!("resume requested without stop, nothing was stopped");
            }
            return Ok(StageOutcome::Skipped);
        }
        if self.tracker.resume(self.engine, &mut self.gate)? {
            Ok(StageOutcome::Succeeded)
        } else {
            Ok(StageOutcome::Skipped)
        }
    }

    /// Each stack is independent of the others, so a failure is logged and
    /// the next file is still attempted.
    fn compose_up(&mut self, snapshot: &SnapshotSet) -> (StageOutcome, Vec<PathBuf>) {
        if !self.config.compose_up {
            return (StageOutcome::Skipped, Vec::new());
        }
        if !self.compose.is_available() {
            tracing::warn!(
                "neither docker compose nor docker-compose is available, not bringing up stacks"
            );
            return (StageOutcome::Skipped, Vec::new());
        }

        // the bundle listing stands in for files a simulated run never extracted
        let bundled: Vec<PathBuf> = match &snapshot.compose_bundle {
            Some(bundle) => match archive::list_entries(&bundle.path) {
                Ok(entries) => entries.into_iter().map(|entry| entry.path).collect(),
                Err(err) => {
                    tracing::warn!(%err, "could not list compose bundle");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let files = discover_compose_files(&self.config.compose_dir, &bundled);
        if files.is_empty() {
            tracing::info!(dir = ?self.config.compose_dir, "no compose files found");
            return (StageOutcome::Skipped, Vec::new());
        }

        let mut failures = Vec::new();
        for file in files {
            if let Err(err) = self.compose.launch(self.engine, &mut self.gate, &file) {
                tracing::error!(?file, %err, "compose stack failed to come up, continuing");
                failures.push(file);
            }
        }
        if !failures.is_empty() {
            tracing::warn!(failed = failures.len(), "some compose stacks did not come up");
        }
        (StageOutcome::Succeeded, failures)
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Shell command run by the helper container: a listing pass proves the
/// archive is readable, then it is unpacked over the volume contents.
fn extraction_command(file_name: &str) -> Vec<String> {
    let archive = shell_quote(&format!("{BACKUP_MOUNT}/{file_name}"));
    vec![
        "sh".to_owned(),
        "-c".to_owned(),
        format!("tar -tzf {archive} > /dev/null && tar -xzf {archive} -C {VOLUME_MOUNT}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/backup/a.tar.gz"), "'/backup/a.tar.gz'");
        assert_eq!(shell_quote("it's.tar.gz"), r"'it'\''s.tar.gz'");
    }

    #[test]
    fn test_extraction_command_validates_first() {
        let command = extraction_command("db_2025-09-20.tar.gz");
        assert_eq!(command[..2], ["sh", "-c"]);
        assert_eq!(
            command[2],
            "tar -tzf '/backup/db_2025-09-20.tar.gz' > /dev/null && \
             tar -xzf '/backup/db_2025-09-20.tar.gz' -C /volume"
        );
    }

    #[test]
    fn test_report_outcome_lookup() {
        let mut report = RestoreReport::default();
        report.record(Stage::Stop, StageOutcome::Skipped);
        assert_eq!(report.outcome(Stage::Stop), Some(StageOutcome::Skipped));
        assert_eq!(report.outcome(Stage::Images), None);
    }
}
