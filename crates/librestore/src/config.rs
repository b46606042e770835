//! Runtime configuration of a restore run
use std::path::PathBuf;

use crate::gate::ExecutionMode;

pub const DEFAULT_BACKUP_ROOT: &str = "/backup";
pub const DEFAULT_SNAPSHOT_PREFIX: &str = "docker_backup_";
pub const DEFAULT_COMPOSE_DIR: &str = "/opt/docker-compose";
pub const DEFAULT_APP_DATA_VOLUME: &str = "portainer_data";
pub const DEFAULT_HELPER_IMAGE: &str = "alpine:latest";

/// Everything a restore run needs to know, built once by the caller and
/// handed to [`crate::RestorePipeline::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreConfig {
    /// Directory holding the dated backup sets
    pub backup_root: PathBuf,
    /// Name prefix shared by every backup set under `backup_root`
    pub snapshot_prefix: String,
    /// Explicit backup set, bypasses discovery when present
    pub snapshot: Option<PathBuf>,
    /// Where the compose bundle is extracted
    pub compose_dir: PathBuf,
    /// Volume receiving the application-data archive
    pub app_data_volume: String,
    /// Image used for the short lived containers that fill volumes
    pub helper_image: String,
    pub mode: ExecutionMode,
    /// Stop running containers before restoring
    pub stop_running: bool,
    /// Start the containers stopped earlier once the restore is done
    pub resume_running: bool,
    /// Bring up every compose stack found in `compose_dir`
    pub compose_up: bool,
}

impl Default for RestoreConfig {
    fn default() -> Self {
        Self {
            backup_root: PathBuf::from(DEFAULT_BACKUP_ROOT),
            snapshot_prefix: DEFAULT_SNAPSHOT_PREFIX.to_owned(),
            snapshot: None,
            compose_dir: PathBuf::from(DEFAULT_COMPOSE_DIR),
            app_data_volume: DEFAULT_APP_DATA_VOLUME.to_owned(),
            helper_image: DEFAULT_HELPER_IMAGE.to_owned(),
            mode: ExecutionMode::Live,
            stop_running: false,
            resume_running: false,
            compose_up: false,
        }
    }
}

impl RestoreConfig {
    pub fn is_dry_run(&self) -> bool {
        self.mode == ExecutionMode::DryRun
    }

    /// Resume only makes sense when the stop step captured something.
    pub fn resumes_workloads(&self) -> bool {
        self.stop_running && self.resume_running
    }
}
