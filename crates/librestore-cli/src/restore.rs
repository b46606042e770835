use std::path::PathBuf;

use clap::Parser;

/// Restore docker volumes, images and compose stacks from a backup set
#[derive(Parser, Debug)]
pub struct Restore {
    /// Log every action instead of performing it
    #[clap(long)]
    pub dry_run: bool,
    /// Stop running containers before restoring
    #[clap(long)]
    pub stop: bool,
    /// Start the containers stopped by --stop again afterwards
    #[clap(long)]
    pub resume_running: bool,
    /// Bring up every compose stack found in the compose directory
    #[clap(long)]
    pub compose_up: bool,
    /// Do not ask for confirmation
    #[clap(short = 'y', long)]
    pub assume_yes: bool,
    /// Directory holding the dated backup sets
    #[clap(long, default_value = "/backup")]
    pub backup_root: PathBuf,
    /// Name prefix of the backup set directories
    #[clap(long, default_value = "docker_backup_")]
    pub prefix: String,
    /// Directory the compose bundle is extracted into
    #[clap(long, default_value = "/opt/docker-compose")]
    pub compose_dir: PathBuf,
    /// Volume restored from the application-data archive
    #[clap(long, default_value = "portainer_data")]
    pub app_data_volume: String,
    /// Image used by the helper containers that fill volumes
    #[clap(long, default_value = "alpine:latest")]
    pub helper_image: String,

    /// Backup set to restore, defaults to the most recent one
    pub snapshot: Option<PathBuf>,
}
