use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use librestore::engine::DockerCli;
use librestore::snapshot;
use librestore::space::StatvfsProbe;
use librestore::{ExecutionMode, RestoreConfig, RestorePipeline, RestoreReport};
use librestore_cli::Restore;

use super::confirm::{CONFIRM_TIMEOUT, confirm};
use super::{ensure_privileged, ensure_tool};

fn to_config(args: Restore) -> RestoreConfig {
    RestoreConfig {
        backup_root: args.backup_root,
        snapshot_prefix: args.prefix,
        snapshot: args.snapshot,
        compose_dir: args.compose_dir,
        app_data_volume: args.app_data_volume,
        helper_image: args.helper_image,
        mode: if args.dry_run {
            ExecutionMode::DryRun
        } else {
            ExecutionMode::Live
        },
        stop_running: args.stop,
        resume_running: args.resume_running,
        compose_up: args.compose_up,
    }
}

fn resolve_snapshot(config: &RestoreConfig) -> Result<PathBuf> {
    match &config.snapshot {
        Some(explicit) => Ok(explicit.clone()),
        None => snapshot::locate(&config.backup_root, &config.snapshot_prefix).with_context(|| {
            format!(
                "failed to find a backup set in {}",
                config.backup_root.display()
            )
        }),
    }
}

fn log_report(report: &RestoreReport) {
    for (stage, outcome) in &report.stages {
        tracing::debug!(%stage, ?outcome, "stage summary");
    }
    for file in &report.compose_failures {
        tracing::error!(?file, "compose stack did not come up");
    }
    tracing::info!(
        snapshot = ?report.snapshot,
        mode = %report.mode,
        actions = report.actions.len(),
        compose_failures = report.compose_failures.len(),
        "restore finished"
    );
}

pub fn restore(args: Restore) -> Result<()> {
    ensure_privileged()?;
    ensure_tool("docker")?;

    let assume_yes = args.assume_yes;
    let mut config = to_config(args);
    if config.resume_running && !config.stop_running {
        tracing::warn!("--resume-running has no effect without --stop");
    }

    // pin the selection so the pipeline restores what the operator confirmed
    let selected = resolve_snapshot(&config)?;
    tracing::info!(snapshot = ?selected, mode = %config.mode, "restoring backup set");
    config.snapshot = Some(selected.clone());

    if !assume_yes && !config.is_dry_run() {
        let prompt = format!(
            "This replaces volumes, images and compose files with the contents of {}.",
            selected.display()
        );
        if !confirm(&prompt, BufReader::new(io::stdin()), CONFIRM_TIMEOUT) {
            tracing::info!("restore cancelled by the operator");
            return Ok(());
        }
    }

    let engine = DockerCli::new();
    let probe = StatvfsProbe;
    let report = RestorePipeline::new(config, &engine, &probe)
        .run()
        .with_context(|| format!("failed to restore {}", selected.display()))?;
    log_report(&report);

    Ok(())
}
