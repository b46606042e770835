use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use super::{Engine, EngineError, Mount};
use crate::compose::ComposeStyle;

const DOCKER_BINARY: &str = "docker";
const LEGACY_COMPOSE_BINARY: &str = "docker-compose";

/// [`Engine`] backed by the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    docker: PathBuf,
    legacy_compose: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            docker: PathBuf::from(DOCKER_BINARY),
            legacy_compose: PathBuf::from(LEGACY_COMPOSE_BINARY),
        }
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, docker: impl Into<PathBuf>) -> Self {
        self.docker = docker.into();
        self
    }

    fn docker<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.docker);
        cmd.args(args);
        cmd
    }

    fn compose_command(&self, style: ComposeStyle) -> Command {
        match style {
            ComposeStyle::Plugin => {
                let mut cmd = Command::new(&self.docker);
                cmd.arg("compose");
                cmd
            }
            ComposeStyle::Legacy => Command::new(&self.legacy_compose),
        }
    }
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs `cmd` to completion, turning a non-zero exit into an error.
fn run(mut cmd: Command) -> Result<Output, EngineError> {
    let command = describe(&cmd);
    tracing::debug!(%command, "executing");
    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|err| EngineError::Spawn {
            command: command.clone(),
            source: err,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        tracing::error!(%command, status = %output.status, %stderr, "command failed");
        return Err(EngineError::CommandFailed {
            command,
            status: output.status,
            stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines().filter(|line| !line.trim().is_empty()) {
        tracing::debug!(%command, "{}", line);
    }
    Ok(output)
}

impl Engine for DockerCli {
    fn running_containers(&self) -> Result<Vec<String>, EngineError> {
        let output = run(self.docker(["ps", "-q"]))?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect())
    }

    fn data_root(&self) -> Result<PathBuf, EngineError> {
        let cmd = self.docker(["info", "--format", "{{.DockerRootDir}}"]);
        let command = describe(&cmd);
        let output = run(cmd)?;
        let root = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if root.is_empty() {
            return Err(EngineError::UnexpectedOutput {
                command,
                reason: "empty data root".to_owned(),
            });
        }
        Ok(PathBuf::from(root))
    }

    fn compose_available(&self, style: ComposeStyle) -> bool {
        let mut cmd = self.compose_command(style);
        cmd.arg("version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.status().map(|status| status.success()).unwrap_or(false)
    }

    fn create_volume(&self, name: &str) -> Result<(), EngineError> {
        run(self.docker(["volume", "create", name]))?;
        Ok(())
    }

    fn load_image(&self, archive: &Path) -> Result<(), EngineError> {
        run(self.docker([OsStr::new("load"), OsStr::new("-i"), archive.as_os_str()]))?;
        Ok(())
    }

    fn stop_containers(&self, ids: &[String]) -> Result<(), EngineError> {
        let mut cmd = self.docker(["stop"]);
        cmd.args(ids);
        run(cmd)?;
        Ok(())
    }

    fn start_containers(&self, ids: &[String]) -> Result<(), EngineError> {
        let mut cmd = self.docker(["start"]);
        cmd.args(ids);
        run(cmd)?;
        Ok(())
    }

    fn run_ephemeral(
        &self,
        image: &str,
        mounts: &[Mount],
        command: &[String],
    ) -> Result<(), EngineError> {
        let mut cmd = self.docker(["run", "--rm"]);
        for mount in mounts {
            cmd.arg("-v").arg(mount.to_string());
        }
        cmd.arg(image).args(command);
        run(cmd)?;
        Ok(())
    }

    fn compose_up(&self, style: ComposeStyle, dir: &Path, file: &Path) -> Result<(), EngineError> {
        let mut cmd = self.compose_command(style);
        cmd.arg("-f").arg(file).args(["up", "-d"]).current_dir(dir);
        run(cmd)?;
        Ok(())
    }
}
