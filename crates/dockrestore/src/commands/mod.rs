use std::path::PathBuf;

pub mod confirm;
pub mod restore;

/// Fatal problems detected before any backup set is looked at.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("dockrestore must run as root, current effective uid is {0}")]
    NotPrivileged(u32),
    #[error("required tool {name} was not found on PATH")]
    MissingTool {
        name: String,
        #[source]
        source: which::Error,
    },
}

pub fn ensure_privileged() -> Result<(), UsageError> {
    let euid = nix::unistd::geteuid();
    if !euid.is_root() {
        return Err(UsageError::NotPrivileged(euid.as_raw()));
    }
    Ok(())
}

pub fn ensure_tool(name: &str) -> Result<PathBuf, UsageError> {
    let path = which::which(name).map_err(|source| UsageError::MissingTool {
        name: name.to_owned(),
        source,
    })?;
    tracing::debug!(tool = name, ?path, "found required tool");
    Ok(path)
}
