//! Free space verification ahead of destructive steps
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use nix::sys::statvfs::statvfs;

/// Safety margin added on top of every estimated requirement.
pub const SPACE_MARGIN_PERCENT: u64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    #[error(
        "insufficient space in {target:?} for {description}: \
         need {required_kb} KB (with {margin_percent}% margin), \
         have {available_kb} KB, short by {shortfall_kb} KB"
    )]
    Insufficient {
        target: PathBuf,
        description: String,
        required_kb: u64,
        margin_percent: u64,
        available_kb: u64,
        shortfall_kb: u64,
    },
    #[error("failed to query free space of {path:?}")]
    Probe { path: PathBuf, source: nix::Error },
}

/// Converts bytes to kilobytes, rounding up.
pub fn bytes_to_kb(bytes: u64) -> u64 {
    bytes.div_ceil(1024)
}

/// A requirement of `required_kb` at `target`, before the margin is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpaceRequirement {
    pub target: PathBuf,
    pub required_kb: u64,
    pub margin_percent: u64,
}

impl SpaceRequirement {
    pub fn new(target: &Path, required_bytes: u64) -> Self {
        Self::from_kb(target, bytes_to_kb(required_bytes))
    }

    pub fn from_kb(target: &Path, required_kb: u64) -> Self {
        Self {
            target: target.to_owned(),
            required_kb,
            margin_percent: SPACE_MARGIN_PERCENT,
        }
    }

    /// Requirement plus the margin, both rounded up.
    ///
    /// ```
    /// # use std::path::Path;
    /// # use librestore::space::SpaceRequirement;
    /// assert_eq!(SpaceRequirement::from_kb(Path::new("/"), 1000).effective_kb(), 1200);
    /// assert_eq!(SpaceRequirement::from_kb(Path::new("/"), 1).effective_kb(), 2);
    /// ```
    pub fn effective_kb(&self) -> u64 {
        let margin = self
            .required_kb
            .saturating_mul(self.margin_percent)
            .div_ceil(100);
        self.required_kb.saturating_add(margin)
    }
}

/// Source of free-space figures for a filesystem location.
pub trait SpaceProbe {
    /// Kilobytes available to an unprivileged writer at `path`.
    fn available_kb(&self, path: &Path) -> Result<u64, SpaceError>;
}

/// Asks the kernel through `statvfs(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatvfsProbe;

impl SpaceProbe for StatvfsProbe {
    fn available_kb(&self, path: &Path) -> Result<u64, SpaceError> {
        let stat = statvfs(path).map_err(|err| SpaceError::Probe {
            path: path.to_owned(),
            source: err,
        })?;
        #[allow(clippy::useless_conversion)]
        let bytes =
            u64::from(stat.blocks_available()).saturating_mul(u64::from(stat.fragment_size()));
        // available space rounds down, the opposite of requirements
        Ok(bytes / 1024)
    }
}

/// Serves fixed figures per path; paths it does not know fail to probe.
#[derive(Debug, Default, Clone)]
pub struct StaticProbe {
    available: HashMap<PathBuf, u64>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_available_kb(mut self, path: impl Into<PathBuf>, kb: u64) -> Self {
        self.available.insert(path.into(), kb);
        self
    }
}

impl SpaceProbe for StaticProbe {
    fn available_kb(&self, path: &Path) -> Result<u64, SpaceError> {
        self.available
            .get(path)
            .copied()
            .ok_or_else(|| SpaceError::Probe {
                path: path.to_owned(),
                source: nix::Error::ENOENT,
            })
    }
}

pub struct SpaceGuard<'a> {
    probe: &'a dyn SpaceProbe,
}

impl<'a> SpaceGuard<'a> {
    pub fn new(probe: &'a dyn SpaceProbe) -> Self {
        Self { probe }
    }

    /// Fails when `target` cannot hold `required_bytes` plus the margin.
    /// A location whose free space cannot be queried is let through with a
    /// warning.
    pub fn check_or_abort(
        &self,
        target: &Path,
        required_bytes: u64,
        description: &str,
    ) -> Result<(), SpaceError> {
        let requirement = SpaceRequirement::new(target, required_bytes);
        let required_kb = requirement.effective_kb();

        let available_kb = match self.probe.available_kb(target) {
            Ok(kb) => kb,
            Err(err) => {
                tracing::warn!(
                    ?target,
                    %err,
                    required_kb,
                    "could not determine free space for {description}, continuing unchecked"
                );
                return Ok(());
            }
        };

        if available_kb < required_kb {
            let err = SpaceError::Insufficient {
                target: target.to_owned(),
                description: description.to_owned(),
                required_kb,
                margin_percent: requirement.margin_percent,
                available_kb,
                shortfall_kb: required_kb - available_kb,
            };
            tracing::error!(%err, "space check failed");
            return Err(err);
        }

        tracing::info!(
            ?target,
            required_kb,
            available_kb,
            "enough space for {description}"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_kb_rounds_up() {
        assert_eq!(bytes_to_kb(0), 0);
        assert_eq!(bytes_to_kb(1), 1);
        assert_eq!(bytes_to_kb(1024), 1);
        assert_eq!(bytes_to_kb(1025), 2);
    }

    #[test]
    fn test_effective_requirement() {
        let target = Path::new("/var/lib/docker");
        assert_eq!(SpaceRequirement::from_kb(target, 1000).effective_kb(), 1200);
        assert_eq!(SpaceRequirement::from_kb(target, 1).effective_kb(), 2);
        assert_eq!(SpaceRequirement::from_kb(target, 0).effective_kb(), 0);
        assert_eq!(SpaceRequirement::new(target, 1024 * 1000).effective_kb(), 1200);
    }

    #[test]
    fn test_guard_passes_with_room() {
        let probe = StaticProbe::new().with_available_kb("/data", 1200);
        let guard = SpaceGuard::new(&probe);
        assert!(guard.check_or_abort(Path::new("/data"), 1024 * 1000, "volumes").is_ok());
    }

    #[test]
    fn test_guard_aborts_on_shortfall() {
        let probe = StaticProbe::new().with_available_kb("/data", 1199);
        let guard = SpaceGuard::new(&probe);
        let err = guard
            .check_or_abort(Path::new("/data"), 1024 * 1000, "volumes")
            .unwrap_err();
        match err {
            SpaceError::Insufficient {
                required_kb,
                available_kb,
                shortfall_kb,
                ..
            } => {
                assert_eq!(required_kb, 1200);
                assert_eq!(available_kb, 1199);
                assert_eq!(shortfall_kb, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_guard_tolerates_probe_failure() {
        let probe = StaticProbe::new();
        let guard = SpaceGuard::new(&probe);
        assert!(guard
            .check_or_abort(Path::new("/not/mounted"), u64::MAX, "compose bundle")
            .is_ok());
    }

    #[test]
    fn test_statvfs_probe_reads_root() {
        let kb = StatvfsProbe.available_kb(Path::new("/"));
        assert!(kb.is_ok());
    }
}
