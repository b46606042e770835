//! Discovery and scanning of backup sets
//!
//! A backup set is a directory named `<prefix><date>` holding:
//! - `<volume>_<qualifier>.tar.gz` archives, one per named volume
//! - `<app-data-volume>_<qualifier>.tar.gz`, the application-data singleton
//! - `docker_compose_files_<qualifier>.tar.gz`, the compose bundle
//! - `images/`, one exported image per file
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use crate::estimate::estimate_restored_size;

pub const COMPRESSED_TAR_SUFFIX: &str = ".tar.gz";
pub const COMPOSE_BUNDLE_PREFIX: &str = "docker_compose_files_";
pub const IMAGES_DIR: &str = "images";

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("no backup set starting with {prefix:?} found in {root:?}")]
    NotFound { root: PathBuf, prefix: String },
    #[error("backup set {0:?} does not exist or is not a directory")]
    Missing(PathBuf),
    #[error("failed to read directory {path:?}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("backup set {0:?} contains no usable backup content")]
    NoUsableContent(PathBuf),
}

type Result<T> = std::result::Result<T, SnapshotError>;

/// A named volume archive together with its estimated restored size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeArchiveEntry {
    pub name: String,
    pub archive: PathBuf,
    pub estimated_bytes: u64,
}

/// A singleton archive (image export, compose bundle) and its estimated size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub estimated_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSet {
    pub root: PathBuf,
    /// Date qualifier embedded in the directory name
    pub date_token: String,
    pub volumes: Vec<VolumeArchiveEntry>,
    pub app_data: Option<VolumeArchiveEntry>,
    pub images: Vec<ArchiveEntry>,
    pub compose_bundle: Option<ArchiveEntry>,
}

/// Selects the most recent backup set under `backup_root`.
///
/// ```
/// # use librestore::snapshot::locate;
/// let dir = tempfile::tempdir().unwrap();
/// for name in [
///     "docker_backup_2025-09-05",
///     "docker_backup_2025-09-20",
///     "docker_backup_2025-09-15",
/// ] {
///     std::fs::create_dir(dir.path().join(name)).unwrap();
/// }
/// let latest = locate(dir.path(), "docker_backup_").unwrap();
/// assert!(latest.ends_with("docker_backup_2025-09-20"));
/// ```
pub fn locate(backup_root: &Path, prefix: &str) -> Result<PathBuf> {
    let entries = fs::read_dir(backup_root).map_err(|err| SnapshotError::ReadDir {
        path: backup_root.to_owned(),
        source: err,
    })?;

    let mut candidates: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(prefix))
        .collect();
    candidates.sort_by(|a, b| version_cmp(a, b));

    let selected = candidates.pop().ok_or_else(|| SnapshotError::NotFound {
        root: backup_root.to_owned(),
        prefix: prefix.to_owned(),
    })?;
    tracing::debug!(
        ?backup_root,
        candidates = candidates.len() + 1,
        %selected,
        "located backup set"
    );

    Ok(backup_root.join(selected))
}

/// Compares two names the way `sort -V` does: runs of digits compare by
/// numeric value, everything else byte-wise.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ordering = match (is_numeric(l), is_numeric(r)) {
                    (true, true) => numeric_cmp(l, r),
                    _ => l.cmp(r),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

fn is_numeric(chunk: &str) -> bool {
    chunk.bytes().next().is_some_and(|b| b.is_ascii_digit())
}

// Compares digit strings of any length without parsing them.
fn numeric_cmp(l: &str, r: &str) -> Ordering {
    let l = l.trim_start_matches('0');
    let r = r.trim_start_matches('0');
    l.len().cmp(&r.len()).then_with(|| l.cmp(r))
}

/// Splits a string into alternating digit and non-digit runs.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Derives the volume name from an archive file name by dropping the
/// compressed-tar suffix and the trailing `_<qualifier>` segment.
///
/// ```
/// # use librestore::snapshot::volume_name_from_archive;
/// assert_eq!(volume_name_from_archive("app_db_2025-09-20.tar.gz").as_deref(), Some("app_db"));
/// assert_eq!(volume_name_from_archive("notes.txt"), None);
/// ```
pub fn volume_name_from_archive(file_name: &str) -> Option<String> {
    let stem = file_name.strip_suffix(COMPRESSED_TAR_SUFFIX)?;
    let name = match stem.rsplit_once('_') {
        Some((name, _qualifier)) if !name.is_empty() => name,
        _ => stem,
    };
    if name.is_empty() {
        return None;
    }
    Some(name.to_owned())
}

impl SnapshotSet {
    /// Scans `root` and classifies every archive it holds. Sizes are estimated
    /// here since estimation never mutates anything.
    pub fn open(root: &Path, app_data_volume: &str) -> Result<Self> {
        if !root.is_dir() {
            return Err(SnapshotError::Missing(root.to_owned()));
        }

        let mut volumes = Vec::new();
        let mut app_data: Option<VolumeArchiveEntry> = None;
        let mut compose_bundle: Option<ArchiveEntry> = None;

        for file_name in sorted_file_names(root)? {
            if !file_name.ends_with(COMPRESSED_TAR_SUFFIX) {
                continue;
            }
            let path = root.join(&file_name);
            let estimated_bytes = estimate_restored_size(&path);

            if file_name.starts_with(COMPOSE_BUNDLE_PREFIX) {
                // the newest bundle wins when several are present
                compose_bundle = Some(ArchiveEntry {
                    path,
                    estimated_bytes,
                });
            } else if let Some(name) = volume_name_from_archive(&file_name) {
                let entry = VolumeArchiveEntry {
                    name,
                    archive: path,
                    estimated_bytes,
                };
                // only an exact name match is the application-data archive
                if entry.name == app_data_volume {
                    app_data = Some(entry);
                } else {
                    volumes.push(entry);
                }
            }
        }

        let images_dir = root.join(IMAGES_DIR);
        let images = if images_dir.is_dir() {
            sorted_file_names(&images_dir)?
                .into_iter()
                .map(|name| images_dir.join(name))
                .filter(|path| path.is_file())
                .map(|path| ArchiveEntry {
                    estimated_bytes: estimate_restored_size(&path),
                    path,
                })
                .collect()
        } else {
            Vec::new()
        };

        let set = Self {
            root: root.to_owned(),
            date_token: date_token(root),
            volumes,
            app_data,
            images,
            compose_bundle,
        };
        if set.is_empty() {
            return Err(SnapshotError::NoUsableContent(root.to_owned()));
        }

        tracing::info!(
            root = ?set.root,
            date = %set.date_token,
            volumes = set.volumes.len(),
            images = set.images.len(),
            app_data = set.app_data.is_some(),
            compose_bundle = set.compose_bundle.is_some(),
            "scanned backup set",
        );
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
            && self.images.is_empty()
            && self.app_data.is_none()
            && self.compose_bundle.is_none()
    }

    /// Bytes landing in the container engine's data root.
    pub fn engine_bytes(&self) -> u64 {
        self.volumes
            .iter()
            .chain(self.app_data.iter())
            .map(|v| v.estimated_bytes)
            .chain(self.images.iter().map(|i| i.estimated_bytes))
            .fold(0u64, u64::saturating_add)
    }

    /// Bytes landing in the compose restore directory.
    pub fn compose_bytes(&self) -> u64 {
        self.compose_bundle
            .as_ref()
            .map_or(0, |bundle| bundle.estimated_bytes)
    }
}

fn sorted_file_names(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|err| SnapshotError::ReadDir {
        path: dir.to_owned(),
        source: err,
    })?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort_by(|a, b| version_cmp(a, b));
    Ok(names)
}

fn date_token(root: &Path) -> String {
    let name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.rsplit_once('_') {
        Some((_, token)) => token.to_owned(),
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::io::Write;

    use anyhow::Result;

    use super::*;

    fn touch(path: &Path, content: &[u8]) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(content)?;
        Ok(())
    }

    #[test]
    fn test_version_cmp_numeric_segments() {
        assert_eq!(version_cmp("backup_9", "backup_10"), Ordering::Less);
        assert_eq!(version_cmp("backup_2025-09-20", "backup_2025-09-15"), Ordering::Greater);
        assert_eq!(version_cmp("a_007", "a_7"), Ordering::Less);
        assert_eq!(version_cmp("same", "same"), Ordering::Equal);
        assert_eq!(version_cmp("abc", "abd"), Ordering::Less);
    }

    #[test]
    fn test_locate_selects_latest() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        for name in [
            "docker_backup_2025-09-05",
            "docker_backup_2025-09-15",
            "docker_backup_2025-09-20",
            "other_2026-01-01",
        ] {
            fs::create_dir(tmp.path().join(name))?;
        }
        // plain files never count as a backup set
        touch(&tmp.path().join("docker_backup_2099-01-01"), b"")?;

        let latest = locate(tmp.path(), DEFAULT_PREFIX)?;
        assert_eq!(latest, tmp.path().join("docker_backup_2025-09-20"));
        Ok(())
    }

    #[test]
    fn test_locate_orders_days_numerically() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        for name in ["docker_backup_2025-9-9", "docker_backup_2025-9-10"] {
            fs::create_dir(tmp.path().join(name))?;
        }
        let latest = locate(tmp.path(), DEFAULT_PREFIX)?;
        assert_eq!(latest, tmp.path().join("docker_backup_2025-9-10"));
        Ok(())
    }

    #[test]
    fn test_locate_not_found() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::create_dir(tmp.path().join("unrelated"))?;
        let err = locate(tmp.path(), DEFAULT_PREFIX).unwrap_err();
        assert!(matches!(err, SnapshotError::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn test_volume_name_from_archive() {
        assert_eq!(
            volume_name_from_archive("grafana_data_2025-09-20.tar.gz").as_deref(),
            Some("grafana_data")
        );
        assert_eq!(
            volume_name_from_archive("plain.tar.gz").as_deref(),
            Some("plain")
        );
        assert_eq!(volume_name_from_archive("image.tar"), None);
        assert_eq!(volume_name_from_archive(".tar.gz"), None);
    }

    #[test]
    fn test_open_classifies_archives() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("docker_backup_2025-09-20");
        fs::create_dir_all(root.join(IMAGES_DIR))?;
        touch(&root.join("db_2025-09-20.tar.gz"), b"not really gzip")?;
        touch(&root.join("cache_2025-09-20.tar.gz"), b"")?;
        touch(&root.join("portainer_data_2025-09-20.tar.gz"), b"")?;
        touch(&root.join("docker_compose_files_2025-09-20.tar.gz"), b"")?;
        touch(&root.join("README"), b"ignored")?;
        touch(&root.join(IMAGES_DIR).join("nginx.tar"), &[0u8; 2048])?;

        let set = SnapshotSet::open(&root, "portainer_data")?;
        assert_eq!(set.date_token, "2025-09-20");
        let names: Vec<_> = set.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["cache", "db"]);
        assert_eq!(
            set.app_data.as_ref().map(|a| a.name.as_str()),
            Some("portainer_data")
        );
        assert!(set.compose_bundle.is_some());
        assert_eq!(set.images.len(), 1);
        assert_eq!(set.images[0].estimated_bytes, 2048);
        assert_eq!(set.engine_bytes(), 2048);
        Ok(())
    }

    #[test]
    fn test_open_keeps_volume_sharing_app_data_prefix() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("docker_backup_2025-09-20");
        fs::create_dir_all(&root)?;
        touch(&root.join("portainer_data_2025-09-20.tar.gz"), b"")?;
        touch(&root.join("portainer_data_old_2025-09-20.tar.gz"), b"")?;

        let set = SnapshotSet::open(&root, "portainer_data")?;
        let app_data = set.app_data.as_ref().map(|a| a.archive.clone());
        assert_eq!(app_data, Some(root.join("portainer_data_2025-09-20.tar.gz")));
        let names: Vec<_> = set.volumes.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, ["portainer_data_old"]);
        Ok(())
    }

    #[test]
    fn test_open_empty_directory_is_unusable() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        touch(&tmp.path().join("notes.txt"), b"hello")?;
        let err = SnapshotSet::open(tmp.path(), "portainer_data").unwrap_err();
        assert!(matches!(err, SnapshotError::NoUsableContent(_)));
        Ok(())
    }

    #[test]
    fn test_open_missing_directory() {
        let err = SnapshotSet::open(Path::new("/nonexistent/backup"), "portainer_data")
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Missing(_)));
    }

    const DEFAULT_PREFIX: &str = "docker_backup_";
}
