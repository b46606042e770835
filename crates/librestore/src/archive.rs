//! Compressed tarball access: listing and extraction
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use tar::Archive;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("failed to open archive {path:?}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("archive {path:?} is unreadable")]
    Corrupt {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to extract {path:?} into {dest:?}")]
    Unpack {
        path: PathBuf,
        dest: PathBuf,
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, ArchiveError>;

/// One member of a tarball as recorded in its header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub path: PathBuf,
    pub size: u64,
}

fn open(path: &Path) -> Result<Archive<MultiGzDecoder<BufReader<File>>>> {
    let file = File::open(path).map_err(|err| ArchiveError::Open {
        path: path.to_owned(),
        source: err,
    })?;
    Ok(Archive::new(MultiGzDecoder::new(BufReader::new(file))))
}

/// Reads every header of a `.tar.gz` file without extracting anything.
pub fn list_entries(path: &Path) -> Result<Vec<ListedEntry>> {
    let corrupt = |err: std::io::Error| ArchiveError::Corrupt {
        path: path.to_owned(),
        source: err,
    };

    let mut archive = open(path)?;
    let mut listed = Vec::new();
    for entry in archive.entries().map_err(corrupt)? {
        let entry = entry.map_err(corrupt)?;
        let size = entry.header().size().map_err(corrupt)?;
        let entry_path = entry.path().map_err(corrupt)?.into_owned();
        listed.push(ListedEntry {
            path: entry_path,
            size,
        });
    }
    Ok(listed)
}

/// Validates the archive with a listing pass, then unpacks it over `dest`.
/// Existing files are overwritten.
pub fn extract(path: &Path, dest: &Path) -> Result<()> {
    let listed = list_entries(path)?;
    tracing::debug!(?path, entries = listed.len(), "archive validated");

    fs::create_dir_all(dest).map_err(|err| ArchiveError::Unpack {
        path: path.to_owned(),
        dest: dest.to_owned(),
        source: err,
    })?;
    let mut archive = open(path)?;
    archive.set_overwrite(true);
    archive.set_preserve_permissions(true);
    archive.unpack(dest).map_err(|err| ArchiveError::Unpack {
        path: path.to_owned(),
        dest: dest.to_owned(),
        source: err,
    })?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use std::io::Write;

    use anyhow::Result;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    /// Builds an uncompressed tarball in memory from `(path, content)` pairs.
    pub(crate) fn tar_bytes(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *content)?;
        }
        Ok(builder.into_inner()?)
    }

    pub(crate) fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
        let raw = tar_bytes(files)?;
        let mut encoder = GzEncoder::new(File::create(path)?, Compression::default());
        encoder.write_all(&raw)?;
        encoder.finish()?;
        Ok(raw)
    }

    #[test]
    fn test_list_entries() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = tmp.path().join("bundle.tar.gz");
        write_tar_gz(
            &archive,
            &[("app/docker-compose.yml", b"services: {}\n"), ("app/.env", b"A=1\n")],
        )?;

        let listed = list_entries(&archive)?;
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].path, PathBuf::from("app/docker-compose.yml"));
        assert_eq!(listed[0].size, 13);
        Ok(())
    }

    #[test]
    fn test_list_entries_spans_gzip_members() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = tmp.path().join("bundle.tar.gz");
        let raw = tar_bytes(&[("app/compose.yml", &[1u8; 600]), ("web/compose.yml", b"x")])?;

        // the same tar stream, compressed as two concatenated members
        let (head, tail) = raw.split_at(1024);
        let mut file = File::create(&archive)?;
        for part in [head, tail] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part)?;
            file.write_all(&encoder.finish()?)?;
        }
        drop(file);

        let listed = list_entries(&archive)?;
        let paths: Vec<_> = listed.iter().map(|entry| entry.path.clone()).collect();
        assert_eq!(
            paths,
            [PathBuf::from("app/compose.yml"), PathBuf::from("web/compose.yml")]
        );
        Ok(())
    }

    #[test]
    fn test_extract_overwrites_existing_files() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = tmp.path().join("bundle.tar.gz");
        write_tar_gz(&archive, &[("app/compose.yaml", b"new")])?;

        let dest = tmp.path().join("restore");
        fs::create_dir_all(dest.join("app"))?;
        fs::write(dest.join("app/compose.yaml"), b"old contents")?;

        extract(&archive, &dest)?;
        assert_eq!(fs::read(dest.join("app/compose.yaml"))?, b"new");
        // a second pass is harmless
        extract(&archive, &dest)?;
        Ok(())
    }

    #[test]
    fn test_extract_rejects_garbage_before_writing() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let archive = tmp.path().join("broken.tar.gz");
        fs::write(&archive, b"definitely not a gzip stream")?;

        let dest = tmp.path().join("restore");
        let err = extract(&archive, &dest).unwrap_err();
        assert!(matches!(err, ArchiveError::Corrupt { .. }));
        assert!(!dest.exists());
        Ok(())
    }
}
