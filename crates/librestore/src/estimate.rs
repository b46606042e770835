//! Best-effort estimation of the restored footprint of backup artifacts
//!
//! Compressed tarballs are measured through the gzip trailer when it can be
//! trusted, otherwise by summing the sizes listed in the tar headers. Image
//! exports are stored uncompressed, so their on-disk size is used as is.
//! None of this models tar padding, sparse files or block rounding; the
//! space guard adds a margin on top.
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::archive;
use crate::snapshot::COMPRESSED_TAR_SUFFIX;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
// 10 byte header + 8 byte trailer
const GZIP_MIN_LEN: u64 = 18;
// Value reported by streaming compressors that never learnt the real size.
const ISIZE_UNKNOWN: u32 = u32::MAX;

/// Returns the number of bytes `path` is expected to occupy once restored,
/// or 0 when that cannot be determined.
pub fn estimate_restored_size(path: &Path) -> u64 {
    if is_compressed_tar(path) {
        estimate_compressed_tar(path)
    } else {
        match path.metadata() {
            Ok(metadata) => metadata.len(),
            Err(err) => {
                tracing::warn!(?path, %err, "could not determine file size");
                0
            }
        }
    }
}

pub fn is_compressed_tar(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(COMPRESSED_TAR_SUFFIX) || name.ends_with(".tgz"))
}

fn estimate_compressed_tar(path: &Path) -> u64 {
    match embedded_size(path) {
        Ok(Some(size)) => return size,
        Ok(None) => {
            tracing::debug!(?path, "gzip size field unusable, listing archive instead")
        }
        Err(err) => {
            tracing::debug!(?path, %err, "could not read gzip trailer, listing archive instead")
        }
    }

    match archive::list_entries(path) {
        Ok(entries) => entries
            .iter()
            .fold(0u64, |total, entry| total.saturating_add(entry.size)),
        Err(err) => {
            tracing::warn!(?path, %err, "could not determine restored size");
            0
        }
    }
}

/// Reads the ISIZE field from the gzip trailer.
fn embedded_size(path: &Path) -> io::Result<Option<u64>> {
    let mut file = File::open(path)?;
    let compressed_len = file.metadata()?.len();
    if compressed_len < GZIP_MIN_LEN {
        return Ok(None);
    }

    let mut magic = [0u8; 2];
    file.read_exact(&mut magic)?;
    if magic != GZIP_MAGIC {
        return Ok(None);
    }

    file.seek(SeekFrom::End(-4))?;
    let mut trailer = [0u8; 4];
    file.read_exact(&mut trailer)?;
    Ok(trusted_isize(u32::from_le_bytes(trailer), compressed_len))
}

/// ISIZE is the uncompressed length modulo 2^32. A zero, the saturated
/// sentinel, or anything below the compressed length means the field has
/// wrapped or was never filled in.
fn trusted_isize(isize: u32, compressed_len: u64) -> Option<u64> {
    match isize {
        0 | ISIZE_UNKNOWN => None,
        n if u64::from(n) < compressed_len => None,
        n => Some(u64::from(n)),
    }
}

#[cfg(test)]
mod tests {
    use std::fs::{self, OpenOptions};
    use std::io::Write;

    use anyhow::Result;

    use super::*;
    use crate::archive::tests::write_tar_gz;

    #[test]
    fn test_trusted_isize() {
        assert_eq!(trusted_isize(0, 100), None);
        assert_eq!(trusted_isize(u32::MAX, 100), None);
        assert_eq!(trusted_isize(50, 100), None);
        assert_eq!(trusted_isize(4096, 100), Some(4096));
    }

    #[test]
    fn test_estimate_uses_gzip_trailer() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("vol_2025-09-20.tar.gz");
        let raw = write_tar_gz(
            &path,
            &[("data/a.bin", &[7u8; 3000]), ("data/b.bin", &[9u8; 5000])],
        )?;

        assert_eq!(estimate_restored_size(&path), raw.len() as u64);
        Ok(())
    }

    #[test]
    fn test_estimate_falls_back_to_listing_on_sentinel() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("vol_2025-09-20.tar.gz");
        write_tar_gz(
            &path,
            &[("data/a.bin", &[7u8; 3000]), ("data/b.bin", &[9u8; 5000])],
        )?;

        let len = fs::metadata(&path)?.len();
        let mut file = OpenOptions::new().write(true).open(&path)?;
        file.seek(SeekFrom::Start(len - 4))?;
        file.write_all(&ISIZE_UNKNOWN.to_le_bytes())?;
        drop(file);

        assert_eq!(estimate_restored_size(&path), 8000);
        Ok(())
    }

    #[test]
    fn test_estimate_unreadable_archive_is_zero() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("broken.tar.gz");
        fs::write(&path, b"garbage")?;
        assert_eq!(estimate_restored_size(&path), 0);
        assert_eq!(estimate_restored_size(&tmp.path().join("missing.tar.gz")), 0);
        Ok(())
    }

    #[test]
    fn test_estimate_image_export_uses_file_size() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("redis_7.tar");
        fs::write(&path, vec![0u8; 12345])?;
        assert_eq!(estimate_restored_size(&path), 12345);
        Ok(())
    }
}
