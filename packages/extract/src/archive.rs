//! Unpacking extracts into the staging directory.

use std::path::Path;

/// Errors from archive handling.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive file does not exist.
    #[error("Archive not found: {0}")]
    ArchiveNotFound(String),

    /// The file is not a readable zip archive.
    #[error("Invalid zip archive {path}: {source}")]
    Zip {
        /// Archive path.
        path: String,
        /// Underlying error.
        source: zip::result::ZipError,
    },

    /// An entry would be written outside the destination directory.
    #[error("Refusing to unpack entry with unsafe path: {0}")]
    UnsafeEntry(String),

    /// I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

fn io_error(path: &Path, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Unpacks a zip archive into `dest_dir`, keeping entry paths.
///
/// The destination is created if it does not exist. Existing files with
/// the same names are overwritten. Returns the number of files written.
///
/// # Errors
///
/// Returns [`ArchiveError`] if the archive cannot be read, an entry path
/// escapes `dest_dir`, or a file cannot be written.
pub fn unzip(archive_path: &Path, dest_dir: &Path) -> Result<u64, ArchiveError> {
    if !archive_path.exists() {
        return Err(ArchiveError::ArchiveNotFound(
            archive_path.display().to_string(),
        ));
    }

    log::info!(
        "Unpacking {} -> {}",
        archive_path.display(),
        dest_dir.display()
    );

    std::fs::create_dir_all(dest_dir).map_err(|e| io_error(dest_dir, e))?;

    let file = std::fs::File::open(archive_path).map_err(|e| io_error(archive_path, e))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Zip {
        path: archive_path.display().to_string(),
        source: e,
    })?;

    let mut files = 0u64;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| ArchiveError::Zip {
            path: archive_path.display().to_string(),
            source: e,
        })?;

        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::UnsafeEntry(entry.name().to_string()));
        };
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| io_error(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(|e| io_error(&out_path, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| io_error(&out_path, e))?;
        files += 1;
    }

    log::info!("  unpacked {files} files");

    Ok(files)
}

/// Removes `dir` and everything under it. A missing directory is fine.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] if the directory exists but cannot be
/// removed.
pub fn remove_dir_if_exists(dir: &Path) -> Result<bool, ArchiveError> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {
            log::info!("Removed {}", dir.display());
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(dir, e)),
    }
}

/// Removes a single file. A missing file is fine.
///
/// # Errors
///
/// Returns [`ArchiveError::Io`] if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<bool, ArchiveError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_error(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let tmp = std::env::temp_dir().join(name);
        let _ = std::fs::remove_dir_all(&tmp);
        std::fs::create_dir_all(&tmp).unwrap();
        tmp
    }

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip_writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip_writer.start_file(*name, options).unwrap();
            zip_writer.write_all(data).unwrap();
        }
        zip_writer.finish().unwrap();
    }

    #[test]
    fn unpacks_nested_entries() {
        let tmp = scratch("parcel_sync_unzip_nested");
        let zip_path = tmp.join("extract.zip");
        write_zip(
            &zip_path,
            &[
                ("zipfolder/data.gdb/a00000001.gdbtable", b"table"),
                ("zipfolder/data.gdb/gdb", b"marker"),
            ],
        );

        let dest = tmp.join("staging");
        let files = unzip(&zip_path, &dest).unwrap();

        assert_eq!(files, 2);
        assert_eq!(
            std::fs::read(dest.join("zipfolder/data.gdb/a00000001.gdbtable")).unwrap(),
            b"table"
        );
        assert!(dest.join("zipfolder/data.gdb/gdb").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn rejects_entries_escaping_destination() {
        let tmp = scratch("parcel_sync_unzip_escape");
        let zip_path = tmp.join("evil.zip");
        write_zip(&zip_path, &[("../outside.txt", b"nope")]);

        let err = unzip(&zip_path, &tmp.join("staging")).unwrap_err();
        assert!(matches!(err, ArchiveError::UnsafeEntry(_)));
        assert!(!tmp.join("outside.txt").exists());

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn missing_archive_is_reported() {
        let tmp = scratch("parcel_sync_unzip_missing");
        let err = unzip(&tmp.join("nope.zip"), &tmp).unwrap_err();
        assert!(matches!(err, ArchiveError::ArchiveNotFound(_)));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn garbage_is_not_a_zip() {
        let tmp = scratch("parcel_sync_unzip_garbage");
        let path = tmp.join("garbage.zip");
        std::fs::write(&path, b"this is not a zip file").unwrap();
        let err = unzip(&path, &tmp.join("out")).unwrap_err();
        assert!(matches!(err, ArchiveError::Zip { .. }));
        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[test]
    fn removing_missing_dir_is_ok() {
        let tmp = scratch("parcel_sync_remove_dir");
        let stale = tmp.join("zipfolder");
        std::fs::create_dir_all(stale.join("data.gdb")).unwrap();

        assert!(remove_dir_if_exists(&stale).unwrap());
        assert!(!stale.exists());
        assert!(!remove_dir_if_exists(&stale).unwrap());

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
