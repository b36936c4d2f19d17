use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Error that occurs when reading a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file `{path}`: {source}")]
pub struct FileReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Error that occurs when atomically replacing a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to write file `{path}`: {source}")]
pub struct FileWriteError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Reads the whole file at the given path.
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened or read, which
/// includes `path` naming a directory.
///
/// # Example
/// ```no_run
/// # use grendel_sd::fsutil;
/// let pem = fsutil::read_file("/etc/grendel/ca.pem")?;
/// # Ok::<(), fsutil::FileReadError>(())
/// ```
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, FileReadError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|source| FileReadError {
        path: path.to_path_buf(),
        source,
    })
}

/// Replaces the content of `path` with `contents`.
///
/// The data is written to a temporary file in the same directory which is then
/// renamed over `path`, so readers never observe a partially written file.
///
/// # Errors
///
/// Returns a [`FileWriteError`] if the temporary file cannot be created, written,
/// or renamed.
pub fn write_atomic(path: impl AsRef<Path>, contents: &[u8]) -> Result<(), FileWriteError> {
    let path = path.as_ref();
    let wrap = |source| FileWriteError {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".grendel-sd")
        .tempfile_in(dir)
        .map_err(wrap)?;
    tmp.write_all(contents).map_err(wrap)?;
    tmp.as_file().sync_all().map_err(wrap)?;
    tmp.persist(path).map_err(|err| wrap(err.error))?;
    Ok(())
}
