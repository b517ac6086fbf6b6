use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const WRITE_PROBE_FILE_NAME: &str = ".kickstand-write-test";

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

pub fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Creates and removes a scratch file in `dir`.
pub fn probe_writable(dir: &Path) -> io::Result<()> {
    let probe = dir.join(WRITE_PROBE_FILE_NAME);
    fs::write(&probe, b"")?;
    fs::remove_file(&probe)
}

/// `<path>.part`, the in-progress name of a download.
pub fn part_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    path.with_file_name(format!("{file_name}.part"))
}
