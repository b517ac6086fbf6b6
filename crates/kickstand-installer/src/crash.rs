use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use kickstand_core::{BootstrapError, CrashRecord};

/// Append-only crash log next to the launcher.
#[derive(Debug, Clone)]
pub struct CrashLog {
    path: PathBuf,
}

impl CrashLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, record: &CrashRecord) -> Result<(), BootstrapError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| BootstrapError::io("failed to open crash log", &self.path, err))?;
        file.write_all(record.render().as_bytes())
            .map_err(|err| BootstrapError::io("failed to write crash log", &self.path, err))
    }

    pub fn record_error(&self, error: &BootstrapError) -> Result<CrashRecord, BootstrapError> {
        let record = CrashRecord::from_error(timestamp_now(), error);
        self.append(&record)?;
        Ok(record)
    }
}

/// Local wall-clock time with offset, e.g. `2024-05-01 13:37:00.123 +0200`.
pub fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S%.3f %z").to_string()
}
