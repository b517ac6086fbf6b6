//! Explicit installation record.
//!
//! A component is marked `pending` before any of its work starts and
//! `installed` only after that work has fully succeeded, so an interrupted run
//! is detected on the next start even when the component path already exists.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use kickstand_core::BootstrapError;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fs_utils::remove_file_if_exists;

pub const STATE_RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    Pending,
    Installed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentState {
    pub status: ComponentStatus,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub version: u32,
    #[serde(default)]
    pub components: BTreeMap<String, ComponentState>,
}

impl Default for StateRecord {
    fn default() -> Self {
        Self {
            version: STATE_RECORD_VERSION,
            components: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record from disk. Missing, unreadable or unknown-version
    /// records yield an empty one.
    pub fn load(&self) -> StateRecord {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return StateRecord::default();
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring unreadable state record");
                return StateRecord::default();
            }
        };

        match serde_json::from_str::<StateRecord>(&raw) {
            Ok(record) if record.version == STATE_RECORD_VERSION => record,
            Ok(record) => {
                warn!(
                    path = %self.path.display(),
                    version = record.version,
                    "ignoring state record with unsupported version"
                );
                StateRecord::default()
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "ignoring corrupt state record");
                StateRecord::default()
            }
        }
    }

    pub fn status(&self, id: &str) -> Option<ComponentStatus> {
        self.load().components.get(id).map(|state| state.status)
    }

    pub fn mark_pending(&self, id: &str, path: &Path) -> Result<(), BootstrapError> {
        self.update(id, path, ComponentStatus::Pending)
    }

    pub fn mark_installed(&self, id: &str, path: &Path) -> Result<(), BootstrapError> {
        self.update(id, path, ComponentStatus::Installed)
    }

    fn update(&self, id: &str, path: &Path, status: ComponentStatus) -> Result<(), BootstrapError> {
        let mut record = self.load();
        record.components.insert(
            id.to_string(),
            ComponentState {
                status,
                path: path.to_path_buf(),
            },
        );
        self.write(&record)
    }

    fn write(&self, record: &StateRecord) -> Result<(), BootstrapError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                BootstrapError::io("failed to create state directory", parent, err)
            })?;
        }

        let body = serde_json::to_string_pretty(record).map_err(|err| {
            BootstrapError::configuration(format!("failed to serialize state record: {err}"))
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, body)
            .map_err(|err| BootstrapError::io("failed to write state record", &tmp_path, err))?;
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = remove_file_if_exists(&tmp_path);
            return Err(BootstrapError::io(
                "failed to replace state record",
                &self.path,
                err,
            ));
        }
        Ok(())
    }
}
