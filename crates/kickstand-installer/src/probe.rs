use std::path::Path;

use kickstand_core::{PresenceKind, ProvisionableComponent};

use crate::state::{ComponentStatus, StateStore};

/// Decides whether a component already exists and can be skipped.
#[derive(Debug, Clone)]
pub struct EnvironmentProbe {
    state: StateStore,
}

impl EnvironmentProbe {
    pub fn new(state: StateStore) -> Self {
        Self { state }
    }

    /// True when the path exists with the expected kind and the component was
    /// not left half-installed by an earlier run. A path with no record at all
    /// counts as present, so hand-placed components are honoured.
    pub fn exists(&self, component: &ProvisionableComponent) -> bool {
        if !path_has_kind(&component.path, component.kind) {
            return false;
        }
        self.state.status(&component.id) != Some(ComponentStatus::Pending)
    }
}

pub fn path_has_kind(path: &Path, kind: PresenceKind) -> bool {
    match kind {
        PresenceKind::Directory => path.is_dir(),
        PresenceKind::File => path.is_file(),
    }
}
