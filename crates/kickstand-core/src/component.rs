use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::artifact::RemoteArtifact;
use crate::error::BootstrapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    ExtractArchive(RemoteArtifact),
    CreateEnvironment,
    InstallPackage(RemoteArtifact),
}

/// Something the launcher can provision. Its path is its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionableComponent {
    pub id: String,
    pub path: PathBuf,
    pub kind: PresenceKind,
    pub action: InstallAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionPlan {
    pub runtime: ProvisionableComponent,
    pub environment: ProvisionableComponent,
    pub packages: Vec<ProvisionableComponent>,
}

impl ProvisionPlan {
    pub fn new(
        runtime: ProvisionableComponent,
        environment: ProvisionableComponent,
        packages: Vec<ProvisionableComponent>,
    ) -> Result<Self, BootstrapError> {
        let plan = Self {
            runtime,
            environment,
            packages,
        };

        let mut seen_paths = BTreeSet::new();
        let mut seen_ids = BTreeSet::new();
        for component in plan.components() {
            if !seen_paths.insert(component.path.clone()) {
                return Err(BootstrapError::configuration(format!(
                    "component '{}' shares its path with another component: {}",
                    component.id,
                    component.path.display()
                )));
            }
            if !seen_ids.insert(component.id.clone()) {
                return Err(BootstrapError::configuration(format!(
                    "duplicate component id '{}'",
                    component.id
                )));
            }
        }

        Ok(plan)
    }

    pub fn components(&self) -> impl Iterator<Item = &ProvisionableComponent> {
        [&self.runtime, &self.environment]
            .into_iter()
            .chain(self.packages.iter())
    }
}
