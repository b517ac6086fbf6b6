use std::path::{Path, PathBuf};

use kickstand_core::{
    ArtifactRole, BootstrapError, InstallAction, LaunchConfig, PackageConfig, PresenceKind,
    ProvisionPlan, ProvisionableComponent, RemoteArtifact,
};

pub const CONFIG_FILE_NAME: &str = "kickstand.toml";
pub const CRASH_LOG_FILE_NAME: &str = "crash.log";
const STATE_DIR_NAME: &str = ".kickstand";

pub const RUNTIME_COMPONENT_ID: &str = "runtime";
pub const ENVIRONMENT_COMPONENT_ID: &str = "environment";

/// Where everything lives under the application root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLayout {
    root: PathBuf,
    source_dir: PathBuf,
    entry_script: PathBuf,
    runtime_dir: PathBuf,
    runtime_interpreter: PathBuf,
    environment_dir: PathBuf,
    environment_bin_dir: PathBuf,
    environment_interpreter: PathBuf,
}

impl AppLayout {
    pub fn new(root: impl Into<PathBuf>, config: &LaunchConfig) -> Self {
        let root = root.into();
        Self {
            source_dir: join_relative(&root, &config.source_dir),
            entry_script: join_relative(&root, &config.entry_script),
            runtime_dir: join_relative(&root, &config.runtime.dir),
            runtime_interpreter: join_relative(&root, &config.runtime.interpreter),
            environment_dir: join_relative(&root, &config.environment.dir),
            environment_bin_dir: join_relative(&root, &config.environment.bin_dir),
            environment_interpreter: join_relative(&root, &config.environment.interpreter),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn entry_script(&self) -> &Path {
        &self.entry_script
    }

    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn runtime_interpreter(&self) -> &Path {
        &self.runtime_interpreter
    }

    pub fn environment_dir(&self) -> &Path {
        &self.environment_dir
    }

    pub fn environment_bin_dir(&self) -> &Path {
        &self.environment_bin_dir
    }

    pub fn environment_interpreter(&self) -> &Path {
        &self.environment_interpreter
    }

    pub fn package_marker(&self, package: &PackageConfig) -> PathBuf {
        join_relative(&self.root, &package.marker)
    }

    /// Downloads land in the root itself, next to the launcher.
    pub fn download_path(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    pub fn plan(&self, config: &LaunchConfig) -> Result<ProvisionPlan, BootstrapError> {
        config
            .validate()
            .map_err(|err| BootstrapError::configuration(format!("{err:#}")))?;
        let runtime = ProvisionableComponent {
            id: RUNTIME_COMPONENT_ID.to_string(),
            path: self.runtime_dir.clone(),
            kind: PresenceKind::Directory,
            action: InstallAction::ExtractArchive(RemoteArtifact {
                url: config.runtime.url.clone(),
                file_name: config.runtime.file_name.clone(),
                role: ArtifactRole::RuntimeArchive,
                sha256: config.runtime.sha256.clone(),
            }),
        };
        let environment = ProvisionableComponent {
            id: ENVIRONMENT_COMPONENT_ID.to_string(),
            path: self.environment_dir.clone(),
            kind: PresenceKind::Directory,
            action: InstallAction::CreateEnvironment,
        };
        let packages = config
            .packages
            .iter()
            .map(|package| ProvisionableComponent {
                id: package_component_id(&package.name),
                path: self.package_marker(package),
                kind: PresenceKind::Directory,
                action: InstallAction::InstallPackage(RemoteArtifact {
                    url: package.url.clone(),
                    file_name: package.file_name.clone(),
                    role: ArtifactRole::PackageWheel,
                    sha256: package.sha256.clone(),
                }),
            })
            .collect();

        ProvisionPlan::new(runtime, environment, packages)
    }
}

pub fn package_component_id(name: &str) -> String {
    format!("package:{name}")
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE_NAME)
}

pub fn crash_log_path(root: &Path) -> PathBuf {
    root.join(CRASH_LOG_FILE_NAME)
}

/// Anchors `root` to the working directory. Every layout path and every child
/// working directory derives from it, so it must not stay relative.
pub fn absolute_app_root(root: &Path) -> Result<PathBuf, BootstrapError> {
    std::path::absolute(root)
        .map_err(|err| BootstrapError::io("failed to resolve application root", root, err))
}

/// The directory holding the running launcher executable.
pub fn default_app_root() -> Result<PathBuf, BootstrapError> {
    let exe = std::env::current_exe()
        .map_err(|err| BootstrapError::io("failed to locate launcher executable", "", err))?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        BootstrapError::configuration(format!(
            "launcher executable has no parent directory: {}",
            exe.display()
        ))
    })
}

/// Joins a `/`- or `\`-separated relative path onto `root` using native separators.
pub fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
