use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use kickstand_core::LaunchConfig;

mod archive;
mod crash;
mod download;
mod environment;
mod fs_utils;
mod layout;
mod package;
mod probe;
mod process;
mod provisioner;
mod state;

pub use archive::extract_archive_as;
pub use crash::{timestamp_now, CrashLog};
pub use download::Downloader;
pub use environment::{
    apply_activation_environment, compute_activation_environment,
    compute_activation_environment_with_path, create_environment_command, NULL_DEVICE,
};
pub use fs_utils::{part_path, probe_writable, remove_dir_if_exists, remove_file_if_exists};
pub use layout::{
    absolute_app_root, config_path, crash_log_path, default_app_root, join_relative,
    package_component_id, AppLayout, CONFIG_FILE_NAME, CRASH_LOG_FILE_NAME,
    ENVIRONMENT_COMPONENT_ID, RUNTIME_COMPONENT_ID,
};
pub use package::install_package_command;
pub use probe::{path_has_kind, EnvironmentProbe};
pub use process::{
    apply_to_command, launch_detached, purge_command_environment, run_supervised, CommandSpec,
    DetachedChild,
};
pub use provisioner::{Provisioner, SystemProvisioner};
pub use state::{ComponentState, ComponentStatus, StateRecord, StateStore, STATE_RECORD_VERSION};

/// Reads `path` if it exists; host defaults otherwise.
pub fn load_launch_config(path: &Path) -> Result<LaunchConfig> {
    match fs::read_to_string(path) {
        Ok(raw) => LaunchConfig::from_toml_str(&raw)
            .with_context(|| format!("invalid launcher config: {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(LaunchConfig::default()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read launcher config: {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests;
