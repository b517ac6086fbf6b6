use std::ffi::{OsStr, OsString};
use std::path::Path;

use kickstand_core::{ActivationEnvironment, EnvironmentConfig};
use tracing::debug;

use crate::layout::AppLayout;
use crate::process::CommandSpec;

#[cfg(windows)]
pub const NULL_DEVICE: &str = "nul";
#[cfg(not(windows))]
pub const NULL_DEVICE: &str = "/dev/null";

/// `<runtime interpreter> -m venv <environment dir>`, with purged variables
/// stripped so a stray `PYTHONHOME` cannot redirect the new environment.
pub fn create_environment_command(
    layout: &AppLayout,
    activation: &ActivationEnvironment,
) -> CommandSpec {
    CommandSpec::new(layout.runtime_interpreter())
        .arg("-m")
        .arg("venv")
        .arg(layout.environment_dir())
        .current_dir(layout.root())
        .purged(activation)
}

pub fn compute_activation_environment(
    layout: &AppLayout,
    config: &EnvironmentConfig,
) -> ActivationEnvironment {
    compute_activation_environment_with_path(layout, config, std::env::var_os("PATH").as_deref())
}

/// Pure: derives the activation values from the layout and the inherited
/// `PATH` without touching the process environment.
pub fn compute_activation_environment_with_path(
    layout: &AppLayout,
    config: &EnvironmentConfig,
    inherited_path: Option<&OsStr>,
) -> ActivationEnvironment {
    let mut activation = ActivationEnvironment::new();
    for prefix in &config.purge_prefixes {
        activation.purge_prefix(prefix.as_str());
    }

    activation.set("PATH", prepend_path(layout.environment_bin_dir(), inherited_path));
    activation.set("VIRTUAL_ENV", layout.environment_dir().as_os_str());
    activation.set("PIP_CONFIG_FILE", NULL_DEVICE);
    for (key, value) in &config.variables {
        activation.set(key.as_str(), value.as_str());
    }
    activation
}

/// Mutates the launcher's own environment so the handed-off child inherits it.
/// Purges run before sets, so configured variables survive even when they
/// match a purge prefix (`PIP_CONFIG_FILE` vs `PIP`).
pub fn apply_activation_environment(activation: &ActivationEnvironment) {
    let inherited = std::env::vars_os().map(|(key, _)| key).collect::<Vec<_>>();
    for name in activation.purged_names(inherited) {
        debug!(name, "purging inherited variable");
        // SAFETY: the launcher is single-threaded when it activates the environment.
        unsafe { std::env::remove_var(&name) };
    }
    for (key, value) in activation.vars() {
        // SAFETY: as above.
        unsafe { std::env::set_var(key, value) };
    }
}

fn prepend_path(dir: &Path, inherited: Option<&OsStr>) -> OsString {
    let mut entries = vec![dir.to_path_buf()];
    if let Some(inherited) = inherited {
        entries.extend(std::env::split_paths(inherited));
    }
    std::env::join_paths(entries).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}
