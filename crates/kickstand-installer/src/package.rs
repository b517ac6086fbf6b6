use std::path::Path;

use kickstand_core::ActivationEnvironment;

use crate::layout::AppLayout;
use crate::process::CommandSpec;

/// `<environment interpreter> -m pip install <wheel>` under the activation environment.
pub fn install_package_command(
    layout: &AppLayout,
    activation: &ActivationEnvironment,
    wheel: &Path,
) -> CommandSpec {
    CommandSpec::new(layout.environment_interpreter())
        .arg("-m")
        .arg("pip")
        .arg("install")
        .arg(wheel)
        .current_dir(layout.root())
        .activated(activation)
}
