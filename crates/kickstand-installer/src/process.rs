use std::ffi::{OsStr, OsString};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use kickstand_core::{ActivationEnvironment, BootstrapError};
use tracing::{debug, info};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A program invocation that has not been resolved or started yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: OsString,
    args: Vec<OsString>,
    current_dir: Option<PathBuf>,
    environment: Option<ActivationEnvironment>,
    purge_only: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            environment: None,
            purge_only: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Runs the child with `environment` applied on top of the inherited one.
    pub fn activated(mut self, environment: &ActivationEnvironment) -> Self {
        self.environment = Some(environment.clone());
        self.purge_only = false;
        self
    }

    /// Strips the purged prefixes from the child but sets nothing.
    pub fn purged(mut self, environment: &ActivationEnvironment) -> Self {
        self.environment = Some(environment.clone());
        self.purge_only = true;
        self
    }

    pub fn program(&self) -> &OsStr {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn environment(&self) -> Option<&ActivationEnvironment> {
        self.environment.as_ref()
    }

    /// Human-readable command line for logs and crash reports.
    pub fn display(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| part.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Finds the executable, searching the activation `PATH` when one is set.
    pub fn resolve(&self) -> Result<PathBuf, BootstrapError> {
        let search_path = self
            .environment
            .as_ref()
            .filter(|_| !self.purge_only)
            .and_then(|environment| environment.get("PATH").map(OsStr::to_os_string))
            .or_else(|| std::env::var_os("PATH"));
        // Relative programs are relative to the launcher, not to the child's
        // working directory.
        let cwd = std::env::current_dir()
            .map_err(|err| BootstrapError::io("failed to read current directory", "", err))?;

        which::which_in(&self.program, search_path, &cwd)
            .map_err(|_| BootstrapError::not_found(self.program.to_string_lossy()))
    }

    fn build(&self) -> Result<Command, BootstrapError> {
        let resolved = self.resolve()?;
        let mut command = Command::new(&resolved);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        if let Some(environment) = &self.environment {
            if self.purge_only {
                purge_command_environment(environment, &mut command);
            } else {
                apply_to_command(environment, &mut command);
            }
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            command.creation_flags(CREATE_NO_WINDOW);
        }
        Ok(command)
    }
}

/// Removes every inherited variable matching a purge prefix from `command`.
pub fn purge_command_environment(environment: &ActivationEnvironment, command: &mut Command) {
    for name in environment.purged_names(std::env::vars_os().map(|(key, _)| key)) {
        command.env_remove(name);
    }
}

pub fn apply_to_command(environment: &ActivationEnvironment, command: &mut Command) {
    purge_command_environment(environment, command);
    for (key, value) in environment.vars() {
        command.env(key, value);
    }
}

/// Runs a child to completion. A non-zero exit becomes
/// [`BootstrapError::ChildProcess`] carrying everything it wrote to stderr.
pub fn run_supervised(spec: &CommandSpec) -> Result<(), BootstrapError> {
    let mut command = spec.build()?;
    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped());
    debug!(command = %spec.display(), "running");

    let mut child = command
        .spawn()
        .map_err(|err| spawn_error(spec, err))?;

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let mut raw = Vec::new();
        pipe.read_to_end(&mut raw)
            .map_err(|err| BootstrapError::io("failed to read child stderr", spec_path(spec), err))?;
        stderr = String::from_utf8_lossy(&raw).into_owned();
    }

    let status = child
        .wait()
        .map_err(|err| BootstrapError::io("failed to wait for child", spec_path(spec), err))?;
    if status.success() {
        return Ok(());
    }
    Err(BootstrapError::child_process(
        spec.display(),
        status.code(),
        stderr,
    ))
}

/// Starts a child that outlives the launcher.
pub fn launch_detached(spec: &CommandSpec) -> Result<DetachedChild, BootstrapError> {
    let mut command = spec.build()?;
    command
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let child = command
        .spawn()
        .map_err(|err| spawn_error(spec, err))?;
    info!(command = %spec.display(), pid = child.id(), "launched");
    Ok(DetachedChild { child })
}

/// Handle to a launched application. Dropping it does not kill the child.
#[derive(Debug)]
pub struct DetachedChild {
    child: Child,
}

impl DetachedChild {
    /// Gives up the handle without waiting.
    pub fn release(self) -> u32 {
        let id = self.child.id();
        drop(self.child);
        id
    }

    #[cfg(test)]
    pub(crate) fn wait(mut self) -> std::io::Result<std::process::ExitStatus> {
        self.child.wait()
    }
}

fn spawn_error(spec: &CommandSpec, err: std::io::Error) -> BootstrapError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return BootstrapError::not_found(spec.program.to_string_lossy());
    }
    BootstrapError::io("failed to start", spec_path(spec), err)
}

fn spec_path(spec: &CommandSpec) -> &Path {
    Path::new(&spec.program)
}
