use std::ffi::OsString;
use std::path::{Path, PathBuf};

use kickstand_core::{
    ActivationEnvironment, BootstrapError, InstallAction, LaunchConfig, ProgressReporter,
    ProvisionPlan, ProvisionableComponent, RemoteArtifact, ReporterSink, Transfer,
    MAX_IN_FLIGHT_PERCENT,
};
use kickstand_installer::{
    compute_activation_environment, create_environment_command, install_package_command,
    package_component_id, path_has_kind, probe_writable, remove_dir_if_exists,
    remove_file_if_exists, AppLayout, CommandSpec, CrashLog, EnvironmentProbe, Provisioner,
    StateStore,
};
use tracing::{error, info, warn};

use crate::host::HostIntegration;

pub(crate) const ERROR_TITLE: &str = "Error occurred";
pub(crate) const MISSING_SOURCES_MESSAGE: &str = "Missing sources. Please extract the ZIP archive.";
pub(crate) const WRITE_FAILED_MESSAGE: &str =
    "Write failed. Please extract the ZIP archive to a folder with write permissions.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Init,
    EnsureRuntime,
    EnsureIsolatedEnvironment,
    ActivateEnvironment,
    EnsurePackage,
    Handoff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageOutcome {
    Skipped,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StageRecord {
    pub(crate) stage: Stage,
    pub(crate) component: Option<String>,
    pub(crate) outcome: StageOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct BootstrapReport {
    pub(crate) stages: Vec<StageRecord>,
}

impl BootstrapReport {
    fn push(&mut self, stage: Stage, component: Option<&str>, outcome: StageOutcome) {
        info!(?stage, component, ?outcome, "stage finished");
        self.stages.push(StageRecord {
            stage,
            component: component.map(str::to_string),
            outcome,
        });
    }
}

/// Walks `Init → EnsureRuntime → EnsureIsolatedEnvironment → ActivateEnvironment
/// → EnsurePackage* → Handoff`, skipping every stage whose component is
/// already present. The first error ends the run.
pub(crate) struct Orchestrator<'a, P: Provisioner> {
    config: &'a LaunchConfig,
    layout: &'a AppLayout,
    provisioner: P,
    reporter: &'a mut dyn ProgressReporter,
    state: StateStore,
    app_args: Vec<OsString>,
}

impl<'a, P: Provisioner> Orchestrator<'a, P> {
    pub(crate) fn new(
        config: &'a LaunchConfig,
        layout: &'a AppLayout,
        provisioner: P,
        reporter: &'a mut dyn ProgressReporter,
    ) -> Self {
        Self {
            config,
            layout,
            provisioner,
            reporter,
            state: StateStore::new(layout.state_path()),
            app_args: Vec::new(),
        }
    }

    pub(crate) fn with_app_args(mut self, app_args: Vec<OsString>) -> Self {
        self.app_args = app_args;
        self
    }

    #[cfg(test)]
    pub(crate) fn into_provisioner(self) -> P {
        self.provisioner
    }

    pub(crate) fn run(&mut self) -> Result<BootstrapReport, BootstrapError> {
        let mut report = BootstrapReport::default();
        let probe = EnvironmentProbe::new(self.state.clone());

        let plan = self.init(&probe)?;
        report.push(Stage::Init, None, StageOutcome::Completed);

        let outcome = self.ensure_runtime(&probe, &plan.runtime)?;
        report.push(Stage::EnsureRuntime, Some(&plan.runtime.id), outcome);

        let outcome = self.ensure_environment(&probe, &plan.environment)?;
        report.push(
            Stage::EnsureIsolatedEnvironment,
            Some(&plan.environment.id),
            outcome,
        );

        let activation = compute_activation_environment(self.layout, &self.config.environment);
        report.push(Stage::ActivateEnvironment, None, StageOutcome::Completed);

        for package in &plan.packages {
            let outcome = self.ensure_package(&probe, package, &activation)?;
            report.push(Stage::EnsurePackage, Some(&package.id), outcome);
        }

        self.handoff(&activation)?;
        report.push(Stage::Handoff, None, StageOutcome::Completed);
        Ok(report)
    }

    fn init(&mut self, probe: &EnvironmentProbe) -> Result<ProvisionPlan, BootstrapError> {
        if !self.layout.source_dir().is_dir() {
            return Err(BootstrapError::configuration(MISSING_SOURCES_MESSAGE));
        }
        let plan = self.layout.plan(self.config)?;

        if !probe.exists(&plan.runtime) {
            if let Err(err) = probe_writable(self.layout.root()) {
                warn!(root = %self.layout.root().display(), error = %err, "application root is not writable");
                return Err(BootstrapError::configuration(WRITE_FAILED_MESSAGE));
            }
        }
        Ok(plan)
    }

    fn ensure_runtime(
        &mut self,
        probe: &EnvironmentProbe,
        component: &ProvisionableComponent,
    ) -> Result<StageOutcome, BootstrapError> {
        if probe.exists(component) {
            return Ok(StageOutcome::Skipped);
        }
        let InstallAction::ExtractArchive(artifact) = &component.action else {
            return Err(unexpected_action(component));
        };
        self.state.mark_pending(&component.id, &component.path)?;
        clear_partial(&component.path)?;

        let config = self.config;
        let name = &config.runtime.name;
        let archive = self.download(artifact, &format!("Downloading {name}"))?;

        let label = format!("Installing {name}");
        self.announce(0, &label)?;
        let kind = artifact.archive_type()?;
        self.provisioner.extract(&archive, self.layout.root(), kind)?;
        if !path_has_kind(&component.path, component.kind) {
            return Err(BootstrapError::extraction(
                &archive,
                format!("archive did not produce {}", component.path.display()),
            ));
        }
        remove_artifact(&archive)?;
        self.reporter.complete(&label);

        self.state.mark_installed(&component.id, &component.path)?;
        Ok(StageOutcome::Completed)
    }

    fn ensure_environment(
        &mut self,
        probe: &EnvironmentProbe,
        component: &ProvisionableComponent,
    ) -> Result<StageOutcome, BootstrapError> {
        if probe.exists(component) {
            return Ok(StageOutcome::Skipped);
        }
        self.state.mark_pending(&component.id, &component.path)?;
        clear_partial(&component.path)?;

        let label = "Creating Environment";
        self.announce(MAX_IN_FLIGHT_PERCENT, label)?;
        let mut purge_only = ActivationEnvironment::new();
        for prefix in &self.config.environment.purge_prefixes {
            purge_only.purge_prefix(prefix.as_str());
        }
        self.provisioner
            .run(&create_environment_command(self.layout, &purge_only))?;
        self.reporter.complete(label);

        self.state.mark_installed(&component.id, &component.path)?;
        Ok(StageOutcome::Completed)
    }

    fn ensure_package(
        &mut self,
        probe: &EnvironmentProbe,
        component: &ProvisionableComponent,
        activation: &ActivationEnvironment,
    ) -> Result<StageOutcome, BootstrapError> {
        if probe.exists(component) {
            return Ok(StageOutcome::Skipped);
        }
        let InstallAction::InstallPackage(artifact) = &component.action else {
            return Err(unexpected_action(component));
        };
        self.state.mark_pending(&component.id, &component.path)?;

        let name = self
            .config
            .packages
            .iter()
            .find(|package| package_component_id(&package.name) == component.id)
            .map_or_else(|| component.id.clone(), |package| package.name.clone());
        let wheel = self.download(artifact, &format!("Downloading {name}"))?;

        let label = format!("Installing {name}");
        self.announce(MAX_IN_FLIGHT_PERCENT, &label)?;
        self.provisioner
            .run(&install_package_command(self.layout, activation, &wheel))?;
        remove_artifact(&wheel)?;
        self.reporter.complete(&label);

        if !path_has_kind(&component.path, component.kind) {
            warn!(
                package = %name,
                marker = %component.path.display(),
                "package installed but its marker is missing; it will be reinstalled next run"
            );
        }
        self.state.mark_installed(&component.id, &component.path)?;
        Ok(StageOutcome::Completed)
    }

    /// Shows a stage that has no byte-level progress of its own.
    fn announce(&mut self, percent: u8, label: &str) -> Result<(), BootstrapError> {
        match self.reporter.report(percent, label) {
            Transfer::Continue => Ok(()),
            Transfer::Abort => Err(BootstrapError::Aborted),
        }
    }

    fn download(
        &mut self,
        artifact: &RemoteArtifact,
        label: &str,
    ) -> Result<PathBuf, BootstrapError> {
        let dest = self.layout.download_path(&artifact.file_name);
        info!(url = %artifact.url, role = artifact.role.as_str(), dest = %dest.display(), "downloading");
        {
            let mut sink = ReporterSink::begin(&mut *self.reporter, label);
            self.provisioner.download(artifact, &dest, &mut sink)?;
        }
        self.reporter.complete(label);
        Ok(dest)
    }

    fn handoff(&mut self, activation: &ActivationEnvironment) -> Result<(), BootstrapError> {
        self.reporter.close();
        self.provisioner.activate(activation);

        let command = CommandSpec::new(self.layout.environment_interpreter())
            .arg(self.layout.entry_script())
            .args(self.app_args.iter().cloned())
            .current_dir(self.layout.root());
        self.provisioner.launch(&command)
    }
}

fn unexpected_action(component: &ProvisionableComponent) -> BootstrapError {
    BootstrapError::configuration(format!(
        "component '{}' has an unexpected install action",
        component.id
    ))
}

/// Removes whatever an interrupted earlier attempt left at `path`.
fn clear_partial(path: &Path) -> Result<(), BootstrapError> {
    if path.exists() {
        warn!(path = %path.display(), "removing partially provisioned component");
    }
    remove_dir_if_exists(path)
        .map_err(|err| BootstrapError::io("failed to remove partial install", path, err))
}

fn remove_artifact(path: &Path) -> Result<(), BootstrapError> {
    remove_file_if_exists(path)
        .map_err(|err| BootstrapError::io("failed to remove downloaded artifact", path, err))
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Terminal {
    Success,
    Aborted,
    Failure,
}

impl Terminal {
    pub(crate) fn exit_code(self) -> u8 {
        match self {
            Self::Success | Self::Aborted => 0,
            Self::Failure => 1,
        }
    }
}

/// Persists and surfaces fatal errors.
pub(crate) struct CrashReporter<'a> {
    log: CrashLog,
    host: &'a dyn HostIntegration,
}

impl<'a> CrashReporter<'a> {
    pub(crate) fn new(log: CrashLog, host: &'a dyn HostIntegration) -> Self {
        Self { log, host }
    }

    pub(crate) fn conclude<T>(&self, result: Result<T, BootstrapError>) -> Terminal {
        match result {
            Ok(_) => Terminal::Success,
            Err(err) if err.is_aborted() => {
                info!("aborted by user");
                Terminal::Aborted
            }
            Err(err) => {
                self.report(&err);
                Terminal::Failure
            }
        }
    }

    /// Appends to the crash log, then shows the error. A log write failure
    /// never suppresses the dialog.
    pub(crate) fn report(&self, err: &BootstrapError) {
        error!(error = %err, "launcher failed");
        if let Err(log_err) = self.log.record_error(err) {
            error!(error = %log_err, path = %self.log.path().display(), "failed to write crash log");
        }
        self.host.show_error(ERROR_TITLE, &crash_dialog_message(err));
    }
}

pub(crate) fn crash_dialog_message(err: &BootstrapError) -> String {
    let message = err.to_string();
    let message = message.trim_end();
    let separator = if message.ends_with('.') { "" } else { "." };
    format!("{message}{separator}\n\nError saved to crash.log")
}
