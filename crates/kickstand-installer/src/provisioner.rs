use std::path::Path;

use kickstand_core::{
    ActivationEnvironment, ArchiveType, BootstrapError, ProgressSink, RemoteArtifact,
};

use crate::archive::extract_archive_as;
use crate::download::Downloader;
use crate::environment::apply_activation_environment;
use crate::process::{launch_detached, run_supervised, CommandSpec};

/// Side-effecting capabilities the bootstrap sequence drives.
pub trait Provisioner {
    fn download(
        &mut self,
        artifact: &RemoteArtifact,
        dest: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), BootstrapError>;

    fn extract(
        &mut self,
        archive: &Path,
        dest: &Path,
        kind: ArchiveType,
    ) -> Result<(), BootstrapError>;

    /// Runs to completion; non-zero exit is an error.
    fn run(&mut self, command: &CommandSpec) -> Result<(), BootstrapError>;

    /// Applies `activation` to the launcher's own process environment so the
    /// launched application inherits it.
    fn activate(&mut self, activation: &ActivationEnvironment);

    /// Starts detached and returns without waiting.
    fn launch(&mut self, command: &CommandSpec) -> Result<(), BootstrapError>;
}

#[derive(Debug, Clone)]
pub struct SystemProvisioner {
    downloader: Downloader,
}

impl SystemProvisioner {
    pub fn new(downloader: Downloader) -> Self {
        Self { downloader }
    }
}

impl Provisioner for SystemProvisioner {
    fn download(
        &mut self,
        artifact: &RemoteArtifact,
        dest: &Path,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), BootstrapError> {
        self.downloader
            .download(&artifact.url, dest, artifact.sha256.as_deref(), sink)
            .map(|_| ())
    }

    fn extract(
        &mut self,
        archive: &Path,
        dest: &Path,
        kind: ArchiveType,
    ) -> Result<(), BootstrapError> {
        extract_archive_as(archive, dest, kind).map(|_| ())
    }

    fn run(&mut self, command: &CommandSpec) -> Result<(), BootstrapError> {
        run_supervised(command)
    }

    fn activate(&mut self, activation: &ActivationEnvironment) {
        apply_activation_environment(activation);
    }

    fn launch(&mut self, command: &CommandSpec) -> Result<(), BootstrapError> {
        launch_detached(command)?.release();
        Ok(())
    }
}
