//! Failure taxonomy shared by every provisioning stage.
//!
//! Each stage returns its error unmodified; the orchestrator decides whether it
//! becomes a crash report or, for [`BootstrapError::Aborted`], a silent exit.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The HTTP request could not be completed or returned a non-success status.
    #[error("failed to download {url}: {message}")]
    Network { url: String, message: String },

    /// A local file could not be created, written, renamed or removed.
    #[error("{context} '{}': {source}", .path.display())]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to extract '{}': {message}", .archive.display())]
    Extraction { archive: PathBuf, message: String },

    /// A supervised child exited non-zero. Displays exactly what the child wrote
    /// to its error stream.
    #[error("{}", child_message(.command, .code, .stderr))]
    ChildProcess {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("executable not found: {program}")]
    NotFound { program: String },

    #[error("{message}")]
    Configuration { message: String },

    #[error("checksum mismatch for '{}': expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The user dismissed a progress dialog. Not a failure: never reported.
    #[error("aborted")]
    Aborted,
}

impl BootstrapError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    pub fn extraction(archive: &Path, message: impl Into<String>) -> Self {
        Self::Extraction {
            archive: archive.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn child_process(command: impl Into<String>, code: Option<i32>, stderr: String) -> Self {
        Self::ChildProcess {
            command: command.into(),
            code,
            stderr,
        }
    }

    pub fn not_found(program: impl Into<String>) -> Self {
        Self::NotFound {
            program: program.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn checksum_mismatch(
        path: &Path,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Extra context for the crash log beyond the displayed message.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::ChildProcess { command, code, .. } => Some(match code {
                Some(code) => format!("command `{command}` exited with status {code}"),
                None => format!("command `{command}` was terminated by a signal"),
            }),
            _ => None,
        }
    }
}

fn child_message(command: &str, code: &Option<i32>, stderr: &str) -> String {
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    match code {
        Some(code) => format!("`{command}` exited with status {code}"),
        None => format!("`{command}` was terminated by a signal"),
    }
}
