mod activation;
mod archive;
mod artifact;
mod component;
mod config;
mod crash;
mod error;
mod progress;

pub use activation::ActivationEnvironment;
pub use archive::ArchiveType;
pub use artifact::{ArtifactRole, RemoteArtifact};
pub use component::{InstallAction, PresenceKind, ProvisionPlan, ProvisionableComponent};
pub use config::{
    DownloadConfig, EnvironmentConfig, LaunchConfig, PackageConfig, RuntimeConfig,
    DEFAULT_PURGE_PREFIXES,
};
pub use crash::CrashRecord;
pub use error::BootstrapError;
pub use progress::{
    PercentTracker, ProgressEvent, ProgressReporter, ProgressSink, ReporterSink, SilentReporter,
    Transfer, MAX_IN_FLIGHT_PERCENT,
};
