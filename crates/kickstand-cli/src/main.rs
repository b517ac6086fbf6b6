#![cfg_attr(windows, windows_subsystem = "windows")]

mod core_flows;
mod host;
#[cfg(windows)]
mod native_host;
mod render;

use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use kickstand_core::{BootstrapError, LaunchConfig, ProgressReporter, SilentReporter};
use kickstand_installer::{
    absolute_app_root, config_path, crash_log_path, default_app_root, load_launch_config,
    AppLayout, CrashLog, Downloader, SystemProvisioner, CRASH_LOG_FILE_NAME,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::core_flows::{
    BootstrapReport, CrashReporter, Orchestrator, StageOutcome, Terminal, ERROR_TITLE,
};
use crate::host::{app_identity, default_host, HostIntegration};
use crate::render::{current_output_style, ConsoleReporter, ModalReporter};

const LOG_ENV: &str = "KICKSTAND_LOG";

#[derive(Parser, Debug)]
#[command(name = "kickstand")]
#[command(about = "Provisions a private Python runtime and launches the application", long_about = None)]
struct Cli {
    /// Show MESSAGE as an error and exit without provisioning.
    #[arg(short = 'e', long = "error", value_name = "MESSAGE")]
    error: Option<String>,
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,
    /// Forwarded to the application entry script.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    app_args: Vec<OsString>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum ProgressMode {
    Auto,
    Console,
    Modal,
    Silent,
}

fn main() -> ExitCode {
    if let Err(err) = init_tracing() {
        eprintln!("failed to initialize logging: {err:#}");
    }
    let cli = Cli::parse();
    let host = default_host();
    ExitCode::from(run_cli(cli, host.as_ref()).exit_code())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))
}

fn run_cli(cli: Cli, host: &dyn HostIntegration) -> Terminal {
    let root = cli
        .root
        .clone()
        .map_or_else(default_app_root, Ok)
        .and_then(|root| absolute_app_root(&root));
    let root = match root {
        Ok(root) => root,
        Err(err) => {
            let crash = CrashReporter::new(CrashLog::new(CRASH_LOG_FILE_NAME), host);
            return crash.conclude::<()>(Err(err));
        }
    };
    let crash = CrashReporter::new(CrashLog::new(crash_log_path(&root)), host);

    let config_file = cli.config.clone().unwrap_or_else(|| config_path(&root));
    let config = match load_launch_config(&config_file) {
        Ok(config) => config,
        Err(_) if cli.error.is_some() => LaunchConfig::default(),
        Err(err) => {
            return crash.conclude::<()>(Err(BootstrapError::configuration(format!("{err:#}"))));
        }
    };

    let exe = launcher_path(&root, &config);
    host.set_app_identity(&app_identity(&config.app_id, &exe));

    if let Some(message) = &cli.error {
        host.show_error(ERROR_TITLE, message);
        return Terminal::Failure;
    }

    if let Some(scheme) = &config.protocol_scheme {
        if let Err(err) = host.register_protocol(scheme, &config.app_name, &exe) {
            warn!(scheme, error = %format!("{err:#}"), "protocol registration failed");
        }
    }

    let layout = AppLayout::new(&root, &config);
    let mut reporter = select_reporter(cli.progress, host, &config.app_name);
    let result = bootstrap(&config, &layout, reporter.as_mut(), cli.app_args);
    reporter.close();

    if let Ok(report) = &result {
        let provisioned = report
            .stages
            .iter()
            .filter(|record| record.outcome == StageOutcome::Completed)
            .filter_map(|record| record.component.as_deref())
            .collect::<Vec<_>>();
        info!(?provisioned, "handed off to application");
    }
    crash.conclude(result)
}

fn bootstrap(
    config: &LaunchConfig,
    layout: &AppLayout,
    reporter: &mut dyn ProgressReporter,
    app_args: Vec<OsString>,
) -> Result<BootstrapReport, BootstrapError> {
    let downloader = Downloader::new(config.download.attempts)?;
    let provisioner = SystemProvisioner::new(downloader);
    Orchestrator::new(config, layout, provisioner, reporter)
        .with_app_args(app_args)
        .run()
}

fn select_reporter(
    mode: ProgressMode,
    host: &dyn HostIntegration,
    title: &str,
) -> Box<dyn ProgressReporter> {
    let console = || -> Box<dyn ProgressReporter> {
        Box::new(ConsoleReporter::new(current_output_style()))
    };
    match mode {
        ProgressMode::Silent => Box::new(SilentReporter),
        ProgressMode::Console => console(),
        ProgressMode::Modal => match host.progress_dialog(title) {
            Some(dialog) => Box::new(ModalReporter::new(dialog)),
            None => {
                warn!("host has no progress dialog; falling back to console output");
                console()
            }
        },
        ProgressMode::Auto => {
            if let Some(dialog) = host.progress_dialog(title) {
                Box::new(ModalReporter::new(dialog))
            } else if std::io::stderr().is_terminal() {
                console()
            } else {
                Box::new(SilentReporter)
            }
        }
    }
}

fn launcher_path(root: &Path, config: &LaunchConfig) -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| root.join(&config.app_name))
}
