use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::render::{current_output_style, render_status_line, ProgressDialog};

/// Desktop integration the launcher needs from the host OS.
pub(crate) trait HostIntegration {
    /// Groups the launcher and the launched application under one taskbar entry.
    fn set_app_identity(&self, identity: &str);

    /// Shows `message` and blocks until the user acknowledges it.
    fn show_error(&self, title: &str, message: &str);

    /// `None` when the host has no native progress window.
    fn progress_dialog(&self, title: &str) -> Option<Box<dyn ProgressDialog>>;

    fn register_protocol(&self, scheme: &str, app_name: &str, exe: &Path) -> Result<()>;
}

/// Terminal-only host: errors go to stderr, identity and protocols are no-ops.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct ConsoleHost;

impl HostIntegration for ConsoleHost {
    fn set_app_identity(&self, identity: &str) {
        debug!(identity, "app identity is not applicable on this host");
    }

    fn show_error(&self, title: &str, message: &str) {
        let style = current_output_style();
        eprintln!("{}", render_status_line(style, "err", title));
        eprintln!("{message}");
    }

    fn progress_dialog(&self, _title: &str) -> Option<Box<dyn ProgressDialog>> {
        None
    }

    fn register_protocol(&self, scheme: &str, _app_name: &str, _exe: &Path) -> Result<()> {
        debug!(scheme, "protocol registration is not supported on this host");
        Ok(())
    }
}

pub(crate) fn default_host() -> Box<dyn HostIntegration> {
    #[cfg(windows)]
    {
        Box::new(crate::native_host::NativeHost)
    }
    #[cfg(not(windows))]
    {
        Box::new(ConsoleHost)
    }
}

/// `<app_id>.<digest>`, where the digest is derived from the launcher path so
/// separate installs get separate taskbar groups.
pub(crate) fn app_identity(app_id: &str, exe: &Path) -> String {
    let digest = Sha256::digest(exe.to_string_lossy().as_bytes());
    let hex = hex::encode(digest);
    format!("{app_id}.{}", &hex[..32])
}

/// `reg add` invocations that point `<scheme>://` links at the launcher for
/// the current user.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn protocol_registration_commands(
    scheme: &str,
    app_name: &str,
    exe: &Path,
) -> Vec<Command> {
    let key_path = format!(r"HKCU\Software\Classes\{scheme}");
    let exe = exe.display();

    let values: [(String, Option<&str>, String); 4] = [
        (key_path.clone(), None, format!("URL:{app_name}")),
        (key_path.clone(), Some("URL Protocol"), String::new()),
        (format!(r"{key_path}\DefaultIcon"), None, format!("\"{exe}\",1")),
        (
            format!(r"{key_path}\shell\open\command"),
            None,
            format!("\"{exe}\" \"%1\""),
        ),
    ];

    values
        .into_iter()
        .map(|(key, value_name, data)| {
            let mut command = Command::new("reg");
            command.arg("add").arg(key);
            match value_name {
                Some(name) => command.arg("/v").arg(name),
                None => command.arg("/ve"),
            };
            command.arg("/d").arg(data).arg("/f");
            command
        })
        .collect()
}

#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(anyhow!(
        "{context_message}: status={} stderr='{}'",
        output.status,
        stderr.trim()
    ))
}
