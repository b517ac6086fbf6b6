use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PURGE_PREFIXES: [&str; 3] = ["QT", "PIP", "PYTHON"];

const WINDOWS_RUNTIME_URL: &str = "https://github.com/arenasys/binaries/releases/download/v1/cpython-3.10.11+20230507-x86_64-pc-windows-msvc-shared-install_only.tar.gz";
const LINUX_RUNTIME_URL: &str = "https://github.com/indygreg/python-build-standalone/releases/download/20230507/cpython-3.10.11+20230507-x86_64-unknown-linux-gnu-install_only.tar.gz";
const WINDOWS_PYQT_URL: &str =
    "https://github.com/arenasys/binaries/releases/download/v1/PyQt5-5.15.7-cp37-abi3-win_amd64.whl";

/// Launcher configuration, read from `kickstand.toml` in the application root.
///
/// Every field has a host default, so an absent file or a partial one is valid.
/// Relative paths use `/` and are resolved against the application root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LaunchConfig {
    pub app_name: String,
    pub app_id: String,
    pub source_dir: String,
    pub entry_script: String,
    pub protocol_scheme: Option<String>,
    pub runtime: RuntimeConfig,
    pub environment: EnvironmentConfig,
    pub packages: Vec<PackageConfig>,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub name: String,
    pub url: String,
    pub file_name: String,
    pub sha256: Option<String>,
    pub dir: String,
    pub interpreter: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub dir: String,
    pub bin_dir: String,
    pub interpreter: String,
    pub purge_prefixes: Vec<String>,
    pub variables: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageConfig {
    pub name: String,
    pub url: String,
    pub file_name: String,
    pub marker: String,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Total attempts per artifact. 1 keeps the first failure fatal.
    pub attempts: u32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        let packages = if cfg!(windows) {
            vec![PackageConfig {
                name: "PyQt5".to_string(),
                url: WINDOWS_PYQT_URL.to_string(),
                file_name: "PyQt5-5.15.7-cp37-abi3-win_amd64.whl".to_string(),
                marker: "venv/Lib/site-packages/PyQt5".to_string(),
                sha256: None,
            }]
        } else {
            Vec::new()
        };

        Self {
            app_name: "qDiffusion".to_string(),
            app_id: "arenasys.qdiffusion".to_string(),
            source_dir: "source".to_string(),
            entry_script: "source/main.py".to_string(),
            protocol_scheme: None,
            runtime: RuntimeConfig::default(),
            environment: EnvironmentConfig::default(),
            packages,
            download: DownloadConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let (url, interpreter) = if cfg!(windows) {
            (WINDOWS_RUNTIME_URL, "python/pythonw.exe")
        } else {
            (LINUX_RUNTIME_URL, "python/bin/python3")
        };
        Self {
            name: "Python".to_string(),
            url: url.to_string(),
            file_name: "python-3.10.11.tar.gz".to_string(),
            sha256: None,
            dir: "python".to_string(),
            interpreter: interpreter.to_string(),
        }
    }
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        let (bin_dir, interpreter) = if cfg!(windows) {
            ("venv/Scripts", "venv/Scripts/pythonw.exe")
        } else {
            ("venv/bin", "venv/bin/python3")
        };
        let variables = BTreeMap::from([
            ("HSA_OVERRIDE_GFX_VERSION".to_string(), "10.3.0".to_string()),
            ("MIOPEN_LOG_LEVEL".to_string(), "4".to_string()),
        ]);
        Self {
            dir: "venv".to_string(),
            bin_dir: bin_dir.to_string(),
            interpreter: interpreter.to_string(),
            purge_prefixes: DEFAULT_PURGE_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            variables,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { attempts: 1 }
    }
}

impl LaunchConfig {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(input).context("failed to parse launcher config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        require_inside_root("source_dir", &self.source_dir)?;
        require_inside_root("entry_script", &self.entry_script)?;
        require_non_empty("runtime.url", &self.runtime.url)?;
        require_file_name("runtime.file_name", &self.runtime.file_name)?;
        require_inside_root("runtime.dir", &self.runtime.dir)?;
        require_inside_root("runtime.interpreter", &self.runtime.interpreter)?;
        require_inside_root("environment.dir", &self.environment.dir)?;
        require_inside_root("environment.bin_dir", &self.environment.bin_dir)?;
        require_inside_root("environment.interpreter", &self.environment.interpreter)?;

        if self.download.attempts == 0 {
            return Err(anyhow!("download.attempts must be at least 1"));
        }

        let mut seen_names = BTreeSet::new();
        for package in &self.packages {
            require_non_empty("packages.name", &package.name)?;
            if !seen_names.insert(package.name.as_str()) {
                return Err(anyhow!("duplicate package '{}'", package.name));
            }
            require_non_empty(&format!("packages.{}.url", package.name), &package.url)?;
            require_file_name(
                &format!("packages.{}.file_name", package.name),
                &package.file_name,
            )?;
            require_inside_root(&format!("packages.{}.marker", package.name), &package.marker)?;
        }

        if let Some(scheme) = &self.protocol_scheme {
            validate_protocol_scheme(scheme)
                .with_context(|| format!("invalid protocol_scheme '{scheme}'"))?;
        }

        Ok(())
    }
}

fn require_non_empty(field: &str, value: &str) -> anyhow::Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field} must not be empty"));
    }
    Ok(())
}

/// The value must name a path strictly below the application root.
fn require_inside_root(field: &str, value: &str) -> anyhow::Result<()> {
    require_non_empty(field, value)?;
    let rooted = value.starts_with(['/', '\\']) || value.as_bytes().get(1) == Some(&b':');
    if rooted {
        return Err(anyhow!("{field} must be relative to the application root: {value}"));
    }
    let mut parts = value
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .peekable();
    if parts.peek().is_none() {
        return Err(anyhow!("{field} must name a path below the application root: {value}"));
    }
    if parts.any(|part| part == "..") {
        return Err(anyhow!("{field} must not leave the application root: {value}"));
    }
    Ok(())
}

fn require_file_name(field: &str, value: &str) -> anyhow::Result<()> {
    require_non_empty(field, value)?;
    if value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(anyhow!("{field} must be a plain file name: {value}"));
    }
    Ok(())
}

fn validate_protocol_scheme(scheme: &str) -> anyhow::Result<()> {
    let mut chars = scheme.chars();
    let Some(first) = chars.next() else {
        return Err(anyhow!("protocol scheme must not be empty"));
    };
    if !first.is_ascii_alphabetic() {
        return Err(anyhow!(
            "protocol scheme must start with an ASCII letter: {scheme}"
        ));
    }
    if chars.any(|ch| !(ch.is_ascii_alphanumeric() || ch == '+' || ch == '-' || ch == '.')) {
        return Err(anyhow!(
            "protocol scheme contains invalid character(s): {scheme}"
        ));
    }
    Ok(())
}
