use std::ffi::{OsStr, OsString};

/// Variables to set and name prefixes to purge before the application starts.
///
/// This is a plain value: building one never touches the process environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationEnvironment {
    vars: Vec<(String, OsString)>,
    purge_prefixes: Vec<String>,
}

impl ActivationEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OsString>) {
        let key = key.into();
        let value = value.into();
        match self.vars.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.vars.push((key, value)),
        }
    }

    pub fn purge_prefix(&mut self, prefix: impl Into<String>) {
        let prefix = prefix.into();
        if prefix.is_empty() || self.purge_prefixes.contains(&prefix) {
            return;
        }
        self.purge_prefixes.push(prefix);
    }

    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, value)| value.as_os_str())
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &OsStr)> {
        self.vars
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_os_str()))
    }

    pub fn should_purge(&self, name: &str) -> bool {
        self.purge_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
    }

    /// Names from `inherited` that must be removed, in input order.
    pub fn purged_names<I, K>(&self, inherited: I) -> Vec<String>
    where
        I: IntoIterator<Item = K>,
        K: AsRef<OsStr>,
    {
        inherited
            .into_iter()
            .filter_map(|name| name.as_ref().to_str().map(str::to_string))
            .filter(|name| self.should_purge(name))
            .collect()
    }
}
