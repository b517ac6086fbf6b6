use crate::error::BootstrapError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashRecord {
    pub timestamp: String,
    pub message: String,
    pub diagnostic: Option<String>,
}

impl CrashRecord {
    pub fn new(timestamp: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            message: message.into(),
            diagnostic: None,
        }
    }

    pub fn from_error(timestamp: impl Into<String>, error: &BootstrapError) -> Self {
        Self {
            timestamp: timestamp.into(),
            message: error.to_string(),
            diagnostic: error.diagnostic(),
        }
    }

    /// One log entry: timestamp line, message, optional diagnostic, blank separator.
    pub fn render(&self) -> String {
        let mut entry = format!("LAUNCHER {}\n", self.timestamp);
        entry.push_str(self.message.trim_end());
        entry.push('\n');
        if let Some(diagnostic) = &self.diagnostic {
            entry.push_str(diagnostic.trim_end());
            entry.push('\n');
        }
        entry.push('\n');
        entry
    }
}
