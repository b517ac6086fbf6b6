use crate::archive::ArchiveType;
use crate::error::BootstrapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRole {
    RuntimeArchive,
    PackageWheel,
}

impl ArtifactRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RuntimeArchive => "runtime archive",
            Self::PackageWheel => "package wheel",
        }
    }
}

/// A file fetched for a single install step and deleted once that step succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteArtifact {
    pub url: String,
    pub file_name: String,
    pub role: ArtifactRole,
    pub sha256: Option<String>,
}

impl RemoteArtifact {
    pub fn archive_type(&self) -> Result<ArchiveType, BootstrapError> {
        if let Some(kind) = ArchiveType::infer_from_name(&self.file_name) {
            return Ok(kind);
        }

        ArchiveType::infer_from_name(&self.url).ok_or_else(|| {
            BootstrapError::configuration(format!(
                "could not infer archive type of {} from '{}' or '{}'; supported: tar.gz, zip, whl",
                self.role.as_str(),
                self.file_name,
                self.url
            ))
        })
    }
}
