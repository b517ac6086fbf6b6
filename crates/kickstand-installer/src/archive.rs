use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use kickstand_core::{ArchiveType, BootstrapError};
use tracing::debug;

/// Unpacks `archive` into `dest` and returns the number of entries written.
///
/// Executable bits recorded in the archive are restored. A failed extraction
/// leaves whatever was already written in place.
pub fn extract_archive_as(
    archive: &Path,
    dest: &Path,
    kind: ArchiveType,
) -> Result<usize, BootstrapError> {
    fs::create_dir_all(dest)
        .map_err(|err| BootstrapError::io("failed to create extraction directory", dest, err))?;

    let count = match kind {
        ArchiveType::TarGz => extract_tar_gz(archive, dest)?,
        ArchiveType::Zip => extract_zip(archive, dest)?,
        ArchiveType::Wheel => {
            return Err(BootstrapError::extraction(
                archive,
                "wheel artifacts are installed by the package installer, not extracted",
            ));
        }
    };
    debug!(archive = %archive.display(), dest = %dest.display(), entries = count, "extracted");
    Ok(count)
}

fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<usize, BootstrapError> {
    let file = File::open(archive)
        .map_err(|err| BootstrapError::io("failed to open archive", archive, err))?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    tar.set_overwrite(true);

    let entries = tar
        .entries()
        .map_err(|err| BootstrapError::extraction(archive, err.to_string()))?;

    let mut count = 0;
    for entry in entries {
        let mut entry = entry.map_err(|err| BootstrapError::extraction(archive, err.to_string()))?;
        let entry_path = entry
            .path()
            .map_err(|err| BootstrapError::extraction(archive, err.to_string()))?
            .into_owned();
        reject_unsafe_entry(archive, &entry_path)?;

        entry.unpack_in(dest).map_err(|err| {
            BootstrapError::extraction(
                archive,
                format!("failed to unpack '{}': {err}", entry_path.display()),
            )
        })?;
        count += 1;
    }
    Ok(count)
}

fn extract_zip(archive: &Path, dest: &Path) -> Result<usize, BootstrapError> {
    let file = File::open(archive)
        .map_err(|err| BootstrapError::io("failed to open archive", archive, err))?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|err| BootstrapError::extraction(archive, err.to_string()))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|err| BootstrapError::extraction(archive, err.to_string()))?;
        let raw_name = PathBuf::from(entry.name());
        reject_unsafe_entry(archive, &raw_name)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            BootstrapError::extraction(
                archive,
                format!("refusing to extract unsafe entry '{}'", entry.name()),
            )
        })?;
        let output = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&output)
                .map_err(|err| BootstrapError::io("failed to create directory", &output, err))?;
            continue;
        }

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| BootstrapError::io("failed to create directory", parent, err))?;
        }
        let mut out = File::create(&output)
            .map_err(|err| BootstrapError::io("failed to create file", &output, err))?;
        io::copy(&mut entry, &mut out)
            .map_err(|err| BootstrapError::io("failed to write file", &output, err))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&output, fs::Permissions::from_mode(mode & 0o7777))
                .map_err(|err| BootstrapError::io("failed to set permissions", &output, err))?;
        }
    }
    Ok(zip.len())
}

fn reject_unsafe_entry(archive: &Path, entry_path: &Path) -> Result<(), BootstrapError> {
    let unsafe_path = entry_path.is_absolute()
        || entry_path.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
    if unsafe_path {
        return Err(BootstrapError::extraction(
            archive,
            format!(
                "refusing to extract path outside destination: {}",
                entry_path.display()
            ),
        ));
    }
    Ok(())
}
